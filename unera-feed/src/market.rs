use unera_msg::Product;

/// Filter value that disables the country or category filter.
pub const ALL: &str = "all";

/// Countries the marketplace lists in, as (code, name).
pub const MARKET_COUNTRIES: &[(&str, &str)] = &[("TZ", "Tanzania"), ("US", "United States")];

/// Listings whose address names no known country.
pub const DEFAULT_COUNTRY: &str = "US";

/// Country code for a listing, from the first country named in its address.
pub fn detect_country(address: &str) -> &'static str {
    let address = address.to_lowercase();
    MARKET_COUNTRIES
        .iter()
        .find(|(_, name)| address.contains(&name.to_lowercase()))
        .map_or(DEFAULT_COUNTRY, |(code, _)| *code)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProductFilter {
    pub country: String,
    pub category: String,
    pub search: String,
}

impl Default for ProductFilter {
    fn default() -> Self {
        ProductFilter {
            country: ALL.to_string(),
            category: ALL.to_string(),
            search: String::new(),
        }
    }
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        if self.country != ALL && product.country != self.country {
            return false;
        }
        if self.category != ALL && product.category != self.category {
            return false;
        }
        let search = self.search.trim().to_lowercase();
        search.is_empty() || product.title.to_lowercase().contains(&search)
    }
}

pub fn filter_products<'a>(
    products: impl IntoIterator<Item = &'a Product>,
    filter: &ProductFilter,
) -> Vec<&'a Product> {
    products
        .into_iter()
        .filter(|product| filter.matches(product))
        .collect()
}
