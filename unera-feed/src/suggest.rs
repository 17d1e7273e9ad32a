use itertools::Itertools;
use std::collections::BTreeSet;
use unera_msg::User;
use unera_ref::UserId;

const SAME_LOCATION_SCORE: u32 = 5;

#[derive(Clone, Debug, PartialEq)]
pub struct Suggestion<'a> {
    pub user: &'a User,
    pub score: u32,
    pub reason: &'static str,
}

/// People the current user might follow. Id 0 is the system account.
pub fn suggest_users<'a>(
    current_user: &User,
    users: impl IntoIterator<Item = &'a User>,
    hidden: &BTreeSet<UserId>,
) -> Vec<Suggestion<'a>> {
    users
        .into_iter()
        .filter(|user| {
            user.id != current_user.id
                && !current_user.is_following(user.id)
                && user.id != UserId(0)
                && !hidden.contains(&user.id)
        })
        .map(|user| {
            if current_user.shares_location_with(user) {
                Suggestion {
                    user,
                    score: SAME_LOCATION_SCORE,
                    reason: "Lives near you",
                }
            } else {
                Suggestion {
                    user,
                    score: 0,
                    reason: "Suggested for you",
                }
            }
        })
        .sorted_by(|a, b| b.score.cmp(&a.score).then(a.user.id.cmp(&b.user.id)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: u64, location: &str) -> User {
        let mut user = User::new(UserId(id), format!("user {}", id));
        user.location = Some(location.to_string());
        user
    }

    #[test]
    fn test_suggest_users() {
        let mut me = user(1, "Arusha, Tanzania");
        me.following.insert(UserId(2));
        let users = vec![
            user(0, "Arusha, Tanzania"),
            me.clone(),
            user(2, "Arusha, Tanzania"),
            user(3, "Nairobi, Kenya"),
            user(4, "Lagos, Nigeria"),
            user(5, "Arusha, Tanzania"),
            user(6, "Arusha, Tanzania"),
        ];
        let hidden: BTreeSet<UserId> = [UserId(6)].into_iter().collect();

        let suggestions = suggest_users(&me, &users, &hidden);

        let ranked: Vec<(u64, u32)> = suggestions
            .iter()
            .map(|suggestion| (suggestion.user.id.0, suggestion.score))
            .collect();
        assert_eq!(ranked, vec![(5, 5), (3, 0), (4, 0)]);
    }
}
