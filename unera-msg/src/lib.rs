// Wire model shared by the API client, the stores and the feed composer.
// Field names follow the backend's camelCase JSON.

mod catalog;
mod chat;
mod community;
mod post;
mod request;
mod user;

pub use catalog::*;
pub use chat::*;
pub use community::*;
pub use post::*;
pub use request::*;
pub use user::*;
