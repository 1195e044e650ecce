pub mod contact_service;
pub mod user_service;

use serde_json::Value;

/// A resolved list request: match criteria, sort criteria and page window
#[derive(Debug, Clone, PartialEq)]
pub struct ListParams {
    pub criteria: Value,
    pub sort: Value,
    pub page: u32,
    pub per_page: u32,
}

pub use contact_service::{ContactError, ContactService};
pub use user_service::{UserError, UserService};
