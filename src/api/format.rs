//! Public wire format of stored entities.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::database::models::{ContactStatus, ContactUs, Role, Seo, User};
use crate::database::Stored;

/// `YYYY/MM/DD hh:mm:ss` (12-hour clock)
pub fn display_date(at: &DateTime<Utc>) -> String {
    at.format("%Y/%m/%d %I:%M:%S").to_string()
}

/// A user without the password hash
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub object: &'static str,
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_date: String,
    pub updated_date: String,
}

impl From<Stored<User>> for UserView {
    fn from(stored: Stored<User>) -> Self {
        Self {
            object: "users",
            created_date: display_date(&stored.created_at),
            updated_date: display_date(&stored.updated_at),
            id: stored.id,
            name: stored.data.name,
            email: stored.data.email,
            role: stored.data.role,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactView {
    pub object: &'static str,
    pub id: String,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub message: Option<String>,
    #[serde(rename = "followUpNote")]
    pub follow_up_note: Option<String>,
    pub status: ContactStatus,
    pub seo: Option<Seo>,
    pub created_date: String,
    pub updated_date: String,
}

impl From<Stored<ContactUs>> for ContactView {
    fn from(stored: Stored<ContactUs>) -> Self {
        let created_date = display_date(&stored.created_at);
        let updated_date = display_date(&stored.updated_at);
        let contact = stored.data;
        Self {
            object: "contacts",
            id: stored.id,
            name: contact.name,
            phone: contact.phone,
            address: contact.address,
            message: contact.message,
            follow_up_note: contact.follow_up_note,
            status: contact.status,
            seo: contact.seo,
            created_date,
            updated_date,
        }
    }
}
