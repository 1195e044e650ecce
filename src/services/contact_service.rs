use serde::Deserialize;
use serde_json::Value;
use std::borrow::Cow;
use thiserror::Error;
use validator::{Validate, ValidationError};

use super::ListParams;
use crate::api::format::ContactView;
use crate::database::models::{ContactStatus, ContactUs, Seo};
use crate::database::{paginate, Document, Page, Repository, StoreError};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum ContactError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Contact not found")]
    NotFound,
}

impl From<ContactError> for ApiError {
    fn from(err: ContactError) -> Self {
        match err {
            ContactError::Store(e) => e.into(),
            ContactError::NotFound => ApiError::not_found(err.to_string()),
        }
    }
}

fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let digits = phone.chars().all(|c| c.is_ascii_digit());
    let len = phone.chars().count();
    if phone.is_empty() {
        Err(ValidationError::new("phone").with_message(Cow::Borrowed("Phone is required")))
    } else if !digits || !(10..=15).contains(&len) {
        Err(ValidationError::new("phone").with_message(Cow::Borrowed("Phone must be 10 to 15 digits")))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitContact {
    #[serde(default)]
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(custom(function = "validate_phone"))]
    pub phone: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    #[validate(length(min = 1, message = "Message cannot be empty"))]
    pub message: Option<String>,
    pub seo: Option<Seo>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContact {
    pub status: Option<ContactStatus>,
    #[validate(length(min = 1, message = "Follow-up note cannot be empty"))]
    pub follow_up_note: Option<String>,
}

/// Contact-form submissions
#[derive(Clone)]
pub struct ContactService {
    contacts: Repository<ContactUs>,
}

impl ContactService {
    pub fn new(state: &AppState) -> Self {
        Self { contacts: state.contacts() }
    }

    pub async fn submit(&self, input: SubmitContact) -> Result<ContactView, ContactError> {
        let contact = ContactUs {
            name: input.name,
            phone: input.phone,
            address: input.address,
            message: input.message,
            follow_up_note: None,
            status: ContactStatus::Pending,
            seo: input.seo,
        };
        Ok(ContactView::from(self.contacts.create(contact).await?))
    }

    pub async fn list(&self, params: &ListParams) -> Result<Page<ContactView>, ContactError> {
        let page = paginate(&self.contacts, &params.criteria, &params.sort, params.page, params.per_page).await?;
        Ok(page.map(ContactView::from))
    }

    pub async fn get(&self, id: &str) -> Result<ContactView, ContactError> {
        self.contacts.fetch_by_id(id).await?.map(ContactView::from).ok_or(ContactError::NotFound)
    }

    /// Record follow-up progress; only status and note are writable
    pub async fn update(&self, id: &str, input: UpdateContact) -> Result<ContactView, ContactError> {
        let mut patch = Document::new();
        if let Some(status) = input.status {
            patch.insert("status".to_string(), serde_json::to_value(status).map_err(StoreError::from)?);
        }
        if let Some(note) = input.follow_up_note {
            patch.insert("followUpNote".to_string(), Value::String(note));
        }
        self.contacts.update(id, patch).await?.map(ContactView::from).ok_or(ContactError::NotFound)
    }

    pub async fn delete(&self, id: &str, deleted_by: Option<&str>) -> Result<(), ContactError> {
        self.contacts.soft_delete(id, deleted_by).await?.ok_or(ContactError::NotFound)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::database::models::EntityRegistry;
    use crate::database::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn service() -> ContactService {
        let state = AppState::new(
            Arc::new(MemoryStore::new()),
            Arc::new(EntityRegistry::standard()),
            &AppConfig::development(),
        );
        ContactService::new(&state)
    }

    fn submission(phone: &str) -> SubmitContact {
        SubmitContact {
            name: "Ada".to_string(),
            phone: phone.to_string(),
            address: "1 Main St".to_string(),
            message: Some("Call me".to_string()),
            seo: None,
        }
    }

    #[test]
    fn phone_must_be_ten_to_fifteen_digits() {
        assert!(submission("0123456789").validate().is_ok());
        assert!(submission("012345678").validate().is_err());
        assert!(submission("0123456789012345").validate().is_err());
        assert!(submission("01234-56789").validate().is_err());
    }

    #[test]
    fn update_rejects_unknown_status() {
        let parsed: Result<UpdateContact, _> = serde_json::from_value(json!({ "status": "archived" }));
        assert!(parsed.is_err());
        let parsed: UpdateContact = serde_json::from_value(json!({ "status": "followed-up" })).unwrap();
        assert_eq!(parsed.status, Some(ContactStatus::FollowedUp));
    }

    #[tokio::test]
    async fn submit_update_and_delete() {
        let service = service();
        let view = service.submit(submission("0123456789")).await.unwrap();
        assert_eq!(view.status, ContactStatus::Pending);

        let update = UpdateContact {
            status: Some(ContactStatus::FollowedUp),
            follow_up_note: Some("<p>Called back</p>".to_string()),
        };
        let updated = service.update(&view.id, update).await.unwrap();
        assert_eq!(updated.status, ContactStatus::FollowedUp);
        assert_eq!(updated.follow_up_note.as_deref(), Some("<p>Called back</p>"));
        assert_eq!(updated.message.as_deref(), Some("Call me"));

        service.delete(&view.id, Some("u1")).await.unwrap();
        assert!(matches!(service.get(&view.id).await, Err(ContactError::NotFound)));
        assert!(matches!(service.update(&view.id, UpdateContact::default()).await, Err(ContactError::NotFound)));
    }
}
