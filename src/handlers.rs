use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};

use crate::{
    models::{
        non_blank, parse_body, ContactChanges, ContactDetail, ContactPage, ContactSummary,
        CreateContactPayload, CreatedId, ListQuery, PhonePayload, UpdateContactPayload,
    },
    router::{Endpoint, RouteMatch},
    store::{ContactStore, PhoneStore, StoreError},
    validator::{self, FieldErrors},
};

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

const CONTACT_NOT_FOUND: &str = "Contact not found";
const PHONE_NOT_FOUND: &str = "Phone not found";
const EMAIL_EXISTS: &str = "Email already exists";

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Option<Value>,
}

impl ApiResponse {
    pub fn json(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::json(StatusCode::OK, body)
    }

    pub fn created(id: i64) -> Self {
        Self::json(StatusCode::CREATED, json!(CreatedId { id }))
    }

    pub fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            body: None,
        }
    }

    pub fn error(status: StatusCode, msg: &str) -> Self {
        Self::json(status, json!({"error": msg}))
    }

    pub fn not_found(msg: &str) -> Self {
        Self::error(StatusCode::NOT_FOUND, msg)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let content_type = [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)];
        match self.body {
            Some(body) => (self.status, content_type, body.to_string()).into_response(),
            None => (self.status, content_type).into_response(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(FieldErrors),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("{context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },
}

impl From<FieldErrors> for ApiError {
    fn from(errors: FieldErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<ApiError> for ApiResponse {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Validation(errors) => {
                ApiResponse::json(StatusCode::UNPROCESSABLE_ENTITY, json!({"errors": errors}))
            }
            ApiError::NotFound(msg) => ApiResponse::not_found(msg),
            ApiError::Conflict(msg) => ApiResponse::error(StatusCode::CONFLICT, msg),
            ApiError::Store { context, source } => {
                error!("{}: {}", context, source);
                ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, context)
            }
        }
    }
}

// a duplicate key can only come from the contact email
fn store_error(context: &'static str) -> impl FnOnce(StoreError) -> ApiError {
    move |source| match source {
        StoreError::DuplicateKey => ApiError::Conflict(EMAIL_EXISTS),
        source => ApiError::Store { context, source },
    }
}

const SERVER_ERROR: &str = "Server Error";

/// Validates requests, drives the stores and shapes responses for each
/// contacts endpoint.
pub struct ContactHandler {
    contacts: Arc<dyn ContactStore>,
    phones: Arc<dyn PhoneStore>,
}

impl ContactHandler {
    pub fn new(contacts: Arc<dyn ContactStore>, phones: Arc<dyn PhoneStore>) -> Self {
        Self { contacts, phones }
    }

    pub fn handle(
        &self,
        matched: &RouteMatch,
        query: &HashMap<String, String>,
        body: &[u8],
    ) -> ApiResponse {
        let id = matched.params.id("id");
        let result = match matched.endpoint {
            Endpoint::ListContacts => self.list(&ListQuery::from_params(query)),
            Endpoint::GetContact => self.get(id),
            Endpoint::CreateContact => {
                self.create(&CreateContactPayload::from_object(&parse_body(body)))
            }
            Endpoint::UpdateContact => {
                self.update(id, &UpdateContactPayload::from_object(&parse_body(body)))
            }
            Endpoint::DeleteContact => self.delete(id),
            Endpoint::AddPhone => {
                self.add_phone(id, &PhonePayload::from_object(&parse_body(body)))
            }
            Endpoint::DeletePhone => self.delete_phone(id, matched.params.id("phoneId")),
        };
        result.unwrap_or_else(ApiResponse::from)
    }

    pub fn store_healthy(&self) -> bool {
        match self.contacts.health_check() {
            Ok(()) => true,
            Err(e) => {
                warn!("health check failed: {}", e);
                false
            }
        }
    }

    fn require_contact(&self, id: i64) -> Result<(), ApiError> {
        match self.contacts.get_contact(id).map_err(store_error(SERVER_ERROR))? {
            Some(_) => Ok(()),
            None => Err(ApiError::NotFound(CONTACT_NOT_FOUND)),
        }
    }

    pub fn list(&self, query: &ListQuery) -> Result<ApiResponse, ApiError> {
        let contacts = self
            .contacts
            .list_contacts(&query.search, query.page, query.per_page)
            .map_err(store_error(SERVER_ERROR))?;
        let total = self
            .contacts
            .count_contacts(&query.search)
            .map_err(store_error(SERVER_ERROR))?;

        let page = ContactPage {
            data: contacts.into_iter().map(ContactSummary::from).collect(),
            total,
        };
        Ok(ApiResponse::ok(json!(page)))
    }

    pub fn get(&self, id: i64) -> Result<ApiResponse, ApiError> {
        let contact = self
            .contacts
            .get_contact(id)
            .map_err(store_error(SERVER_ERROR))?
            .ok_or(ApiError::NotFound(CONTACT_NOT_FOUND))?;
        let phones = self
            .phones
            .list_phones_by_contact(contact.id)
            .map_err(store_error(SERVER_ERROR))?;
        Ok(ApiResponse::ok(json!(ContactDetail::new(contact, phones))))
    }

    /// Phones are inserted one at a time after the contact; a failure part way
    /// leaves what was already written.
    pub fn create(&self, payload: &CreateContactPayload) -> Result<ApiResponse, ApiError> {
        const FAILED: &str = "Failed to create contact";

        validator::validate_contact_creation(payload)?;
        validator::validate_phones_for_creation(&payload.phones)?;

        let name = payload.name.as_deref().unwrap_or_default().trim();
        let email = payload.email.as_deref().unwrap_or_default().trim();
        let address = non_blank(payload.address.as_deref());

        let contact = self
            .contacts
            .create_contact(name, email, address.as_deref())
            .map_err(store_error(FAILED))?;

        for phone in &payload.phones {
            let Some(number) = phone.trimmed_number() else {
                continue;
            };
            self.phones
                .add_phone(contact.id, &number, phone.trimmed_label().as_deref())
                .map_err(store_error(FAILED))?;
        }

        Ok(ApiResponse::created(contact.id))
    }

    pub fn update(&self, id: i64, payload: &UpdateContactPayload) -> Result<ApiResponse, ApiError> {
        const FAILED: &str = "Failed to update contact";

        self.require_contact(id)?;

        let mut errors = FieldErrors::new();
        let mut changes = ContactChanges::default();

        if let Some(name) = payload.name.as_deref().map(str::trim) {
            if name.is_empty() {
                errors.insert("name", validator::REQUIRED);
            } else if !validator::validate_name(name) {
                errors.insert("name", validator::INVALID);
            }
            changes.name = Some(name.to_string());
        }
        if let Some(email) = payload.email.as_deref() {
            if !validator::validate_email(email) {
                errors.insert("email", validator::INVALID);
            }
            changes.email = Some(email.trim().to_string());
        }
        if let Some(address) = payload.address.as_deref().map(str::trim) {
            if !validator::validate_address(address) {
                errors.insert("address", validator::INVALID);
            }
            changes.address = Some(Some(address.to_string()));
        }
        errors.into_result()?;

        let updated = self
            .contacts
            .update_contact(id, &changes)
            .map_err(store_error(FAILED))?
            .ok_or(ApiError::NotFound(CONTACT_NOT_FOUND))?;
        Ok(ApiResponse::ok(json!(CreatedId { id: updated.id })))
    }

    pub fn delete(&self, id: i64) -> Result<ApiResponse, ApiError> {
        self.require_contact(id)?;
        self.contacts
            .delete_contact(id)
            .map_err(store_error(SERVER_ERROR))?;
        Ok(ApiResponse::no_content())
    }

    pub fn add_phone(
        &self,
        contact_id: i64,
        input: &PhonePayload,
    ) -> Result<ApiResponse, ApiError> {
        self.require_contact(contact_id)?;

        let mut errors = FieldErrors::new();
        let number = input.trimmed_number();
        match number.as_deref() {
            None => errors.insert("number", validator::REQUIRED),
            Some(n) if !validator::validate_phone_number(n) => {
                errors.insert("number", validator::INVALID)
            }
            Some(_) => {}
        }
        let label = input.trimmed_label();
        if !validator::validate_phone_label(label.as_deref()) {
            errors.insert("label", validator::INVALID);
        }
        errors.into_result()?;

        let number = number.unwrap_or_default();
        let phone = self
            .phones
            .add_phone(contact_id, &number, label.as_deref())
            .map_err(store_error("Failed to add phone"))?;
        Ok(ApiResponse::created(phone.id))
    }

    /// The last remaining phone of a contact cannot be deleted.
    pub fn delete_phone(&self, contact_id: i64, phone_id: i64) -> Result<ApiResponse, ApiError> {
        self.require_contact(contact_id)?;

        let last_phone = || {
            ApiError::Validation(FieldErrors::single("phones", validator::AT_LEAST_ONE_REQUIRED))
        };

        let phones = self
            .phones
            .list_phones_by_contact(contact_id)
            .map_err(store_error(SERVER_ERROR))?;
        if phones.len() <= 1 {
            return Err(last_phone());
        }
        if !phones.iter().any(|p| p.id == phone_id) {
            return Err(ApiError::NotFound(PHONE_NOT_FOUND));
        }

        // a concurrent delete may have taken the other phones since the read
        let deleted = self
            .phones
            .delete_phone_keeping_one(contact_id, phone_id)
            .map_err(store_error(SERVER_ERROR))?;
        if !deleted {
            return Err(last_phone());
        }
        Ok(ApiResponse::no_content())
    }
}
