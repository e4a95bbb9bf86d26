use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PER_PAGE: u32 = 10;
pub const MAX_PER_PAGE: u32 = 50;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub address: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Phone {
    pub id: i64,
    pub contact_id: i64,
    pub number: String,
    pub label: Option<String>,
}

/// Fields to overwrite on a contact. `address: Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<Option<String>>,
}

impl ContactChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.address.is_none()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Request payloads
// ────────────────────────────────────────────────────────────────────────────

/// Decodes a request body into a JSON object. Anything that is not a JSON
/// object (empty, malformed, array, scalar) is an object with no keys.
pub fn parse_body(body: &[u8]) -> Map<String, Value> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Reads a field as text. Strings and numbers are accepted, `null` and a
/// missing key are absent, anything else is present but empty.
fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => Some(String::new()),
    }
}

/// Like [`text_field`], but a key that is present with `null` reads as blank.
fn keyed_text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    if obj.contains_key(key) {
        Some(text_field(obj, key).unwrap_or_default())
    } else {
        None
    }
}

pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhonePayload {
    pub number: Option<String>,
    pub label: Option<String>,
}

impl PhonePayload {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(obj) => Self::from_object(obj),
            _ => Self::default(),
        }
    }

    pub fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            number: text_field(obj, "number"),
            label: text_field(obj, "label"),
        }
    }

    pub fn trimmed_number(&self) -> Option<String> {
        non_blank(self.number.as_deref())
    }

    pub fn trimmed_label(&self) -> Option<String> {
        non_blank(self.label.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateContactPayload {
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub phones: Vec<PhonePayload>,
}

impl CreateContactPayload {
    pub fn from_object(obj: &Map<String, Value>) -> Self {
        let phones = match obj.get("phones") {
            Some(Value::Array(items)) => items.iter().map(PhonePayload::from_value).collect(),
            _ => Vec::new(),
        };
        Self {
            name: text_field(obj, "name"),
            email: text_field(obj, "email"),
            address: text_field(obj, "address"),
            phones,
        }
    }
}

/// Partial update. A field is `Some` when its key was sent; `email: null`
/// counts as not sent, while `name: null` and `address: null` read as blank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateContactPayload {
    pub name: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

impl UpdateContactPayload {
    pub fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            name: keyed_text_field(obj, "name"),
            email: text_field(obj, "email"),
            address: keyed_text_field(obj, "address"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub page: u32,
    pub per_page: u32,
    pub search: String,
}

/// Integer prefix of `text`: leading whitespace and an optional sign, then
/// as many digits as follow. `"12abc"` is 12, `"abc"` is 0, overflow saturates.
pub fn leading_int(text: &str) -> i64 {
    let text = text.trim_start();
    let (negative, rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let mut value: i64 = 0;
    for digit in rest.bytes().take_while(u8::is_ascii_digit) {
        let digit = i64::from(digit - b'0');
        value = if negative {
            value.saturating_mul(10).saturating_sub(digit)
        } else {
            value.saturating_mul(10).saturating_add(digit)
        };
    }
    value
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            per_page: DEFAULT_PER_PAGE,
            search: String::new(),
        }
    }
}

impl ListQuery {
    /// Missing values take defaults; numbers are read with [`leading_int`]
    /// and then clamped.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let int_param = |key: &str, default: u32| -> i64 {
            params
                .get(key)
                .map(|v| leading_int(v))
                .unwrap_or(i64::from(default))
        };

        let page = int_param("page", DEFAULT_PAGE).clamp(1, i64::from(u32::MAX));
        let per_page = int_param("per_page", DEFAULT_PER_PAGE)
            .clamp(1, i64::from(MAX_PER_PAGE));

        Self {
            page: page as u32,
            per_page: per_page as u32,
            search: params.get("search").cloned().unwrap_or_default(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Response shapes
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ContactSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub address: Option<String>,
}

impl From<Contact> for ContactSummary {
    fn from(c: Contact) -> Self {
        Self {
            id: c.id,
            name: c.name,
            email: c.email,
            address: c.address,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PhoneView {
    pub id: i64,
    pub number: String,
    pub label: Option<String>,
}

impl From<Phone> for PhoneView {
    fn from(p: Phone) -> Self {
        Self {
            id: p.id,
            number: p.number,
            label: p.label,
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ContactDetail {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub address: Option<String>,
    pub phones: Vec<PhoneView>,
}

impl ContactDetail {
    pub fn new(contact: Contact, phones: Vec<Phone>) -> Self {
        Self {
            id: contact.id,
            name: contact.name,
            email: contact.email,
            address: contact.address,
            phones: phones.into_iter().map(PhoneView::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ContactPage {
    pub data: Vec<ContactSummary>,
    pub total: i64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CreatedId {
    pub id: i64,
}

#[derive(Debug, Serialize, Clone)]
pub struct HealthResponse {
    pub status: String,
    pub db: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn list_query_defaults_and_clamps() {
        assert_eq!(ListQuery::from_params(&HashMap::new()), ListQuery::default());

        let q = ListQuery::from_params(&params(&[("page", "0"), ("per_page", "500")]));
        assert_eq!((q.page, q.per_page), (1, 50));

        let q = ListQuery::from_params(&params(&[("page", "abc"), ("per_page", "abc")]));
        assert_eq!((q.page, q.per_page), (1, 1));

        let q = ListQuery::from_params(&params(&[("page", "2x"), ("per_page", " 7 rows")]));
        assert_eq!((q.page, q.per_page), (2, 7));

        let q = ListQuery::from_params(&params(&[
            ("page", "3"),
            ("per_page", "5"),
            ("search", "tec"),
        ]));
        let expected = ListQuery {
            page: 3,
            per_page: 5,
            search: "tec".into(),
        };
        assert_eq!(q, expected);
    }

    #[test]
    fn leading_int_reads_the_numeric_prefix() {
        assert_eq!(leading_int("42"), 42);
        assert_eq!(leading_int("1abc"), 1);
        assert_eq!(leading_int("  +8 "), 8);
        assert_eq!(leading_int("-3x"), -3);
        assert_eq!(leading_int("abc"), 0);
        assert_eq!(leading_int(""), 0);
        assert_eq!(leading_int("-"), 0);
        assert_eq!(leading_int("99999999999999999999"), i64::MAX);
        assert_eq!(leading_int("-99999999999999999999"), i64::MIN);
    }

    #[test]
    fn non_object_bodies_read_as_empty() {
        assert!(parse_body(b"").is_empty());
        assert!(parse_body(b"not json").is_empty());
        assert!(parse_body(b"[1,2]").is_empty());
        assert_eq!(parse_body(br#"{"a":1}"#).len(), 1);
    }

    #[test]
    fn create_payload_reads_scalars_and_phones() {
        let body = json!({
            "name": "Teca",
            "email": null,
            "address": 42,
            "phones": [{"number": "38911112222", "label": "home"}, "junk"]
        });
        let payload = CreateContactPayload::from_object(body.as_object().unwrap());
        assert_eq!(payload.name.as_deref(), Some("Teca"));
        assert_eq!(payload.email, None);
        assert_eq!(payload.address.as_deref(), Some("42"));
        assert_eq!(payload.phones.len(), 2);
        assert_eq!(payload.phones[1], PhonePayload::default());
    }

    #[test]
    fn update_payload_distinguishes_null_per_field() {
        let body = json!({"name": null, "email": null, "address": null});
        let payload = UpdateContactPayload::from_object(body.as_object().unwrap());
        assert_eq!(payload.name.as_deref(), Some(""));
        assert_eq!(payload.email, None);
        assert_eq!(payload.address.as_deref(), Some(""));
    }

    #[test]
    fn phone_payload_trims_and_drops_blank_label() {
        let phone = PhonePayload {
            number: Some("  123 456 ".into()),
            label: Some("   ".into()),
        };
        assert_eq!(phone.trimmed_number().as_deref(), Some("123 456"));
        assert_eq!(phone.trimmed_label(), None);
    }
}
