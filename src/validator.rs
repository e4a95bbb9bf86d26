use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::models::{CreateContactPayload, PhonePayload};

pub const MAX_NAME_LENGTH: usize = 255;
pub const MAX_EMAIL_LENGTH: usize = 255;
pub const MAX_ADDRESS_LENGTH: usize = 1000;
pub const MIN_PHONE_LENGTH: usize = 3;
pub const MAX_PHONE_LENGTH: usize = 64;
pub const MAX_LABEL_LENGTH: usize = 64;

pub const REQUIRED: &str = "required";
pub const INVALID: &str = "invalid";
pub const AT_LEAST_ONE_REQUIRED: &str = "at_least_one_required";

pub const PHONES_REQUIRED: &str = "At least one phone number is required";
pub const PHONES_INVALID_NUMBER: &str = "One or more phone numbers are invalid";
pub const PHONES_INVALID_LABEL: &str = "One or more phone labels are invalid";

/// Failing fields of a request, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &'static str, code: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.insert(field, code);
        errors
    }

    /// Records `code` for `field`, replacing any earlier code for it.
    pub fn insert(&mut self, field: &'static str, code: impl Into<String>) {
        self.0.insert(field, code.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(
            r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63}$",
        )
        .expect("email pattern compiles")
    })
}

pub fn validate_email(email: &str) -> bool {
    let Some((local, _)) = email.split_once('@') else {
        return false;
    };
    email.chars().count() <= MAX_EMAIL_LENGTH
        && local.len() <= 64
        && email_regex().is_match(email)
}

pub fn validate_name(name: &str) -> bool {
    let len = name.trim().chars().count();
    len > 0 && len <= MAX_NAME_LENGTH
}

pub fn validate_address(address: &str) -> bool {
    let len = address.trim().chars().count();
    len > 0 && len <= MAX_ADDRESS_LENGTH
}

/// Digits, spaces and `-+()` only, 3 to 64 characters once trimmed.
pub fn validate_phone_number(number: &str) -> bool {
    let trimmed = number.trim();
    let len = trimmed.chars().count();
    (MIN_PHONE_LENGTH..=MAX_PHONE_LENGTH).contains(&len)
        && trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '+' | '(' | ')'))
}

pub fn validate_phone_label(label: Option<&str>) -> bool {
    match label {
        None | Some("") => true,
        Some(label) => label.chars().count() <= MAX_LABEL_LENGTH,
    }
}

fn check_required(
    errors: &mut FieldErrors,
    field: &'static str,
    value: Option<&str>,
    valid: fn(&str) -> bool,
) {
    // blank is decided on the trimmed text, validity on the text as sent
    match value {
        None => errors.insert(field, REQUIRED),
        Some(v) if v.trim().is_empty() => errors.insert(field, REQUIRED),
        Some(v) if !valid(v) => errors.insert(field, INVALID),
        Some(_) => {}
    }
}

pub fn validate_contact_creation(payload: &CreateContactPayload) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    check_required(&mut errors, "name", payload.name.as_deref(), validate_name);
    check_required(&mut errors, "email", payload.email.as_deref(), validate_email);
    check_required(&mut errors, "address", payload.address.as_deref(), validate_address);
    errors.into_result()
}

/// Entries with a blank number are skipped. Invalid entries do not stop the
/// scan; the `phones` message reflects the last problem seen.
pub fn validate_phones_for_creation(phones: &[PhonePayload]) -> Result<(), FieldErrors> {
    if phones.is_empty() {
        return Err(FieldErrors::single("phones", PHONES_REQUIRED));
    }

    let mut errors = FieldErrors::new();
    let mut has_valid = false;
    for phone in phones {
        if let Some(number) = phone.trimmed_number() {
            if validate_phone_number(&number) {
                has_valid = true;
            } else {
                errors.insert("phones", PHONES_INVALID_NUMBER);
            }
        }
        if !validate_phone_label(phone.label.as_deref()) {
            errors.insert("phones", PHONES_INVALID_LABEL);
        }
    }

    if !has_valid && !errors.contains("phones") {
        errors.insert("phones", PHONES_REQUIRED);
    }
    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phone(number: &str, label: Option<&str>) -> PhonePayload {
        PhonePayload {
            number: Some(number.to_string()),
            label: label.map(str::to_string),
        }
    }

    #[test]
    fn email_syntax_and_length() {
        assert!(validate_email("teca@example.com"));
        assert!(validate_email("first.last+tag@mail.example.org"));
        assert!(!validate_email("teca"));
        assert!(!validate_email("teca@"));
        assert!(!validate_email("@example.com"));
        assert!(!validate_email("teca@localhost"));
        assert!(!validate_email("te..ca@example.com"));
        assert!(!validate_email("teca@exa mple.com"));

        let long = format!("{}@{}.com", "a".repeat(60), "b".repeat(200));
        assert!(long.len() > MAX_EMAIL_LENGTH);
        assert!(!validate_email(&long));
    }

    #[test]
    fn name_and_address_bounds() {
        assert!(validate_name("  Teca "));
        assert!(!validate_name("   "));
        assert!(validate_name(&"n".repeat(255)));
        assert!(!validate_name(&"n".repeat(256)));

        assert!(validate_address("Street 1"));
        assert!(!validate_address(""));
        assert!(validate_address(&"a".repeat(1000)));
        assert!(!validate_address(&"a".repeat(1001)));
    }

    #[test]
    fn phone_number_charset_and_length() {
        assert!(validate_phone_number("38911112222"));
        assert!(validate_phone_number("+389 (2) 111-222"));
        assert!(validate_phone_number(" 123 "));
        assert!(!validate_phone_number("12"));
        assert!(!validate_phone_number("call me"));
        assert!(!validate_phone_number("123x"));
        assert!(!validate_phone_number(&"1".repeat(65)));
    }

    #[test]
    fn phone_label_is_optional() {
        assert!(validate_phone_label(None));
        assert!(validate_phone_label(Some("")));
        assert!(validate_phone_label(Some("home")));
        assert!(!validate_phone_label(Some(&"l".repeat(65))));
    }

    #[test]
    fn contact_creation_reports_each_failing_field() {
        let payload = CreateContactPayload {
            name: Some("  ".into()),
            email: Some("nope".into()),
            address: None,
            phones: vec![],
        };
        let errors = validate_contact_creation(&payload).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors.get("name"), Some(REQUIRED));
        assert_eq!(errors.get("email"), Some(INVALID));
        assert_eq!(errors.get("address"), Some(REQUIRED));

        let ok = CreateContactPayload {
            name: Some("Teca".into()),
            email: Some("teca@example.com".into()),
            address: Some("Street 1".into()),
            phones: vec![],
        };
        assert!(validate_contact_creation(&ok).is_ok());
    }

    #[test]
    fn padded_email_is_invalid_not_required() {
        let payload = CreateContactPayload {
            name: Some("  Teca  ".into()),
            email: Some(" teca@example.com ".into()),
            address: Some(" Street 1 ".into()),
            phones: vec![],
        };
        let errors = validate_contact_creation(&payload).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.get("email"), Some(INVALID));
    }

    #[test]
    fn padded_label_counts_its_spaces() {
        let label = format!("  {}", "x".repeat(63));
        let errors =
            validate_phones_for_creation(&[phone("38911112222", Some(&label))]).unwrap_err();
        assert_eq!(errors.get("phones"), Some(PHONES_INVALID_LABEL));

        let label = format!("  {}", "x".repeat(62));
        assert!(validate_phones_for_creation(&[phone("38911112222", Some(&label))]).is_ok());
    }

    #[test]
    fn phones_required_when_empty_or_all_blank() {
        let errors = validate_phones_for_creation(&[]).unwrap_err();
        assert_eq!(errors.get("phones"), Some(PHONES_REQUIRED));

        let errors = validate_phones_for_creation(&[phone("  ", None), PhonePayload::default()])
            .unwrap_err();
        assert_eq!(errors.get("phones"), Some(PHONES_REQUIRED));
    }

    #[test]
    fn blank_entries_are_skipped_next_to_a_valid_one() {
        let phones = [phone("", None), phone("38911112222", Some("home"))];
        assert!(validate_phones_for_creation(&phones).is_ok());
    }

    #[test]
    fn last_phone_problem_wins() {
        let errors = validate_phones_for_creation(&[
            phone("38911112222", Some(&"l".repeat(70))),
            phone("bad number", None),
        ])
        .unwrap_err();
        assert_eq!(errors.get("phones"), Some(PHONES_INVALID_NUMBER));

        let errors = validate_phones_for_creation(&[
            phone("bad number", None),
            phone("38911112222", Some(&"l".repeat(70))),
        ])
        .unwrap_err();
        assert_eq!(errors.get("phones"), Some(PHONES_INVALID_LABEL));
    }

    #[test]
    fn invalid_number_fails_even_with_a_valid_one() {
        let errors = validate_phones_for_creation(&[phone("38911112222", None), phone("abc", None)])
            .unwrap_err();
        assert_eq!(errors.get("phones"), Some(PHONES_INVALID_NUMBER));
    }
}
