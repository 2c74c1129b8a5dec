use std::fmt;

use serde::Serialize;

use crate::phone::PhoneNumber;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Every field problem found in one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadValidationError {
    pub fields: Vec<FieldError>,
}

impl fmt::Display for LeadValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.fields.iter().map(|error| error.field).collect();
        write!(f, "invalid submission fields: {}", names.join(", "))
    }
}

impl std::error::Error for LeadValidationError {}

/// Contact details that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidContact {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<PhoneNumber>,
    pub zip: Option<String>,
}

pub fn validate_contact(
    name: Option<&str>,
    email: Option<&str>,
    phone: Option<&str>,
    zip: Option<&str>,
) -> Result<ValidContact, LeadValidationError> {
    let mut errors = Vec::new();

    let name = present(name);
    if name.is_none() {
        errors.push(FieldError::new("name", "name is required"));
    }

    let email = present(email);
    let phone_raw = present(phone);
    if email.is_none() && phone_raw.is_none() {
        errors.push(FieldError::new("phone", "a phone number or email is required"));
        errors.push(FieldError::new("email", "a phone number or email is required"));
    }

    if let Some(email) = email {
        if !looks_like_email(email) {
            errors.push(FieldError::new("email", "email address is not valid"));
        }
    }

    let phone = match phone_raw.map(PhoneNumber::parse).transpose() {
        Ok(phone) => phone,
        Err(err) => {
            errors.push(FieldError::new("phone", err.to_string()));
            None
        }
    };

    let zip = present(zip);
    if let Some(zip) = zip {
        if !is_zip(zip) {
            errors.push(FieldError::new("zip", "zip must be 5 digits or ZIP+4"));
        }
    }

    if !errors.is_empty() {
        return Err(LeadValidationError { fields: errors });
    }

    let (first_name, last_name) = split_name(name.unwrap_or_default());
    Ok(ValidContact {
        first_name,
        last_name,
        email: email.map(str::to_string),
        phone,
        zip: zip.map(str::to_string),
    })
}

/// First whitespace separates first and last name; a single word has no last name.
pub fn split_name(full_name: &str) -> (String, String) {
    match full_name.trim().split_once(char::is_whitespace) {
        Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
        None => (full_name.trim().to_string(), String::new()),
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn looks_like_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

fn is_zip(zip: &str) -> bool {
    let digits = |part: &str, len: usize| part.len() == len && part.chars().all(|ch| ch.is_ascii_digit());
    match zip.split_once('-') {
        Some((base, plus4)) => digits(base, 5) && digits(plus4, 4),
        None => digits(zip, 5),
    }
}
