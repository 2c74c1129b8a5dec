use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::domain::{normalize_tag, normalize_zip, AccessDetails, CustomerContact, JobInput};
use crate::phone::PhoneNumber;

const SERVICE_STANDARD: &str = "Standard Home Cleaning";
const SERVICE_DEEP: &str = "Deep Cleaning";

const ACCESS_METHOD_LABELS: &[&str] = &[
    "How Will Your Cleaner Get Into Your Home",
    "How will your cleaner get into your home",
    "How Will Your Cleaner Get Into Your Home?",
    "How will your cleaner get into your home?",
];
const ACCESS_NOTES_LABELS: &[&str] = &[
    "Access Notes For Your Cleaner",
    "Access notes for your cleaner",
    "Access notes for your cleaner?",
];

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("booking is missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("booking field {field} has an invalid timestamp '{value}'")]
    InvalidTimestamp { field: &'static str, value: String },
    #[error("booking field {field} is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("booking payload is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl BookingError {
    /// Field names the caller should fix.
    pub fn fields(&self) -> Vec<&'static str> {
        match self {
            BookingError::MissingFields(fields) => fields.clone(),
            BookingError::InvalidTimestamp { field, .. }
            | BookingError::InvalidField { field, .. } => vec![*field],
            BookingError::Malformed(_) => Vec::new(),
        }
    }
}

/// Normalized booking body accepted by `POST /dispatch`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingRequest {
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub service_label: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_contact_id: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub scheduled_start: Option<String>,
    #[serde(default)]
    pub scheduled_end: Option<String>,
    #[serde(default)]
    pub estimated_price: Option<f64>,
    #[serde(default)]
    pub access_method: Option<String>,
    #[serde(default)]
    pub access_notes: Option<String>,
}

impl BookingRequest {
    pub fn into_job_input(self) -> Result<JobInput, BookingError> {
        let service_type = non_blank(self.service_type).map(|value| normalize_tag(&value));
        let customer_name = non_blank(self.customer_name);
        let zip = non_blank(self.zip);
        let scheduled_start = non_blank(self.scheduled_start);

        let mut missing = Vec::new();
        if service_type.is_none() {
            missing.push("service_type");
        }
        if customer_name.is_none() {
            missing.push("customer_name");
        }
        if zip.is_none() {
            missing.push("zip");
        }
        if scheduled_start.is_none() {
            missing.push("scheduled_start");
        }

        let (Some(service_type), Some(customer_name), Some(zip), Some(scheduled_start)) =
            (service_type, customer_name, zip, scheduled_start)
        else {
            return Err(BookingError::MissingFields(missing));
        };

        let scheduled_start = parse_timestamp("scheduled_start", &scheduled_start)?;
        let scheduled_end = non_blank(self.scheduled_end)
            .map(|raw| parse_timestamp("scheduled_end", &raw))
            .transpose()?;

        let phone = non_blank(self.customer_phone)
            .map(|raw| PhoneNumber::parse(&raw))
            .transpose()
            .map_err(|err| BookingError::InvalidField {
                field: "customer_phone",
                reason: err.to_string(),
            })?;

        if let Some(price) = self.estimated_price {
            if !price.is_finite() || price < 0.0 {
                return Err(BookingError::InvalidField {
                    field: "estimated_price",
                    reason: "must be a non-negative amount".to_string(),
                });
            }
        }

        let service_label = non_blank(self.service_label).unwrap_or_else(|| service_type.clone());

        Ok(JobInput {
            external_id: non_blank(self.external_id),
            service_type,
            service_label,
            customer: CustomerContact {
                name: customer_name,
                phone,
                email: non_blank(self.customer_email),
                contact_id: non_blank(self.customer_contact_id),
            },
            zip: normalize_zip(&zip),
            scheduled_start,
            scheduled_end,
            estimated_price: self.estimated_price,
            access: AccessDetails {
                method: non_blank(self.access_method).unwrap_or_default(),
                notes: non_blank(self.access_notes).unwrap_or_default(),
            },
        })
    }
}

/// Accept either the normalized body or the CRM's raw appointment webhook, which is
/// recognised by its `calendar` object.
pub fn parse_booking(payload: Value, default_skill: &str) -> Result<JobInput, BookingError> {
    if payload.get("calendar").is_some_and(Value::is_object) {
        booking_from_appointment(&payload, default_skill).into_job_input()
    } else {
        serde_json::from_value::<BookingRequest>(payload)?.into_job_input()
    }
}

/// Map the CRM appointment webhook onto a booking request.
pub fn booking_from_appointment(payload: &Value, default_skill: &str) -> BookingRequest {
    let calendar = payload.get("calendar").cloned().unwrap_or(Value::Null);

    let full_name = text(payload, "full_name").or_else(|| {
        let first = text(payload, "first_name").unwrap_or_default();
        let last = text(payload, "last_name").unwrap_or_default();
        let joined = format!("{first} {last}").trim().to_string();
        (!joined.is_empty()).then_some(joined)
    });

    let breakdown = text(payload, "Price Breakdown (Contact)").unwrap_or_default();
    let estimated_price = text(payload, "Estimated Price (Contact)")
        .or_else(|| text(payload, "Estimated Price"))
        .and_then(|raw| parse_amount(&raw))
        .filter(|amount| *amount > 0.0)
        .or_else(|| price_from_breakdown(&breakdown));

    let service_label = if breakdown.contains("Deep") {
        SERVICE_DEEP
    } else {
        SERVICE_STANDARD
    };

    let external_id = text(&calendar, "appointmentId");
    // The customer is reached by contact id; a phone the CRM let through malformed is dropped.
    let customer_phone = text(payload, "phone").filter(|raw| match PhoneNumber::parse(raw) {
        Ok(_) => true,
        Err(err) => {
            warn!(
                external_id = external_id.as_deref().unwrap_or("-"),
                error = %err,
                "dropping unparseable customer phone from appointment"
            );
            false
        }
    });

    BookingRequest {
        external_id,
        service_type: Some(default_skill.to_string()),
        service_label: Some(service_label.to_string()),
        customer_name: full_name,
        customer_phone,
        customer_email: text(payload, "email"),
        customer_contact_id: text(payload, "contact_id"),
        zip: text(payload, "postal_code")
            .or_else(|| text(payload, "zip"))
            .or_else(|| text(payload, "postalCode")),
        scheduled_start: text(&calendar, "startTime"),
        scheduled_end: text(&calendar, "endTime"),
        estimated_price,
        access_method: first_text(payload, ACCESS_METHOD_LABELS),
        access_notes: first_text(payload, ACCESS_NOTES_LABELS),
    }
}

fn text(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(raw) => non_blank(Some(raw.clone())),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn first_text(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| text(value, key))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(&['$', ','][..], "").trim().parse::<f64>().ok()
}

fn price_from_breakdown(breakdown: &str) -> Option<f64> {
    breakdown
        .lines()
        .filter(|line| line.contains("Total"))
        .find_map(|line| line.rsplit_once(':').and_then(|(_, amount)| parse_amount(amount)))
}

/// RFC 3339 first, then the CRM's naive `YYYY-MM-DD HH:MM:SS` form, read as UTC.
fn parse_timestamp(
    field: &'static str,
    raw: &str,
) -> Result<DateTime<FixedOffset>, BookingError> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed);
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc().fixed_offset());
        }
    }
    Err(BookingError::InvalidTimestamp {
        field,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn appointment() -> Value {
        json!({
            "contact_id": "cust-contact-1",
            "first_name": "Jordan",
            "last_name": "Blake",
            "phone": "(541) 555-0190",
            "postal_code": "97701",
            "Estimated Price (Contact)": "$1,240.50",
            "Price Breakdown (Contact)": "Deep clean\nTotal: $999",
            "How will your cleaner get into your home?": "Lockbox",
            "Access notes for your cleaner": "Code 4411",
            "calendar": {
                "appointmentId": "appt-77",
                "startTime": "2025-11-28T10:00:00-08:00",
                "endTime": "2025-11-28T13:00:00-08:00"
            }
        })
    }

    #[test]
    fn maps_crm_appointment_payload() {
        let input = parse_booking(appointment(), "cleaning").expect("maps");
        assert_eq!(input.external_id.as_deref(), Some("appt-77"));
        assert_eq!(input.customer.name, "Jordan Blake");
        assert_eq!(input.customer.contact_id.as_deref(), Some("cust-contact-1"));
        assert_eq!(
            input.customer.phone.as_ref().map(PhoneNumber::as_str),
            Some("+15415550190")
        );
        assert_eq!(input.service_type, "cleaning");
        assert_eq!(input.service_label, "Deep Cleaning");
        assert_eq!(input.estimated_price, Some(1240.5));
        assert_eq!(input.zip, "97701");
        assert_eq!(input.access.method, "Lockbox");
        assert_eq!(input.access.notes, "Code 4411");
        assert!(input.scheduled_end.is_some());
    }

    #[test]
    fn appointment_with_malformed_phone_still_books() {
        let mut payload = appointment();
        payload["phone"] = json!("555-0190");

        let input = parse_booking(payload, "cleaning").expect("phone is optional");
        assert_eq!(input.customer.phone, None);
        assert_eq!(input.customer.contact_id.as_deref(), Some("cust-contact-1"));
        assert_eq!(input.external_id.as_deref(), Some("appt-77"));
    }

    #[test]
    fn zip_plus_four_books_under_its_base_zip() {
        let mut payload = appointment();
        payload["postal_code"] = json!("97701-1234");

        let input = parse_booking(payload, "cleaning").expect("maps");
        assert_eq!(input.zip, "97701");
    }

    #[test]
    fn falls_back_to_breakdown_total() {
        let mut payload = appointment();
        payload
            .as_object_mut()
            .expect("object")
            .remove("Estimated Price (Contact)");
        payload["Price Breakdown (Contact)"] = json!("Standard clean\nTotal: $185.00");

        let input = parse_booking(payload, "cleaning").expect("maps");
        assert_eq!(input.estimated_price, Some(185.0));
        assert_eq!(input.service_label, "Standard Home Cleaning");
    }

    #[test]
    fn appointment_and_normalized_shapes_agree() {
        let from_crm = parse_booking(appointment(), "cleaning").expect("crm shape");
        let normalized = parse_booking(
            json!({
                "external_id": "appt-77",
                "service_type": "Cleaning",
                "service_label": "Deep Cleaning",
                "customer_name": "Jordan Blake",
                "customer_phone": "541-555-0190",
                "customer_contact_id": "cust-contact-1",
                "zip": "97701",
                "scheduled_start": "2025-11-28T10:00:00-08:00",
                "scheduled_end": "2025-11-28T13:00:00-08:00",
                "estimated_price": 1240.5,
                "access_method": "Lockbox",
                "access_notes": "Code 4411"
            }),
            "cleaning",
        )
        .expect("normalized shape");
        assert_eq!(from_crm, normalized);
    }

    #[test]
    fn reports_every_missing_field() {
        match parse_booking(json!({ "service_type": "cleaning" }), "cleaning") {
            Err(BookingError::MissingFields(fields)) => {
                assert_eq!(fields, vec!["customer_name", "zip", "scheduled_start"]);
            }
            other => panic!("expected missing fields, got {other:?}"),
        }
    }

    #[test]
    fn accepts_naive_crm_timestamps_as_utc() {
        let input = BookingRequest {
            service_type: Some("cleaning".to_string()),
            customer_name: Some("Jordan".to_string()),
            zip: Some("97701".to_string()),
            scheduled_start: Some("2025-11-28 10:00:00".to_string()),
            ..BookingRequest::default()
        }
        .into_job_input()
        .expect("valid");
        assert_eq!(input.scheduled_start.to_rfc3339(), "2025-11-28T10:00:00+00:00");
    }

    #[test]
    fn rejects_bad_timestamps_and_phones() {
        let base = BookingRequest {
            service_type: Some("cleaning".to_string()),
            customer_name: Some("Jordan".to_string()),
            zip: Some("97701".to_string()),
            scheduled_start: Some("next tuesday".to_string()),
            ..BookingRequest::default()
        };
        assert!(matches!(
            base.clone().into_job_input(),
            Err(BookingError::InvalidTimestamp { field: "scheduled_start", .. })
        ));

        let bad_phone = BookingRequest {
            scheduled_start: Some("2025-11-28T10:00:00Z".to_string()),
            customer_phone: Some("12".to_string()),
            ..base
        };
        let err = bad_phone.into_job_input().expect_err("phone rejected");
        assert_eq!(err.fields(), vec!["customer_phone"]);
    }
}
