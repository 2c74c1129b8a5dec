//! Website lead intake: cleaning requests and contractor applications become CRM contacts.

pub mod domain;
pub mod router;
pub mod service;
pub mod validation;

#[cfg(test)]
mod tests;

pub use domain::{CleaningLeadRequest, LeadKind, LeadReceipt, ProsApplicationRequest};
pub use router::lead_router;
pub use service::{LeadIntakeError, LeadIntakeService};
pub use validation::{split_name, validate_contact, FieldError, LeadValidationError};
