use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use serde_json::Value;

use crate::crm::{ContactGateway, ContactUpsert, CrmError};
use crate::workflows::leads::{CleaningLeadRequest, LeadIntakeService, ProsApplicationRequest};

#[derive(Default)]
pub(super) struct RecordingContacts {
    upserts: Mutex<Vec<ContactUpsert>>,
}

impl RecordingContacts {
    pub(super) fn upserts(&self) -> Vec<ContactUpsert> {
        self.upserts.lock().expect("contacts mutex poisoned").clone()
    }
}

#[async_trait]
impl ContactGateway for RecordingContacts {
    async fn upsert_contact(&self, contact: &ContactUpsert) -> Result<String, CrmError> {
        let mut upserts = self.upserts.lock().expect("contacts mutex poisoned");
        upserts.push(contact.clone());
        Ok(format!("contact-{}", upserts.len()))
    }
}

pub(super) struct RejectingContacts;

#[async_trait]
impl ContactGateway for RejectingContacts {
    async fn upsert_contact(&self, _contact: &ContactUpsert) -> Result<String, CrmError> {
        Err(CrmError::Rejected {
            status: 401,
            body: "invalid token".to_string(),
        })
    }
}

pub(super) fn build_service() -> (LeadIntakeService<RecordingContacts>, Arc<RecordingContacts>) {
    let contacts = Arc::new(RecordingContacts::default());
    (LeadIntakeService::new(contacts.clone(), "Bend"), contacts)
}

pub(super) fn cleaning_lead() -> CleaningLeadRequest {
    CleaningLeadRequest {
        name: Some("Jordan Blake".to_string()),
        email: Some("jordan@example.com".to_string()),
        phone: Some("(541) 555-0190".to_string()),
        address: Some("12 Pine St".to_string()),
        city: None,
        zip: Some("97701".to_string()),
        home_size: Some("3-4 bedrooms".to_string()),
        bedrooms: Some(3),
        bathrooms: Some(2),
        preferred_frequency: Some("bi-weekly".to_string()),
        notes: Some("  ".to_string()),
    }
}

pub(super) fn pros_application() -> ProsApplicationRequest {
    ProsApplicationRequest {
        name: Some("Casey Nguyen".to_string()),
        email: Some("casey@example.com".to_string()),
        phone: Some("541-555-0177".to_string()),
        experience: Some("6 years residential cleaning".to_string()),
        notes: None,
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 16 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
