use std::sync::{Arc, Mutex};

use alloy_dispatch::crm::{ContactGateway, ContactUpsert, CrmError};
use alloy_dispatch::workflows::leads::{CleaningLeadRequest, LeadIntakeService};
use async_trait::async_trait;

#[derive(Default)]
struct Contacts {
    upserts: Mutex<Vec<ContactUpsert>>,
}

#[async_trait]
impl ContactGateway for Contacts {
    async fn upsert_contact(&self, contact: &ContactUpsert) -> Result<String, CrmError> {
        let mut upserts = self.upserts.lock().expect("contacts mutex poisoned");
        upserts.push(contact.clone());
        Ok(format!("contact-{}", upserts.len()))
    }
}

fn lead() -> CleaningLeadRequest {
    CleaningLeadRequest {
        name: Some("Jordan Blake".to_string()),
        email: Some("jordan@example.com".to_string()),
        phone: Some("541-555-0190".to_string()),
        zip: Some("97702-1234".to_string()),
        ..CleaningLeadRequest::default()
    }
}

#[tokio::test]
async fn identical_submissions_are_not_deduplicated() {
    let contacts = Arc::new(Contacts::default());
    let service = LeadIntakeService::new(contacts.clone(), "Bend");

    let first = service.submit_cleaning_lead(lead()).await.expect("first");
    let second = service.submit_cleaning_lead(lead()).await.expect("second");

    assert_ne!(first.contact_id, second.contact_id);
    let upserts = contacts.upserts.lock().expect("contacts mutex poisoned").clone();
    assert_eq!(upserts.len(), 2);
    assert_eq!(upserts[0], upserts[1]);
    assert_eq!(upserts[0].postal_code.as_deref(), Some("97702-1234"));
}
