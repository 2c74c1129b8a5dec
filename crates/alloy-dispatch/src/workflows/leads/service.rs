use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::domain::{CleaningLeadRequest, LeadKind, LeadReceipt, ProsApplicationRequest};
use super::validation::{validate_contact, LeadValidationError, ValidContact};
use crate::crm::{ContactGateway, ContactUpsert, CrmError};

const LEAD_SOURCE: &str = "Website Lead";

#[derive(Debug, thiserror::Error)]
pub enum LeadIntakeError {
    #[error(transparent)]
    Validation(#[from] LeadValidationError),
    #[error("contact could not be saved: {0}")]
    Upstream(#[from] CrmError),
}

/// Turns website submissions into CRM contacts. Submissions are not deduplicated;
/// the CRM's upsert decides whether a repeat creates a new contact.
pub struct LeadIntakeService<C> {
    contacts: Arc<C>,
    default_city: String,
}

impl<C> LeadIntakeService<C>
where
    C: ContactGateway + 'static,
{
    pub fn new(contacts: Arc<C>, default_city: impl Into<String>) -> Self {
        Self {
            contacts,
            default_city: default_city.into(),
        }
    }

    pub async fn submit_cleaning_lead(
        &self,
        lead: CleaningLeadRequest,
    ) -> Result<LeadReceipt, LeadIntakeError> {
        let contact = validate_contact(
            lead.name.as_deref(),
            lead.email.as_deref(),
            lead.phone.as_deref(),
            lead.zip.as_deref(),
        )?;

        let city = non_blank(lead.city).unwrap_or_else(|| self.default_city.clone());
        let address = non_blank(lead.address);

        let mut custom_fields = BTreeMap::new();
        if let Some(address) = &address {
            custom_fields.insert("address".to_string(), address.clone());
        }
        custom_fields.insert("city".to_string(), city.clone());
        if let Some(zip) = &contact.zip {
            custom_fields.insert("zip".to_string(), zip.clone());
        }
        insert_text(&mut custom_fields, "home_size", lead.home_size);
        if let Some(bedrooms) = lead.bedrooms {
            custom_fields.insert("bedrooms".to_string(), bedrooms.to_string());
        }
        if let Some(bathrooms) = lead.bathrooms {
            custom_fields.insert("bathrooms".to_string(), bathrooms.to_string());
        }
        insert_text(&mut custom_fields, "preferred_frequency", lead.preferred_frequency);
        insert_text(&mut custom_fields, "notes", lead.notes);

        let upsert = contact_upsert(contact, LeadKind::Cleaning, address, Some(city), custom_fields);
        self.submit(LeadKind::Cleaning, upsert).await
    }

    pub async fn submit_pros_application(
        &self,
        application: ProsApplicationRequest,
    ) -> Result<LeadReceipt, LeadIntakeError> {
        let contact = validate_contact(
            application.name.as_deref(),
            application.email.as_deref(),
            application.phone.as_deref(),
            None,
        )?;

        let mut custom_fields = BTreeMap::new();
        insert_text(&mut custom_fields, "experience", application.experience);
        insert_text(&mut custom_fields, "notes", application.notes);

        let upsert = contact_upsert(contact, LeadKind::ProsApplication, None, None, custom_fields);
        self.submit(LeadKind::ProsApplication, upsert).await
    }

    async fn submit(
        &self,
        kind: LeadKind,
        upsert: ContactUpsert,
    ) -> Result<LeadReceipt, LeadIntakeError> {
        match self.contacts.upsert_contact(&upsert).await {
            Ok(contact_id) => {
                info!(kind = ?kind, %contact_id, "lead saved to CRM");
                Ok(LeadReceipt { kind, contact_id })
            }
            Err(err) => {
                warn!(kind = ?kind, error = %err, "lead could not be saved to CRM");
                Err(err.into())
            }
        }
    }
}

fn contact_upsert(
    contact: ValidContact,
    kind: LeadKind,
    address: Option<String>,
    city: Option<String>,
    custom_fields: BTreeMap<String, String>,
) -> ContactUpsert {
    ContactUpsert {
        first_name: contact.first_name,
        last_name: contact.last_name,
        email: contact.email,
        phone: contact.phone,
        address,
        city,
        postal_code: contact.zip,
        source: LEAD_SOURCE.to_string(),
        tags: kind.tags().iter().map(|tag| tag.to_string()).collect(),
        custom_fields,
    }
}

fn insert_text(fields: &mut BTreeMap<String, String>, key: &str, value: Option<String>) {
    if let Some(value) = non_blank(value) {
        fields.insert(key.to_string(), value);
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}
