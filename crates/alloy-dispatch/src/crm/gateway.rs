use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::phone::PhoneNumber;

/// Contact record pushed to the CRM for website leads and pro applications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactUpsert {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<PhoneNumber>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub source: String,
    pub tags: Vec<String>,
    pub custom_fields: BTreeMap<String, String>,
}

/// Who an SMS is addressed to. The CRM conversations API routes by contact id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsRecipient {
    pub phone: Option<PhoneNumber>,
    pub contact_id: Option<String>,
}

impl SmsRecipient {
    pub fn label(&self) -> String {
        match (&self.contact_id, &self.phone) {
            (Some(contact_id), _) => contact_id.clone(),
            (None, Some(phone)) => phone.to_string(),
            (None, None) => "<unaddressed>".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub message_id: Option<String>,
}

/// Assignment details mirrored onto the CRM job record once a contractor wins a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAssignmentRecord {
    pub external_job_id: String,
    pub contractor_id: String,
    pub contractor_name: String,
    pub access_method: String,
    pub access_notes: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("CRM credentials are not configured")]
    NotConfigured,
    #[error("CRM transport failure: {0}")]
    Transport(String),
    #[error("CRM rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("CRM response missing {0}")]
    MalformedResponse(&'static str),
    #[error("CRM record not found: {0}")]
    NotFound(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("recipient {0} cannot be reached by SMS")]
    Undeliverable(String),
    #[error(transparent)]
    Crm(#[from] CrmError),
}

/// Outbound SMS transport. Each call is an independent, individually failable send.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send_sms(
        &self,
        recipient: &SmsRecipient,
        body: &str,
    ) -> Result<DeliveryReceipt, MessagingError>;
}

/// Contact creation in the CRM. Returns the CRM-assigned contact id.
#[async_trait]
pub trait ContactGateway: Send + Sync {
    async fn upsert_contact(&self, contact: &ContactUpsert) -> Result<String, CrmError>;
}

/// CRM job-record synchronisation for assignments.
#[async_trait]
pub trait JobRecordGateway: Send + Sync {
    async fn record_assignment(&self, assignment: &JobAssignmentRecord) -> Result<(), CrmError>;
}

/// Stand-in used when no CRM credentials are configured; every call fails loudly.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredCrm;

#[async_trait]
impl MessagingGateway for UnconfiguredCrm {
    async fn send_sms(
        &self,
        _recipient: &SmsRecipient,
        _body: &str,
    ) -> Result<DeliveryReceipt, MessagingError> {
        Err(CrmError::NotConfigured.into())
    }
}

#[async_trait]
impl ContactGateway for UnconfiguredCrm {
    async fn upsert_contact(&self, _contact: &ContactUpsert) -> Result<String, CrmError> {
        Err(CrmError::NotConfigured)
    }
}

#[async_trait]
impl JobRecordGateway for UnconfiguredCrm {
    async fn record_assignment(&self, _assignment: &JobAssignmentRecord) -> Result<(), CrmError> {
        Err(CrmError::NotConfigured)
    }
}
