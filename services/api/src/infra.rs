use alloy_dispatch::config::{CrmConfig, DispatchConfig};
use alloy_dispatch::crm::{
    ContactGateway, ContactUpsert, CrmError, DeliveryReceipt, JobAssignmentRecord,
    JobRecordGateway, LeadConnectorClient, MessagingError, MessagingGateway, SmsRecipient,
    UnconfiguredCrm,
};
use alloy_dispatch::workflows::dispatch::{ContractorDirectory, DirectoryError};
use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// CRM integration selected at startup.
pub(crate) enum CrmBackend {
    LeadConnector(LeadConnectorClient),
    Unconfigured(UnconfiguredCrm),
}

impl CrmBackend {
    pub(crate) fn from_config(config: Option<&CrmConfig>) -> Result<Self, CrmError> {
        match config {
            Some(config) => {
                info!(base_url = %config.base_url, location_id = %config.location_id, "CRM client configured");
                Ok(Self::LeadConnector(LeadConnectorClient::new(config)?))
            }
            None => {
                warn!("GHL_API_KEY or GHL_LOCATION_ID missing; CRM calls will fail");
                Ok(Self::Unconfigured(UnconfiguredCrm))
            }
        }
    }
}

#[async_trait]
impl MessagingGateway for CrmBackend {
    async fn send_sms(
        &self,
        recipient: &SmsRecipient,
        body: &str,
    ) -> Result<DeliveryReceipt, MessagingError> {
        match self {
            CrmBackend::LeadConnector(client) => client.send_sms(recipient, body).await,
            CrmBackend::Unconfigured(stub) => stub.send_sms(recipient, body).await,
        }
    }
}

#[async_trait]
impl ContactGateway for CrmBackend {
    async fn upsert_contact(&self, contact: &ContactUpsert) -> Result<String, CrmError> {
        match self {
            CrmBackend::LeadConnector(client) => client.upsert_contact(contact).await,
            CrmBackend::Unconfigured(stub) => stub.upsert_contact(contact).await,
        }
    }
}

#[async_trait]
impl JobRecordGateway for CrmBackend {
    async fn record_assignment(&self, assignment: &JobAssignmentRecord) -> Result<(), CrmError> {
        match self {
            CrmBackend::LeadConnector(client) => client.record_assignment(assignment).await,
            CrmBackend::Unconfigured(stub) => stub.record_assignment(assignment).await,
        }
    }
}

/// Roster from `ALLOY_CONTRACTORS_CSV`, or an empty directory when none is configured.
pub(crate) fn load_directory(config: &DispatchConfig) -> Result<ContractorDirectory, DirectoryError> {
    match &config.contractors_csv {
        Some(path) => {
            let directory = ContractorDirectory::from_path(path)?;
            info!(path = %path.display(), contractors = directory.len(), "contractor directory loaded");
            Ok(directory)
        }
        None => {
            warn!("ALLOY_CONTRACTORS_CSV not set; every dispatch will find no contractors");
            Ok(ContractorDirectory::empty())
        }
    }
}

/// Messaging double for the CLI demo. Keeps every message in memory.
#[derive(Default)]
pub(crate) struct InMemoryMessenger {
    sent: Mutex<Vec<(SmsRecipient, String)>>,
}

impl InMemoryMessenger {
    pub(crate) fn sent(&self) -> Vec<(SmsRecipient, String)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MessagingGateway for InMemoryMessenger {
    async fn send_sms(
        &self,
        recipient: &SmsRecipient,
        body: &str,
    ) -> Result<DeliveryReceipt, MessagingError> {
        let mut sent = self.sent.lock().unwrap_or_else(PoisonError::into_inner);
        sent.push((recipient.clone(), body.to_string()));
        Ok(DeliveryReceipt {
            message_id: Some(format!("demo-{}", sent.len())),
        })
    }
}

/// CRM double for the CLI demo.
#[derive(Default)]
pub(crate) struct InMemoryCrm {
    contacts: Mutex<Vec<ContactUpsert>>,
    assignments: Mutex<Vec<JobAssignmentRecord>>,
}

impl InMemoryCrm {
    pub(crate) fn assignments(&self) -> Vec<JobAssignmentRecord> {
        self.assignments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ContactGateway for InMemoryCrm {
    async fn upsert_contact(&self, contact: &ContactUpsert) -> Result<String, CrmError> {
        let mut contacts = self.contacts.lock().unwrap_or_else(PoisonError::into_inner);
        contacts.push(contact.clone());
        Ok(format!("demo-contact-{}", contacts.len()))
    }
}

#[async_trait]
impl JobRecordGateway for InMemoryCrm {
    async fn record_assignment(&self, assignment: &JobAssignmentRecord) -> Result<(), CrmError> {
        self.assignments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(assignment.clone());
        Ok(())
    }
}
