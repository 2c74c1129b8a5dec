//! Outbound integrations with the CRM/automation platform: contact upserts, SMS delivery
//! through its conversations API, and job-record assignment sync.

mod gateway;
mod lead_connector;

pub use gateway::{
    ContactGateway, ContactUpsert, CrmError, DeliveryReceipt, JobAssignmentRecord,
    JobRecordGateway, MessagingError, MessagingGateway, SmsRecipient, UnconfiguredCrm,
};
pub use lead_connector::LeadConnectorClient;
