use std::collections::HashSet;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use chrono::DateTime;
use serde_json::Value;

use crate::crm::{
    CrmError, DeliveryReceipt, JobAssignmentRecord, JobRecordGateway, MessagingError,
    MessagingGateway, SmsRecipient,
};
use crate::phone::PhoneNumber;
use crate::workflows::dispatch::{
    AccessDetails, ContractorDirectory, ContractorReply, CustomerContact, DispatchService,
    JobInput, JobStore, ReplySender,
};

pub(super) const ROSTER: &str = "\
id,name,phone,active,service_area,skills,rating
ctr-x,Xavier Cole,5415550101,true,97701;97702,cleaning,4.8
ctr-y,Yara Stone,5415550102,true,97701,cleaning;deep_cleaning,4.6
ctr-z,Zane Ortiz,5415550103,true,97701,cleaning,
ctr-off,Olive Fern,5415550104,false,97701,cleaning,
";

pub(super) const X_PHONE: &str = "+15415550101";
pub(super) const Y_PHONE: &str = "+15415550102";
pub(super) const Z_PHONE: &str = "+15415550103";
pub(super) const CUSTOMER_CONTACT: &str = "cust-77";

pub(super) fn directory() -> ContractorDirectory {
    ContractorDirectory::from_csv_reader(Cursor::new(ROSTER)).expect("roster parses")
}

pub(super) fn job_input() -> JobInput {
    JobInput {
        external_id: Some("appt-77".to_string()),
        service_type: "cleaning".to_string(),
        service_label: "Standard Home Cleaning".to_string(),
        customer: CustomerContact {
            name: "Jordan Blake".to_string(),
            phone: Some(PhoneNumber::parse("5415550190").expect("phone")),
            email: None,
            contact_id: Some(CUSTOMER_CONTACT.to_string()),
        },
        zip: "97701".to_string(),
        scheduled_start: DateTime::parse_from_rfc3339("2025-11-28T10:00:00-08:00")
            .expect("valid timestamp"),
        scheduled_end: None,
        estimated_price: Some(185.0),
        access: AccessDetails {
            method: "Lockbox".to_string(),
            notes: "Code 4411".to_string(),
        },
    }
}

pub(super) fn reply_from(phone: &str, text: &str) -> ContractorReply {
    ContractorReply {
        sender: ReplySender::Phone(PhoneNumber::parse(phone).expect("phone")),
        message_text: text.to_string(),
        job_id: None,
    }
}

pub(super) type TestService = DispatchService<RecordingMessenger, RecordingJobRecords>;

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) messenger: Arc<RecordingMessenger>,
    pub(super) job_records: Arc<RecordingJobRecords>,
}

pub(super) fn harness() -> Harness {
    harness_with(directory(), RecordingMessenger::default())
}

pub(super) fn harness_with(directory: ContractorDirectory, messenger: RecordingMessenger) -> Harness {
    let messenger = Arc::new(messenger);
    let job_records = Arc::new(RecordingJobRecords::default());
    let service = DispatchService::new(
        Arc::new(directory),
        Arc::new(JobStore::new()),
        messenger.clone(),
        job_records.clone(),
    );
    Harness {
        service: Arc::new(service),
        messenger,
        job_records,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct SentMessage {
    pub(super) recipient: SmsRecipient,
    pub(super) body: String,
}

impl SentMessage {
    pub(super) fn to_phone(&self, phone: &str) -> bool {
        self.recipient
            .phone
            .as_ref()
            .is_some_and(|number| number.as_str() == phone)
    }

    pub(super) fn to_contact(&self, contact_id: &str) -> bool {
        self.recipient.contact_id.as_deref() == Some(contact_id)
    }
}

#[derive(Default)]
pub(super) struct RecordingMessenger {
    sent: Mutex<Vec<SentMessage>>,
    failing_phones: HashSet<String>,
}

impl RecordingMessenger {
    pub(super) fn failing_for(phones: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing_phones: phones.iter().map(|phone| phone.to_string()).collect(),
        }
    }

    pub(super) fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().expect("messenger mutex poisoned").clone()
    }

    pub(super) fn sent_to_phone(&self, phone: &str) -> Vec<SentMessage> {
        self.sent()
            .into_iter()
            .filter(|message| message.to_phone(phone))
            .collect()
    }

    pub(super) fn clear(&self) {
        self.sent.lock().expect("messenger mutex poisoned").clear();
    }
}

#[async_trait]
impl MessagingGateway for RecordingMessenger {
    async fn send_sms(
        &self,
        recipient: &SmsRecipient,
        body: &str,
    ) -> Result<DeliveryReceipt, MessagingError> {
        if let Some(phone) = &recipient.phone {
            if self.failing_phones.contains(phone.as_str()) {
                return Err(MessagingError::Undeliverable(recipient.label()));
            }
        }
        let mut sent = self.sent.lock().expect("messenger mutex poisoned");
        sent.push(SentMessage {
            recipient: recipient.clone(),
            body: body.to_string(),
        });
        Ok(DeliveryReceipt {
            message_id: Some(format!("msg-{}", sent.len())),
        })
    }
}

#[derive(Default)]
pub(super) struct RecordingJobRecords {
    records: Mutex<Vec<JobAssignmentRecord>>,
}

impl RecordingJobRecords {
    pub(super) fn records(&self) -> Vec<JobAssignmentRecord> {
        self.records.lock().expect("records mutex poisoned").clone()
    }
}

#[async_trait]
impl JobRecordGateway for RecordingJobRecords {
    async fn record_assignment(&self, assignment: &JobAssignmentRecord) -> Result<(), CrmError> {
        self.records
            .lock()
            .expect("records mutex poisoned")
            .push(assignment.clone());
        Ok(())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
