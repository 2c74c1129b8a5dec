use std::io::Cursor;
use std::sync::{Arc, Mutex};

use alloy_dispatch::crm::{
    CrmError, DeliveryReceipt, JobAssignmentRecord, JobRecordGateway, MessagingError,
    MessagingGateway, SmsRecipient,
};
use alloy_dispatch::phone::PhoneNumber;
use alloy_dispatch::workflows::dispatch::{
    parse_booking, ContractorDirectory, ContractorReply, DispatchService, JobStatus, JobStore,
    OfferReply, ReplyOutcome, ReplySender,
};
use async_trait::async_trait;
use serde_json::json;

#[derive(Default)]
struct Outbox {
    messages: Mutex<Vec<(SmsRecipient, String)>>,
}

impl Outbox {
    fn to_phone(&self, phone: &str) -> Vec<String> {
        self.messages
            .lock()
            .expect("outbox mutex poisoned")
            .iter()
            .filter(|(recipient, _)| {
                recipient
                    .phone
                    .as_ref()
                    .is_some_and(|number| number.as_str() == phone)
            })
            .map(|(_, body)| body.clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.messages.lock().expect("outbox mutex poisoned").len()
    }
}

#[async_trait]
impl MessagingGateway for Outbox {
    async fn send_sms(
        &self,
        recipient: &SmsRecipient,
        body: &str,
    ) -> Result<DeliveryReceipt, MessagingError> {
        tokio::task::yield_now().await;
        self.messages
            .lock()
            .expect("outbox mutex poisoned")
            .push((recipient.clone(), body.to_string()));
        Ok(DeliveryReceipt::default())
    }
}

#[derive(Default)]
struct Ledger {
    assignments: Mutex<Vec<JobAssignmentRecord>>,
}

#[async_trait]
impl JobRecordGateway for Ledger {
    async fn record_assignment(&self, assignment: &JobAssignmentRecord) -> Result<(), CrmError> {
        self.assignments
            .lock()
            .expect("ledger mutex poisoned")
            .push(assignment.clone());
        Ok(())
    }
}

fn roster(count: usize) -> ContractorDirectory {
    let mut csv = String::from("id,name,phone,active,service_area,skills\n");
    for index in 1..=count {
        csv.push_str(&format!(
            "ctr-{index},Contractor {index},54155502{index:02},true,97701,cleaning\n"
        ));
    }
    ContractorDirectory::from_csv_reader(Cursor::new(csv)).expect("roster parses")
}

fn phone(index: usize) -> String {
    format!("+154155502{index:02}")
}

fn service(
    contractors: usize,
) -> (
    Arc<DispatchService<Outbox, Ledger>>,
    Arc<Outbox>,
    Arc<Ledger>,
) {
    let outbox = Arc::new(Outbox::default());
    let ledger = Arc::new(Ledger::default());
    let service = DispatchService::new(
        Arc::new(roster(contractors)),
        Arc::new(JobStore::new()),
        outbox.clone(),
        ledger.clone(),
    );
    (Arc::new(service), outbox, ledger)
}

fn appointment() -> serde_json::Value {
    json!({
        "contact_id": "cust-501",
        "full_name": "Robin Hale",
        "postal_code": "97701",
        "Estimated Price (Contact)": "$210",
        "How Will Your Cleaner Get Into Your Home": "Garage code",
        "Access Notes For Your Cleaner": "Code 2580, dog is friendly",
        "calendar": {
            "appointmentId": "appt-501",
            "startTime": "2025-12-02T09:00:00-08:00"
        }
    })
}

fn yes(index: usize) -> ContractorReply {
    ContractorReply {
        sender: ReplySender::Phone(PhoneNumber::parse(&phone(index)).expect("phone")),
        message_text: "YES".to_string(),
        job_id: None,
    }
}

#[tokio::test]
async fn crm_appointment_flows_through_to_assignment() {
    let (service, outbox, ledger) = service(3);
    let input = parse_booking(appointment(), service.default_skill()).expect("booking maps");

    let report = service.dispatch(input).await.expect("dispatch");
    assert_eq!(report.contractors_notified, 3);
    for index in 1..=3 {
        let offers = outbox.to_phone(&phone(index));
        assert_eq!(offers.len(), 1);
        assert!(offers[0].contains("$210.00"));
        assert!(!offers[0].contains("Garage code"));
    }

    let outcome = service.handle_reply(yes(2)).await.expect("reply");
    assert!(matches!(outcome, ReplyOutcome::Accepted { contractors_notified: 2, customer_notified: true, .. }));

    let confirmation = outbox.to_phone(&phone(2));
    assert_eq!(confirmation.len(), 2);
    assert!(confirmation[1].contains("Garage code"));
    assert!(confirmation[1].contains("dog is friendly"));

    let records = ledger.assignments.lock().expect("ledger mutex poisoned").clone();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].external_job_id, "appt-501");
    assert_eq!(records[0].contractor_id, "ctr-2");

    let before = outbox.len();
    let late = service.handle_reply(yes(1)).await.expect("reply");
    assert!(matches!(late, ReplyOutcome::AlreadyTaken { .. }));
    assert_eq!(outbox.len(), before + 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acceptances_assign_exactly_once() {
    const CONTRACTORS: usize = 6;
    let (service, _outbox, ledger) = service(CONTRACTORS);

    for round in 0..20 {
        let input = parse_booking(appointment(), service.default_skill()).expect("booking maps");
        let report = service.dispatch(input).await.expect("dispatch");
        let job_id = report.job.id.clone();

        let mut handles = Vec::new();
        for index in 1..=CONTRACTORS {
            let service = Arc::clone(&service);
            let mut reply = yes(index);
            reply.job_id = Some(job_id.0.clone());
            handles.push(tokio::spawn(async move { service.handle_reply(reply).await }));
        }

        let mut accepted = 0;
        let mut taken = 0;
        for handle in handles {
            match handle.await.expect("task joins").expect("reply handled") {
                ReplyOutcome::Accepted { .. } => accepted += 1,
                ReplyOutcome::AlreadyTaken { .. } => taken += 1,
                other => panic!("round {round}: unexpected outcome {other:?}"),
            }
        }
        assert_eq!(accepted, 1, "round {round}");
        assert_eq!(taken, CONTRACTORS - 1, "round {round}");

        let job = service.job(&job_id).expect("read").expect("job exists");
        assert_eq!(job.status, JobStatus::Assigned);
        let winners = job
            .offers
            .iter()
            .filter(|offer| offer.reply == OfferReply::Accepted)
            .count();
        assert_eq!(winners, 1, "round {round}");
        assert!(job
            .offers
            .iter()
            .all(|offer| offer.reply != OfferReply::Pending));
    }

    assert_eq!(ledger.assignments.lock().expect("ledger mutex poisoned").len(), 20);
}

#[tokio::test]
async fn unmatched_reply_changes_nothing() {
    let (service, outbox, _) = service(2);
    let input = parse_booking(appointment(), service.default_skill()).expect("booking maps");
    let report = service.dispatch(input).await.expect("dispatch");
    let before = outbox.len();

    let stranger = ContractorReply {
        sender: ReplySender::Phone(PhoneNumber::parse("+15415559999").expect("phone")),
        message_text: "YES".to_string(),
        job_id: None,
    };
    let outcome = service.handle_reply(stranger).await.expect("reply");
    assert_eq!(outcome, ReplyOutcome::NoMatchingJob { contractor_id: None });

    let job = service.job(&report.job.id).expect("read").expect("job exists");
    assert_eq!(job, report.job);
    assert_eq!(outbox.len(), before);
}
