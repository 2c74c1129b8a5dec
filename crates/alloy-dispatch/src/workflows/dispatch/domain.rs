use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::crm::SmsRecipient;
use crate::phone::PhoneNumber;

/// Identifier wrapper for contractors. Doubles as the contractor's CRM contact id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractorId(pub String);

impl fmt::Display for ContractorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for dispatched jobs (`job-000042`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contractor {
    pub id: ContractorId,
    pub name: String,
    pub phone: PhoneNumber,
    pub active: bool,
    pub service_area: BTreeSet<String>,
    pub skills: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
}

impl Contractor {
    /// Active, skilled for `service_type` and covering `zip`.
    pub fn is_eligible(&self, service_type: &str, zip: &str) -> bool {
        self.active
            && self.skills.contains(&normalize_tag(service_type))
            && self.service_area.contains(&normalize_zip(zip))
    }

    pub fn recipient(&self) -> SmsRecipient {
        SmsRecipient {
            phone: Some(self.phone.clone()),
            contact_id: Some(self.id.0.clone()),
        }
    }
}

pub(crate) fn normalize_tag(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// ZIP+4 codes collapse to their five-digit base; other values are normalized as tags.
pub(crate) fn normalize_zip(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.split_once('-') {
        Some((base, extension))
            if base.len() == 5
                && extension.len() == 4
                && base.bytes().chain(extension.bytes()).all(|b| b.is_ascii_digit()) =>
        {
            base.to_string()
        }
        _ => normalize_tag(trimmed),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerContact {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<PhoneNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
}

impl CustomerContact {
    pub fn recipient(&self) -> Option<SmsRecipient> {
        if self.phone.is_none() && self.contact_id.is_none() {
            return None;
        }
        Some(SmsRecipient {
            phone: self.phone.clone(),
            contact_id: self.contact_id.clone(),
        })
    }
}

/// Home access instructions. Only revealed to the contractor who wins the job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDetails {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub notes: String,
}

/// Validated booking ready to be dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInput {
    pub external_id: Option<String>,
    pub service_type: String,
    pub service_label: String,
    pub customer: CustomerContact,
    pub zip: String,
    pub scheduled_start: DateTime<FixedOffset>,
    pub scheduled_end: Option<DateTime<FixedOffset>>,
    pub estimated_price: Option<f64>,
    pub access: AccessDetails,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Open,
    Assigned,
    Expired,
    Cancelled,
}

impl JobStatus {
    pub const fn label(self) -> &'static str {
        match self {
            JobStatus::Open => "open",
            JobStatus::Assigned => "assigned",
            JobStatus::Expired => "expired",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Open)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferReply {
    Pending,
    Accepted,
    Declined,
    NoResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Queued,
    Sent { message_id: Option<String> },
    Undeliverable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub job_id: JobId,
    pub contractor_id: ContractorId,
    pub contractor_name: String,
    pub phone: PhoneNumber,
    pub sent_at: DateTime<Utc>,
    pub reply: OfferReply,
    pub replied_at: Option<DateTime<Utc>>,
    /// Set when the offer was closed because another contractor accepted first.
    pub superseded: bool,
    pub delivery: DeliveryStatus,
}

impl Offer {
    pub fn new(job_id: JobId, contractor: &Contractor, sent_at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            contractor_id: contractor.id.clone(),
            contractor_name: contractor.name.clone(),
            phone: contractor.phone.clone(),
            sent_at,
            reply: OfferReply::Pending,
            replied_at: None,
            superseded: false,
            delivery: DeliveryStatus::Queued,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.reply == OfferReply::Pending
    }

    pub fn recipient(&self) -> SmsRecipient {
        SmsRecipient {
            phone: Some(self.phone.clone()),
            contact_id: Some(self.contractor_id.0.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub contractor_id: ContractorId,
    pub contractor_name: String,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Process-wide dispatch order; breaks `sent_at` ties between jobs.
    pub sequence: u64,
    pub external_id: Option<String>,
    pub service_type: String,
    pub service_label: String,
    pub customer: CustomerContact,
    pub zip: String,
    pub scheduled_start: DateTime<FixedOffset>,
    pub scheduled_end: Option<DateTime<FixedOffset>>,
    pub estimated_price: Option<f64>,
    pub access: AccessDetails,
    pub status: JobStatus,
    pub assigned: Option<Assignment>,
    pub dispatched_at: DateTime<Utc>,
    pub offers: Vec<Offer>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("job {job_id} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub job_id: JobId,
    pub from: JobStatus,
    pub to: JobStatus,
}

impl Job {
    pub fn open(id: JobId, sequence: u64, input: JobInput, dispatched_at: DateTime<Utc>) -> Self {
        let JobInput {
            external_id,
            service_type,
            service_label,
            customer,
            zip,
            scheduled_start,
            scheduled_end,
            estimated_price,
            access,
        } = input;

        Self {
            id,
            sequence,
            external_id,
            service_type,
            service_label,
            customer,
            zip,
            scheduled_start,
            scheduled_end,
            estimated_price,
            access,
            status: JobStatus::Open,
            assigned: None,
            dispatched_at,
            offers: Vec::new(),
        }
    }

    /// Move the job out of OPEN. Terminal states never change again.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if self.status.is_terminal() || next == JobStatus::Open {
            return Err(TransitionError {
                job_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.status == JobStatus::Open
    }

    pub fn offer_for(&self, contractor_id: &ContractorId) -> Option<&Offer> {
        self.offers
            .iter()
            .find(|offer| &offer.contractor_id == contractor_id)
    }

    pub fn offer_for_mut(&mut self, contractor_id: &ContractorId) -> Option<&mut Offer> {
        self.offers
            .iter_mut()
            .find(|offer| &offer.contractor_id == contractor_id)
    }

    /// Adds an offer unless the contractor already holds one for this job.
    pub fn add_offer(&mut self, offer: Offer) -> bool {
        if self.offer_for(&offer.contractor_id).is_some() {
            return false;
        }
        self.offers.push(offer);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contractor(id: &str, phone: &str) -> Contractor {
        Contractor {
            id: ContractorId(id.to_string()),
            name: format!("Contractor {id}"),
            phone: PhoneNumber::parse(phone).expect("phone"),
            active: true,
            service_area: ["97701".to_string()].into_iter().collect(),
            skills: ["cleaning".to_string()].into_iter().collect(),
            rating: None,
        }
    }

    fn job() -> Job {
        let start = DateTime::parse_from_rfc3339("2025-11-28T10:00:00-08:00").expect("ts");
        Job::open(
            JobId("job-000001".to_string()),
            1,
            JobInput {
                external_id: None,
                service_type: "cleaning".to_string(),
                service_label: "Standard Home Cleaning".to_string(),
                customer: CustomerContact {
                    name: "Pat".to_string(),
                    phone: None,
                    email: None,
                    contact_id: None,
                },
                zip: "97701".to_string(),
                scheduled_start: start,
                scheduled_end: None,
                estimated_price: None,
                access: AccessDetails::default(),
            },
            Utc::now(),
        )
    }

    #[test]
    fn open_jobs_move_to_any_terminal_state_once() {
        for terminal in [JobStatus::Assigned, JobStatus::Expired, JobStatus::Cancelled] {
            let mut job = job();
            job.transition(terminal).expect("open jobs can close");
            assert_eq!(job.status, terminal);

            for next in [
                JobStatus::Open,
                JobStatus::Assigned,
                JobStatus::Expired,
                JobStatus::Cancelled,
            ] {
                let err = job.transition(next).expect_err("terminal states are final");
                assert_eq!(err.from, terminal);
                assert_eq!(err.to, next);
            }
        }
    }

    #[test]
    fn open_to_open_is_rejected() {
        let mut job = job();
        assert!(job.transition(JobStatus::Open).is_err());
    }

    #[test]
    fn one_offer_per_contractor() {
        let mut job = job();
        let x = contractor("x", "5415550101");
        assert!(job.add_offer(Offer::new(job.id.clone(), &x, Utc::now())));
        assert!(!job.add_offer(Offer::new(job.id.clone(), &x, Utc::now())));
        assert_eq!(job.offers.len(), 1);
    }

    #[test]
    fn eligibility_requires_active_skill_and_area() {
        let mut x = contractor("x", "5415550101");
        assert!(x.is_eligible(" Cleaning ", "97701"));
        assert!(!x.is_eligible("cleaning", "97702"));
        assert!(!x.is_eligible("landscaping", "97701"));
        x.active = false;
        assert!(!x.is_eligible("cleaning", "97701"));
    }

    #[test]
    fn zip_plus_four_matches_its_base_area() {
        let x = contractor("x", "5415550101");
        assert!(x.is_eligible("cleaning", "97701-1234"));
        assert!(!x.is_eligible("cleaning", "97702-1234"));
        assert_eq!(normalize_zip(" 97701-1234 "), "97701");
        assert_eq!(normalize_zip("97701-12"), "97701-12");
    }
}
