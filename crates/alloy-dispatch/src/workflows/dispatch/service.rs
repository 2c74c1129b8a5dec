use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::classifier::{classify, ReplyIntent};
use super::directory::ContractorDirectory;
use super::domain::{
    Assignment, Contractor, ContractorId, DeliveryStatus, Job, JobId, JobInput, JobStatus, Offer,
    OfferReply, TransitionError,
};
use super::notices;
use super::store::{JobStore, OfferRef, StoreError};
use crate::crm::{
    DeliveryReceipt, JobAssignmentRecord, JobRecordGateway, MessagingError, MessagingGateway,
    SmsRecipient,
};
use crate::phone::PhoneNumber;

/// Result of fanning a job out to eligible contractors.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub job: Job,
    pub contractors_notified: usize,
    pub deliveries_failed: usize,
    /// Business condition, not a failure: the job stays OPEN with no offers.
    pub no_contractors_available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplySender {
    Phone(PhoneNumber),
    ContactId(String),
}

#[derive(Debug, Clone)]
pub struct ContractorReply {
    pub sender: ReplySender,
    pub message_text: String,
    /// Job id supplied out of band by the webhook; takes precedence over one in the text.
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReplyOutcome {
    Accepted {
        job_id: JobId,
        contractor_id: ContractorId,
        contractor_name: String,
        contractors_notified: usize,
        customer_notified: bool,
    },
    Declined {
        job_id: JobId,
        contractor_id: ContractorId,
    },
    AlreadyTaken {
        job_id: JobId,
        contractor_id: ContractorId,
        contractor_notified: bool,
    },
    NoMatchingJob {
        #[serde(skip_serializing_if = "Option::is_none")]
        contractor_id: Option<ContractorId>,
    },
    Unrecognized {
        job_id: JobId,
        contractor_id: ContractorId,
        message_text: String,
        clarification_sent: bool,
    },
}

impl ReplyOutcome {
    pub const fn label(&self) -> &'static str {
        match self {
            ReplyOutcome::Accepted { .. } => "accepted",
            ReplyOutcome::Declined { .. } => "declined",
            ReplyOutcome::AlreadyTaken { .. } => "already_taken",
            ReplyOutcome::NoMatchingJob { .. } => "no_matching_job",
            ReplyOutcome::Unrecognized { .. } => "unrecognized",
        }
    }

    /// True when the reply changed an offer.
    pub const fn is_resolved(&self) -> bool {
        matches!(
            self,
            ReplyOutcome::Accepted { .. } | ReplyOutcome::Declined { .. }
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

enum Resolution {
    Pending(JobId),
    Superseded(JobId),
    Nothing,
}

enum AcceptDecision {
    Won { job: Job, superseded: Vec<Offer> },
    AlreadyTaken,
    OfferClosed,
}

enum Notice {
    Winner,
    JobFilled,
    Customer,
}

/// Dispatcher and reply processor over an injected directory, job store and gateways.
pub struct DispatchService<M, J> {
    directory: Arc<ContractorDirectory>,
    store: Arc<JobStore>,
    messaging: Arc<M>,
    job_records: Arc<J>,
    default_skill: String,
}

impl<M, J> DispatchService<M, J>
where
    M: MessagingGateway + 'static,
    J: JobRecordGateway + 'static,
{
    pub fn new(
        directory: Arc<ContractorDirectory>,
        store: Arc<JobStore>,
        messaging: Arc<M>,
        job_records: Arc<J>,
    ) -> Self {
        Self {
            directory,
            store,
            messaging,
            job_records,
            default_skill: "cleaning".to_string(),
        }
    }

    /// Skill tag assigned to raw CRM appointment bookings.
    pub fn with_default_skill(mut self, skill: impl Into<String>) -> Self {
        self.default_skill = skill.into();
        self
    }

    pub fn default_skill(&self) -> &str {
        &self.default_skill
    }

    pub fn directory(&self) -> &ContractorDirectory {
        &self.directory
    }

    pub fn jobs(&self) -> Result<Vec<Job>, StoreError> {
        self.store.snapshot()
    }

    pub fn job(&self, job_id: &JobId) -> Result<Option<Job>, StoreError> {
        self.store.get(job_id)
    }

    /// Open a job, offer it to every eligible contractor and record each delivery.
    pub async fn dispatch(&self, input: JobInput) -> Result<DispatchReport, DispatchError> {
        let (job_id, sequence) = self.store.next_id();
        let now = Utc::now();
        let eligible = self
            .directory
            .list_eligible(&input.service_type, &input.zip);

        let mut job = Job::open(job_id.clone(), sequence, input, now);
        for contractor in &eligible {
            job.add_offer(Offer::new(job_id.clone(), contractor, now));
        }

        let body = notices::offer(&job);
        let messages: Vec<_> = job
            .offers
            .iter()
            .map(|offer| (offer.contractor_id.clone(), offer.recipient(), body.clone()))
            .collect();
        let (service_type, zip) = (job.service_type.clone(), job.zip.clone());
        self.store.insert(job)?;

        if messages.is_empty() {
            warn!(%job_id, %service_type, %zip, "no contractors available for dispatch");
            return Ok(DispatchReport {
                job: self.snapshot(&job_id)?,
                contractors_notified: 0,
                deliveries_failed: 0,
                no_contractors_available: true,
            });
        }

        info!(%job_id, offers = messages.len(), "dispatching job offers");
        let results = self.deliver(messages).await;

        let (notified, failed) = self.store.update(&job_id, |job| {
            let (mut notified, mut failed) = (0, 0);
            for (contractor_id, result) in &results {
                let Some(offer) = job.offer_for_mut(contractor_id) else {
                    continue;
                };
                offer.delivery = match result {
                    Ok(receipt) => {
                        notified += 1;
                        DeliveryStatus::Sent {
                            message_id: receipt.message_id.clone(),
                        }
                    }
                    Err(err) => {
                        failed += 1;
                        DeliveryStatus::Undeliverable {
                            reason: err.to_string(),
                        }
                    }
                };
            }
            (notified, failed)
        })?;

        for (contractor_id, result) in &results {
            if let Err(err) = result {
                warn!(%job_id, %contractor_id, error = %err, "offer SMS undeliverable");
            }
        }

        Ok(DispatchReport {
            job: self.snapshot(&job_id)?,
            contractors_notified: notified,
            deliveries_failed: failed,
            no_contractors_available: false,
        })
    }

    /// Close an open job without assigning it. Unanswered offers become NO_RESPONSE.
    pub fn cancel(&self, job_id: &JobId) -> Result<Job, DispatchError> {
        let job = self.store.update(job_id, |job| -> Result<Job, TransitionError> {
            job.transition(JobStatus::Cancelled)?;
            for offer in job.offers.iter_mut().filter(|offer| offer.is_pending()) {
                offer.reply = OfferReply::NoResponse;
            }
            Ok(job.clone())
        })??;

        info!(%job_id, "job cancelled");
        Ok(job)
    }

    /// Interpret an inbound contractor SMS and apply it to the matching offer.
    pub async fn handle_reply(
        &self,
        reply: ContractorReply,
    ) -> Result<ReplyOutcome, DispatchError> {
        let contractor = match &reply.sender {
            ReplySender::Phone(phone) => self.directory.find_by_phone(phone),
            ReplySender::ContactId(id) => self.directory.find_by_id(&ContractorId(id.clone())),
        };
        let Some(contractor) = contractor.cloned() else {
            warn!(sender = ?reply.sender, "reply from unknown contractor");
            return Ok(ReplyOutcome::NoMatchingJob {
                contractor_id: None,
            });
        };

        let classified = classify(&reply.message_text);
        let reference = reply.job_id.clone().or(classified.job_reference);
        let offers = self.store.offers_for(&contractor.id)?;

        let job_id = match resolve(&offers, reference.as_deref()) {
            Resolution::Pending(job_id) => job_id,
            Resolution::Superseded(job_id) if classified.intent == ReplyIntent::Accept => {
                return Ok(self.inform_already_taken(&contractor, job_id).await);
            }
            Resolution::Superseded(_) | Resolution::Nothing => {
                info!(contractor_id = %contractor.id, "reply matched no open job");
                return Ok(ReplyOutcome::NoMatchingJob {
                    contractor_id: Some(contractor.id),
                });
            }
        };

        match classified.intent {
            ReplyIntent::Accept => self.accept(&contractor, job_id).await,
            ReplyIntent::Decline => self.decline(&contractor, job_id),
            ReplyIntent::Ambiguous => {
                Ok(self
                    .request_clarification(&contractor, job_id, reply.message_text)
                    .await)
            }
        }
    }

    async fn accept(
        &self,
        contractor: &Contractor,
        job_id: JobId,
    ) -> Result<ReplyOutcome, DispatchError> {
        let decision = self.store.update(&job_id, |job| {
            let now = Utc::now();
            let offer_pending = match job.offer_for(&contractor.id) {
                Some(offer) => offer.is_pending(),
                None => return AcceptDecision::OfferClosed,
            };

            if !job.is_open() {
                if let Some(offer) = job.offer_for_mut(&contractor.id) {
                    if offer.is_pending() {
                        offer.reply = OfferReply::Declined;
                        offer.replied_at = Some(now);
                    }
                }
                return if job.status == JobStatus::Assigned {
                    AcceptDecision::AlreadyTaken
                } else {
                    AcceptDecision::OfferClosed
                };
            }

            if !offer_pending || job.transition(JobStatus::Assigned).is_err() {
                return AcceptDecision::OfferClosed;
            }

            job.assigned = Some(Assignment {
                contractor_id: contractor.id.clone(),
                contractor_name: contractor.name.clone(),
                assigned_at: now,
            });

            let mut superseded = Vec::new();
            for offer in job.offers.iter_mut() {
                if offer.contractor_id == contractor.id {
                    offer.reply = OfferReply::Accepted;
                    offer.replied_at = Some(now);
                } else if offer.is_pending() {
                    offer.reply = OfferReply::Declined;
                    offer.superseded = true;
                    superseded.push(offer.clone());
                }
            }

            AcceptDecision::Won {
                job: job.clone(),
                superseded,
            }
        })?;

        let (job, superseded) = match decision {
            AcceptDecision::Won { job, superseded } => (job, superseded),
            AcceptDecision::AlreadyTaken => {
                info!(%job_id, contractor_id = %contractor.id, "acceptance lost the race");
                return Ok(self.inform_already_taken(contractor, job_id).await);
            }
            AcceptDecision::OfferClosed => {
                info!(%job_id, contractor_id = %contractor.id, "offer no longer pending");
                return Ok(ReplyOutcome::NoMatchingJob {
                    contractor_id: Some(contractor.id.clone()),
                });
            }
        };

        info!(
            %job_id,
            contractor_id = %contractor.id,
            contractor_name = %contractor.name,
            superseded = superseded.len(),
            "job assigned"
        );

        let mut messages = vec![(
            Notice::Winner,
            contractor.recipient(),
            notices::assignment_confirmation(&job),
        )];
        let filled = notices::job_filled(&job);
        for offer in &superseded {
            messages.push((Notice::JobFilled, offer.recipient(), filled.clone()));
        }
        match job.customer.recipient() {
            Some(recipient) => messages.push((
                Notice::Customer,
                recipient,
                notices::customer_assigned(&job, &contractor.name),
            )),
            None => warn!(%job_id, "customer has no phone or contact id; skipping confirmation"),
        }

        let record = job.external_id.clone().map(|external_job_id| JobAssignmentRecord {
            external_job_id,
            contractor_id: contractor.id.0.clone(),
            contractor_name: contractor.name.clone(),
            access_method: job.access.method.clone(),
            access_notes: job.access.notes.clone(),
        });

        let (results, ()) = tokio::join!(self.deliver(messages), self.sync_assignment(&job_id, record));

        let mut contractors_notified = 0;
        let mut customer_notified = false;
        for (notice, result) in results {
            match (notice, result) {
                (Notice::JobFilled, Ok(_)) => contractors_notified += 1,
                (Notice::Customer, Ok(_)) => customer_notified = true,
                (Notice::Winner, Ok(_)) => {}
                (_, Err(err)) => {
                    warn!(%job_id, error = %err, "assignment notice undeliverable");
                }
            }
        }

        Ok(ReplyOutcome::Accepted {
            job_id,
            contractor_id: contractor.id.clone(),
            contractor_name: contractor.name.clone(),
            contractors_notified,
            customer_notified,
        })
    }

    fn decline(
        &self,
        contractor: &Contractor,
        job_id: JobId,
    ) -> Result<ReplyOutcome, DispatchError> {
        let declined = self.store.update(&job_id, |job| {
            if !job.is_open() {
                return false;
            }
            match job.offer_for_mut(&contractor.id) {
                Some(offer) if offer.is_pending() => {
                    offer.reply = OfferReply::Declined;
                    offer.replied_at = Some(Utc::now());
                    true
                }
                _ => false,
            }
        })?;

        if declined {
            info!(%job_id, contractor_id = %contractor.id, "offer declined");
            Ok(ReplyOutcome::Declined {
                job_id,
                contractor_id: contractor.id.clone(),
            })
        } else {
            Ok(ReplyOutcome::NoMatchingJob {
                contractor_id: Some(contractor.id.clone()),
            })
        }
    }

    async fn inform_already_taken(&self, contractor: &Contractor, job_id: JobId) -> ReplyOutcome {
        let results = self
            .deliver(vec![(
                (),
                contractor.recipient(),
                notices::already_taken(&job_id.0),
            )])
            .await;
        let contractor_notified = delivered(&job_id, &contractor.id, &results);

        ReplyOutcome::AlreadyTaken {
            job_id,
            contractor_id: contractor.id.clone(),
            contractor_notified,
        }
    }

    async fn request_clarification(
        &self,
        contractor: &Contractor,
        job_id: JobId,
        message_text: String,
    ) -> ReplyOutcome {
        info!(%job_id, contractor_id = %contractor.id, %message_text, "reply not understood");
        let results = self
            .deliver(vec![(
                (),
                contractor.recipient(),
                notices::clarification(&job_id.0),
            )])
            .await;
        let clarification_sent = delivered(&job_id, &contractor.id, &results);

        ReplyOutcome::Unrecognized {
            job_id,
            contractor_id: contractor.id.clone(),
            message_text,
            clarification_sent,
        }
    }

    async fn sync_assignment(&self, job_id: &JobId, record: Option<JobAssignmentRecord>) {
        let Some(record) = record else {
            return;
        };
        if let Err(err) = self.job_records.record_assignment(&record).await {
            warn!(
                %job_id,
                external_job_id = %record.external_job_id,
                error = %err,
                "CRM job record not updated"
            );
        }
    }

    /// Send every message as its own task so one slow recipient never holds up the rest.
    async fn deliver<K>(
        &self,
        messages: Vec<(K, SmsRecipient, String)>,
    ) -> Vec<(K, Result<DeliveryReceipt, MessagingError>)>
    where
        K: Send + 'static,
    {
        let mut tasks = JoinSet::new();
        for (key, recipient, body) in messages {
            let messaging = Arc::clone(&self.messaging);
            tasks.spawn(async move {
                let result = messaging.send_sms(&recipient, &body).await;
                (key, result)
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(err) => error!(error = %err, "SMS task did not complete"),
            }
        }
        results
    }

    fn snapshot(&self, job_id: &JobId) -> Result<Job, DispatchError> {
        self.store
            .get(job_id)?
            .ok_or_else(|| StoreError::NotFound(job_id.clone()).into())
    }
}

fn delivered(
    job_id: &JobId,
    contractor_id: &ContractorId,
    results: &[((), Result<DeliveryReceipt, MessagingError>)],
) -> bool {
    let mut sent = false;
    for (_, result) in results {
        match result {
            Ok(_) => sent = true,
            Err(err) => warn!(%job_id, %contractor_id, error = %err, "reply notice undeliverable"),
        }
    }
    sent
}

/// Pick the offer a reply refers to: the referenced job (by job id or CRM appointment id)
/// when the contractor holds an offer on it, otherwise the most recent pending offer on an
/// open job.
fn resolve(offers: &[OfferRef], reference: Option<&str>) -> Resolution {
    let referenced: Vec<&OfferRef> = match reference {
        Some(reference) => offers
            .iter()
            .filter(|offer| {
                offer.job_id.0 == reference || offer.external_id.as_deref() == Some(reference)
            })
            .collect(),
        None => Vec::new(),
    };
    let candidates: Vec<&OfferRef> = if referenced.is_empty() {
        offers.iter().collect()
    } else {
        referenced
    };

    if let Some(pending) = candidates
        .iter()
        .find(|offer| offer.reply == OfferReply::Pending && offer.job_status == JobStatus::Open)
    {
        return Resolution::Pending(pending.job_id.clone());
    }

    match candidates.first() {
        Some(latest) if latest.superseded => Resolution::Superseded(latest.job_id.clone()),
        _ => Resolution::Nothing,
    }
}
