//! Process-local job store.
//!
//! Jobs live only as long as the process: a restart loses every open job and its offers.
//! Each job sits behind its own mutex so read-modify-write sequences against one job are
//! serialized while unrelated jobs proceed independently. Callers must never hold a job
//! lock across an `.await`; `update` takes a synchronous closure to enforce that.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};

use super::domain::{ContractorId, Job, JobId, JobStatus, OfferReply};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("job {0} already exists")]
    Conflict(JobId),
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job store lock poisoned")]
    Poisoned,
}

/// Snapshot of one contractor's offer, used to resolve inbound replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferRef {
    pub job_id: JobId,
    pub external_id: Option<String>,
    pub job_status: JobStatus,
    pub reply: OfferReply,
    pub superseded: bool,
    pub sent_at: DateTime<Utc>,
    pub sequence: u64,
}

#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Arc<Mutex<Job>>>>,
    sequence: AtomicU64,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next job id. Numbering starts at 1 for every store.
    pub fn next_id(&self) -> (JobId, u64) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        (JobId(format!("job-{sequence:06}")), sequence)
    }

    pub fn insert(&self, job: Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().map_err(|_| StoreError::Poisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(job.id));
        }
        jobs.insert(job.id.clone(), Arc::new(Mutex::new(job)));
        Ok(())
    }

    pub fn get(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        let Some(slot) = self.slot(id)? else {
            return Ok(None);
        };
        let job = slot.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(Some(job.clone()))
    }

    /// Run `apply` with exclusive access to one job. This is the only way to mutate a job.
    pub fn update<R, F>(&self, id: &JobId, apply: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Job) -> R,
    {
        let slot = self
            .slot(id)?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let mut job = slot.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(apply(&mut job))
    }

    /// All jobs in dispatch order.
    pub fn snapshot(&self) -> Result<Vec<Job>, StoreError> {
        let mut jobs = Vec::new();
        for slot in self.slots()? {
            jobs.push(slot.lock().map_err(|_| StoreError::Poisoned)?.clone());
        }
        jobs.sort_by_key(|job| job.sequence);
        Ok(jobs)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.jobs.read().map_err(|_| StoreError::Poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Every offer held by `contractor_id`, most recent first (by `sent_at`, then
    /// dispatch sequence).
    pub fn offers_for(&self, contractor_id: &ContractorId) -> Result<Vec<OfferRef>, StoreError> {
        let mut refs = Vec::new();
        for slot in self.slots()? {
            let job = slot.lock().map_err(|_| StoreError::Poisoned)?;
            if let Some(offer) = job.offer_for(contractor_id) {
                refs.push(OfferRef {
                    job_id: job.id.clone(),
                    external_id: job.external_id.clone(),
                    job_status: job.status,
                    reply: offer.reply,
                    superseded: offer.superseded,
                    sent_at: offer.sent_at,
                    sequence: job.sequence,
                });
            }
        }
        refs.sort_by(|a, b| {
            b.sent_at
                .cmp(&a.sent_at)
                .then_with(|| b.sequence.cmp(&a.sequence))
        });
        Ok(refs)
    }

    fn slot(&self, id: &JobId) -> Result<Option<Arc<Mutex<Job>>>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| StoreError::Poisoned)?;
        Ok(jobs.get(id).cloned())
    }

    fn slots(&self) -> Result<Vec<Arc<Mutex<Job>>>, StoreError> {
        let jobs = self.jobs.read().map_err(|_| StoreError::Poisoned)?;
        Ok(jobs.values().cloned().collect())
    }
}
