//! Contractor job dispatch: offer fan-out to eligible contractors and
//! first-responder-wins processing of their SMS replies.

pub mod booking;
pub mod classifier;
pub mod directory;
pub mod domain;
pub(crate) mod notices;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use booking::{parse_booking, BookingError, BookingRequest};
pub use classifier::{classify, ClassifiedReply, ReplyIntent};
pub use directory::{ContractorDirectory, DirectoryError};
pub use domain::{
    AccessDetails, Assignment, Contractor, ContractorId, CustomerContact, DeliveryStatus, Job,
    JobId, JobInput, JobStatus, Offer, OfferReply, TransitionError,
};
pub use router::{debug_router, dispatch_router, reply_from_webhook, ReplyPayloadError};
pub use service::{
    ContractorReply, DispatchError, DispatchReport, DispatchService, ReplyOutcome, ReplySender,
};
pub use store::{JobStore, OfferRef, StoreError};
