//! Round-gated recruitment workflow.
//!
//! Candidates pick domains and submit answers round by round; admins qualify them
//! before the next round opens. Domain records are authoritative. The candidate
//! document carries a per-round ledger and a mirror of decisions that the
//! dashboard reads and that [`Maintenance::reconcile`] can rebuild.

pub mod catalog;
pub mod dashboard;
pub mod domain;
pub mod errors;
pub mod identity;
pub mod maintenance;
pub mod profile;
pub mod qualification;
pub mod questions;
pub mod repository;
pub mod retry;
pub mod review;
pub mod router;
pub mod service;
pub mod submission;

#[cfg(test)]
mod tests;

pub use catalog::{CatalogError, CatalogFile, DomainCatalog, DomainEntry};
pub use dashboard::{CategoryBuckets, Dashboard, DashboardProjector};
pub use domain::{
    Admin, Answer, Candidate, CandidateRound, Category, DomainName, DomainRecord, Email,
    ModelError, QualificationStatus, Question, QuestionBank, QuestionKind, QuizStatus, Round,
    RoundEntry, RoundQuestions,
};
pub use errors::{ErrorKind, WorkflowError};
pub use identity::{
    bearer_credential, IdentityError, IdentityVerifier, JwtIdentityVerifier, StaticTokenVerifier,
};
pub use maintenance::{Maintenance, ReconcileReport};
pub use qualification::{QualificationEngine, QualificationOutcome, QualificationRequest};
pub use questions::NewQuestion;
pub use repository::{provision_memory_store, table_layout, RecruitmentStores};
pub use retry::RetryPolicy;
pub use review::{ReviewItem, ReviewPage, ReviewQuery, StatusFilter, UNMARKED};
pub use router::recruitment_router;
pub use service::{RecruitmentService, ServiceSettings};
pub use submission::{SubmissionReceipt, SubmissionRequest};
