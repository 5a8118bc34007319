use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::catalog::DomainCatalog;
use super::domain::{
    Candidate, Category, DomainName, Email, QualificationStatus, QuizStatus, Round,
};
use super::errors::WorkflowError;
use super::repository::RecruitmentStores;

/// Domains grouped by dashboard category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBuckets {
    pub tech: Vec<DomainName>,
    pub management: Vec<DomainName>,
    pub design: Vec<DomainName>,
}

impl CategoryBuckets {
    pub fn push(&mut self, category: Category, domain: DomainName) {
        let bucket = match category {
            Category::Tech => &mut self.tech,
            Category::Management => &mut self.management,
            Category::Design => &mut self.design,
        };
        if !bucket.contains(&domain) {
            bucket.push(domain);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tech.is_empty() && self.management.is_empty() && self.design.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tech.len() + self.management.len() + self.design.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dashboard {
    pub round: u32,
    pub pending: CategoryBuckets,
    pub completed: CategoryBuckets,
}

impl Dashboard {
    /// `completed` needs at least one completed domain; an empty projection stays `pending`.
    pub fn quiz_status(&self) -> QuizStatus {
        if self.pending.is_empty() && !self.completed.is_empty() {
            QuizStatus::Completed
        } else {
            QuizStatus::Pending
        }
    }
}

/// Read-only projection of candidate state. Never a source of truth.
pub struct DashboardProjector {
    stores: Arc<RecruitmentStores>,
    catalog: Arc<DomainCatalog>,
}

impl DashboardProjector {
    pub fn new(stores: Arc<RecruitmentStores>, catalog: Arc<DomainCatalog>) -> Self {
        Self { stores, catalog }
    }

    pub async fn project(&self, email: &Email, round: Round) -> Result<Dashboard, WorkflowError> {
        let candidate = self
            .stores
            .candidates
            .get(email)
            .await?
            .ok_or_else(|| WorkflowError::CandidateNotFound(email.to_string()))?;

        let mut dashboard = Dashboard {
            round: round.number(),
            ..Dashboard::default()
        };

        for domain in candidate.selected_domains() {
            let Some(category) = self.catalog.category_of(domain) else {
                warn!(%email, %domain, "selected domain is not in the catalog; dropped");
                continue;
            };

            if let Some(previous) = round.previous() {
                if !self.previous_round_qualified(&candidate, previous, domain).await {
                    continue;
                }
            }

            if candidate.has_submitted(round, domain) {
                dashboard.completed.push(category, domain.clone());
            } else {
                dashboard.pending.push(category, domain.clone());
            }
        }

        // The cached quiz status tracks round 1 only.
        let quiz_status = dashboard.quiz_status();
        if round.is_first() && candidate.quiz_status != Some(quiz_status) {
            match self.stores.candidates.set_quiz_status(email, quiz_status).await {
                Ok(_) => debug!(%email, status = quiz_status.label(), "quiz status cached"),
                Err(err) => warn!(%email, error = %err, "quiz status cache write skipped"),
            }
        }

        Ok(dashboard)
    }

    /// Reads the mirrored decision, falling back to the authoritative record and
    /// repairing the mirror when it is missing.
    async fn previous_round_qualified(
        &self,
        candidate: &Candidate,
        previous: Round,
        domain: &DomainName,
    ) -> bool {
        if let Some(status) = candidate.mirrored_status(previous, domain) {
            return status == QualificationStatus::Qualified;
        }

        let Some(records) = self.stores.domains.for_domain(domain) else {
            return false;
        };
        let status = match records.get(&candidate.email).await {
            Ok(record) => record.and_then(|record| record.status(previous)),
            Err(err) => {
                warn!(email = %candidate.email, %domain, error = %err, "domain record unavailable for projection");
                return false;
            }
        };

        if let Some(status) = status {
            if let Err(err) = self
                .stores
                .candidates
                .set_status_mirror(&candidate.email, previous, domain, status)
                .await
            {
                warn!(email = %candidate.email, %domain, error = %err, "status mirror repair failed");
            }
        }
        status == Some(QualificationStatus::Qualified)
    }
}
