use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{Admin, DomainName, Email, QualificationStatus, Round};
use super::errors::WorkflowError;
use super::repository::RecruitmentStores;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualificationRequest {
    pub domain: String,
    pub email: String,
    pub round: u32,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualificationOutcome {
    pub domain: DomainName,
    pub email: Email,
    pub round: Round,
    pub status: QualificationStatus,
    pub updated_by: Email,
    /// Whether the candidate's status mirror was written as well.
    pub mirrored: bool,
}

pub struct QualificationEngine {
    stores: Arc<RecruitmentStores>,
}

impl QualificationEngine {
    pub fn new(stores: Arc<RecruitmentStores>) -> Self {
        Self { stores }
    }

    pub async fn qualify(
        &self,
        admin_email: &Email,
        request: QualificationRequest,
    ) -> Result<QualificationOutcome, WorkflowError> {
        let round = Round::new(request.round)?;
        if round.is_first() {
            return Err(WorkflowError::RoundLocked);
        }
        let status: QualificationStatus = request.status.parse()?;

        let domain = DomainName::parse(&request.domain)?;
        self.authorize(admin_email, &domain).await?;
        let records = self
            .stores
            .domains
            .for_domain(&domain)
            .ok_or_else(|| WorkflowError::UnknownDomain(domain.to_string()))?;

        let email = Email::parse(&request.email)?;
        let record = records
            .get(&email)
            .await?
            .ok_or_else(|| WorkflowError::CandidateNotFound(email.to_string()))?;
        if let Some(blocking) = round.previous() {
            if !record.is_unlocked(round) {
                return Err(WorkflowError::PrecedingRoundNotQualified { domain, blocking });
            }
        }

        let written = records
            .set_status(&email, round, status, admin_email)
            .await?;
        if !written {
            // The record changed between the read and the guarded write.
            return Err(match round.previous() {
                Some(blocking) => WorkflowError::PrecedingRoundNotQualified { domain, blocking },
                None => WorkflowError::CandidateNotFound(email.to_string()),
            });
        }
        info!(admin = %admin_email, %email, %domain, %round, %status, "qualification recorded");

        let mirrored = match self
            .stores
            .candidates
            .set_status_mirror(&email, round, &domain, status)
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                warn!(%email, %domain, %round, "candidate missing; status mirror skipped");
                false
            }
            Err(err) => {
                warn!(%email, %domain, %round, error = %err, "status mirror write failed");
                false
            }
        };

        Ok(QualificationOutcome {
            domain,
            email,
            round,
            status,
            updated_by: admin_email.clone(),
            mirrored,
        })
    }

    /// Loads the admin and checks its scope over `domain`.
    pub async fn authorize(
        &self,
        admin_email: &Email,
        domain: &DomainName,
    ) -> Result<Admin, WorkflowError> {
        let admin = self
            .stores
            .admins
            .get(admin_email)
            .await?
            .ok_or_else(|| WorkflowError::NotAnAdmin(admin_email.to_string()))?;
        if !admin.may_act_on(domain) {
            return Err(WorkflowError::DomainNotPermitted(domain.clone()));
        }
        Ok(admin)
    }
}
