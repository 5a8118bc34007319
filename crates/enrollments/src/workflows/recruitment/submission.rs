use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::catalog::DomainCatalog;
use super::domain::{Answer, DomainName, DomainRecord, Email, Round, RoundEntry};
use super::errors::WorkflowError;
use super::repository::{DomainRecords, RecruitmentStores};
use super::retry::RetryPolicy;

/// Answers for one domain and round, as sent by the candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub domain: String,
    pub round: u32,
    pub questions: Vec<String>,
    pub answers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Domain-specific sub-answers stored next to the round's answers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub domain: DomainName,
    pub round: Round,
    pub answers: usize,
    /// `false` when the domain was already in the ledger (a concurrent retry got there first).
    pub ledger_updated: bool,
}

pub struct SubmissionEngine {
    stores: Arc<RecruitmentStores>,
    catalog: Arc<DomainCatalog>,
    retry: RetryPolicy,
}

impl SubmissionEngine {
    pub fn new(
        stores: Arc<RecruitmentStores>,
        catalog: Arc<DomainCatalog>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            stores,
            catalog,
            retry,
        }
    }

    pub async fn submit(
        &self,
        email: &Email,
        request: SubmissionRequest,
    ) -> Result<SubmissionReceipt, WorkflowError> {
        let domain = DomainName::parse(&request.domain)?;
        if self.catalog.is_closed(&domain) {
            return Err(WorkflowError::DomainClosed(domain));
        }
        let records = self
            .stores
            .domains
            .for_domain(&domain)
            .ok_or_else(|| WorkflowError::UnknownDomain(domain.to_string()))?;
        let round = Round::new(request.round)?;

        let candidate = self
            .stores
            .candidates
            .get(email)
            .await?
            .ok_or_else(|| WorkflowError::CandidateNotFound(email.to_string()))?;
        if !candidate.has_selected(&domain) {
            return Err(WorkflowError::validation(format!(
                "domain {domain} is not among the selected domains"
            )));
        }

        let answers = pair_answers(request.questions, request.answers)?;
        let answer_count = answers.len();
        let entry = RoundEntry {
            answers: Some(answers),
            score: request.score,
            submitted_at: Some(Utc::now()),
            extras: request.extras,
            ..RoundEntry::default()
        };

        let written = if round.is_first() {
            self.write_first_round(records, email, entry).await
        } else {
            self.write_later_round(records, email, round, &entry).await
        };
        if let Err(err) = written {
            if matches!(err, WorkflowError::AlreadySubmitted { .. }) {
                // A previous attempt may have stopped after the record write.
                if self.append_to_ledger(email, round, &domain).await? {
                    warn!(%email, %domain, %round, "ledger repaired on resubmission");
                }
            }
            return Err(err);
        }

        let ledger_updated = self.append_to_ledger(email, round, &domain).await?;
        if !ledger_updated {
            warn!(%email, %domain, %round, "ledger already listed the domain");
        }

        info!(%email, %domain, %round, answers = answer_count, "submission accepted");
        Ok(SubmissionReceipt {
            domain,
            round,
            answers: answer_count,
            ledger_updated,
        })
    }

    async fn append_to_ledger(
        &self,
        email: &Email,
        round: Round,
        domain: &DomainName,
    ) -> Result<bool, WorkflowError> {
        let appended = self
            .retry
            .execute("ledger append", || {
                self.stores.candidates.append_to_ledger(email, round, domain)
            })
            .await?;
        Ok(appended)
    }

    async fn write_first_round(
        &self,
        records: &DomainRecords,
        email: &Email,
        entry: RoundEntry,
    ) -> Result<(), WorkflowError> {
        let record = DomainRecord {
            email: email.clone(),
            rounds: BTreeMap::from([(Round::FIRST, entry)]),
        };
        if records.create(&record).await? {
            return Ok(());
        }
        Err(WorkflowError::AlreadySubmitted {
            domain: records.domain().clone(),
            round: Round::FIRST,
        })
    }

    async fn write_later_round(
        &self,
        records: &DomainRecords,
        email: &Email,
        round: Round,
        entry: &RoundEntry,
    ) -> Result<(), WorkflowError> {
        let domain = records.domain();
        let existing = records.get(email).await?;
        let unlocked = existing
            .as_ref()
            .is_some_and(|record| record.is_unlocked(round));
        if !unlocked {
            return Err(WorkflowError::RoundNotUnlocked {
                domain: domain.clone(),
                round,
            });
        }

        if records.write_round_if_absent(email, round, entry).await? {
            return Ok(());
        }

        // The guard failed: work out which half of it did.
        match records.get(email).await? {
            Some(record) if record.has_answers(round) => Err(WorkflowError::AlreadySubmitted {
                domain: domain.clone(),
                round,
            }),
            _ => Err(WorkflowError::RoundNotUnlocked {
                domain: domain.clone(),
                round,
            }),
        }
    }
}

fn pair_answers(questions: Vec<String>, answers: Vec<String>) -> Result<Vec<Answer>, WorkflowError> {
    if questions.len() != answers.len() {
        return Err(WorkflowError::validation(format!(
            "questions and answers must have the same length ({} vs {})",
            questions.len(),
            answers.len()
        )));
    }
    if questions.is_empty() {
        return Err(WorkflowError::validation("at least one answer is required"));
    }

    Ok(questions
        .into_iter()
        .zip(answers)
        .map(|(question, answer)| Answer { question, answer })
        .collect())
}
