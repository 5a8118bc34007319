use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{DomainName, Email, Question, QuestionKind, Round, RoundQuestions};
use super::errors::WorkflowError;
use super::qualification::QualificationEngine;
use super::repository::RecruitmentStores;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuestion {
    pub domain: String,
    pub round: u32,
    pub kind: String,
    pub question: Question,
}

pub struct QuestionDesk {
    stores: Arc<RecruitmentStores>,
    admins: Arc<QualificationEngine>,
}

impl QuestionDesk {
    pub fn new(stores: Arc<RecruitmentStores>, admins: Arc<QualificationEngine>) -> Self {
        Self { stores, admins }
    }

    /// Appends a question and returns how many questions of that kind the round now has.
    pub async fn add(&self, admin: &Email, request: NewQuestion) -> Result<usize, WorkflowError> {
        let domain = DomainName::parse(&request.domain)?;
        let round = Round::new(request.round)?;
        let kind: QuestionKind = request.kind.parse()?;
        if request.question.text.trim().is_empty() {
            return Err(WorkflowError::validation("question text cannot be empty"));
        }
        if let Some(index) = request.question.correct_index {
            if index >= request.question.options.len() {
                return Err(WorkflowError::validation(format!(
                    "correct_index {index} is out of range for {} options",
                    request.question.options.len()
                )));
            }
        }

        self.admins.authorize(admin, &domain).await?;
        if self.stores.domains.for_domain(&domain).is_none() {
            return Err(WorkflowError::UnknownDomain(domain.to_string()));
        }

        self.stores
            .questions
            .append(&domain, round, kind, &request.question)
            .await?;

        let total = self
            .stores
            .questions
            .get(&domain)
            .await?
            .and_then(|bank| bank.rounds.get(&round).cloned())
            .map(|questions| match kind {
                QuestionKind::Mcq => questions.mcq.len(),
                QuestionKind::Desc => questions.desc.len(),
            })
            .unwrap_or_default();
        info!(%admin, %domain, %round, total, "question added");
        Ok(total)
    }

    /// Candidate view of a round's questions with answer keys removed.
    pub async fn for_candidate(
        &self,
        email: &Email,
        domain: &str,
        round: u32,
    ) -> Result<RoundQuestions, WorkflowError> {
        let domain = DomainName::parse(domain)?;
        let round = Round::new(round)?;
        let records = self
            .stores
            .domains
            .for_domain(&domain)
            .ok_or_else(|| WorkflowError::UnknownDomain(domain.to_string()))?;

        if !round.is_first() {
            let unlocked = records
                .get(email)
                .await?
                .is_some_and(|record| record.is_unlocked(round));
            if !unlocked {
                return Err(WorkflowError::RoundNotUnlocked { domain, round });
            }
        }

        let questions = self
            .stores
            .questions
            .get(&domain)
            .await?
            .and_then(|mut bank| bank.rounds.remove(&round))
            .unwrap_or_default();

        Ok(RoundQuestions {
            mcq: questions.mcq.iter().map(Question::redacted).collect(),
            desc: questions.desc.iter().map(Question::redacted).collect(),
        })
    }
}
