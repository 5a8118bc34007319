use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::catalog::DomainCatalog;
use super::domain::{Candidate, Category, DomainName, Email, Round};
use super::errors::WorkflowError;
use super::repository::RecruitmentStores;

const MAX_USERNAME_LEN: usize = 32;

/// Candidate-owned profile operations: first login, username, domain selection.
pub struct ProfileManager {
    stores: Arc<RecruitmentStores>,
    catalog: Arc<DomainCatalog>,
}

impl ProfileManager {
    pub fn new(stores: Arc<RecruitmentStores>, catalog: Arc<DomainCatalog>) -> Self {
        Self { stores, catalog }
    }

    /// Returns the candidate, creating it on first login.
    pub async fn login(&self, email: &Email) -> Result<Candidate, WorkflowError> {
        if let Some(candidate) = self.stores.candidates.get(email).await? {
            return Ok(candidate);
        }

        let fresh = Candidate::new(email.clone(), Utc::now());
        if self.stores.candidates.insert_if_absent(&fresh).await? {
            info!(%email, "candidate created on first login");
            return Ok(fresh);
        }

        // Lost a race against a concurrent first login.
        self.stores
            .candidates
            .get(email)
            .await?
            .ok_or_else(|| WorkflowError::CandidateNotFound(email.to_string()))
    }

    pub async fn claim_username(
        &self,
        email: &Email,
        username: &str,
    ) -> Result<Candidate, WorkflowError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(WorkflowError::validation("username cannot be empty"));
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(WorkflowError::validation(format!(
                "username cannot be longer than {MAX_USERNAME_LEN} characters"
            )));
        }

        let candidate = self
            .stores
            .candidates
            .get(email)
            .await?
            .ok_or_else(|| WorkflowError::CandidateNotFound(email.to_string()))?;
        if candidate.username.is_some() {
            return Err(WorkflowError::conflict("username already set"));
        }

        if !self.stores.usernames.reserve(username, email).await? {
            return Err(WorkflowError::conflict("username already taken"));
        }

        match self.stores.candidates.set_username_once(email, username).await {
            Ok(true) => {}
            Ok(false) => {
                self.release(username).await;
                return Err(WorkflowError::conflict("username already set"));
            }
            Err(err) => {
                self.release(username).await;
                return Err(err.into());
            }
        }

        info!(%email, username, "username claimed");
        Ok(Candidate {
            username: Some(username.to_string()),
            ..candidate
        })
    }

    async fn release(&self, username: &str) {
        if let Err(err) = self.stores.usernames.release(username).await {
            warn!(username, error = %err, "username reservation could not be released");
        }
    }

    pub async fn select_domains(
        &self,
        email: &Email,
        selection: BTreeMap<Category, Vec<String>>,
    ) -> Result<Candidate, WorkflowError> {
        let selection = self.validate_selection(selection)?;

        let candidate = self
            .stores
            .candidates
            .get(email)
            .await?
            .ok_or_else(|| WorkflowError::CandidateNotFound(email.to_string()))?;

        let chosen: BTreeSet<&DomainName> = selection.values().flatten().collect();
        if let Some(submitted) = candidate.rounds.get(&Round::FIRST) {
            if let Some(dropped) = submitted.submitted.iter().find(|d| !chosen.contains(d)) {
                return Err(WorkflowError::conflict(format!(
                    "domain {dropped} already has a submission and cannot be removed"
                )));
            }
        }

        // The ledger may grow between the read above and this write.
        let dropped: Vec<&DomainName> = self
            .catalog
            .domains()
            .map(|entry| &entry.name)
            .filter(|name| !chosen.contains(name))
            .collect();
        if !self
            .stores
            .candidates
            .set_selection(email, &selection, dropped.iter().copied())
            .await?
        {
            return match self.stores.candidates.get(email).await? {
                Some(_) => Err(WorkflowError::conflict(
                    "a domain with a submission cannot be removed from the selection",
                )),
                None => Err(WorkflowError::CandidateNotFound(email.to_string())),
            };
        }
        info!(%email, domains = chosen.len(), "domain selection stored");

        Ok(Candidate {
            domain_selection: selection,
            ..candidate
        })
    }

    fn validate_selection(
        &self,
        selection: BTreeMap<Category, Vec<String>>,
    ) -> Result<BTreeMap<Category, Vec<DomainName>>, WorkflowError> {
        let mut seen = BTreeSet::new();
        let mut validated = BTreeMap::new();

        for (category, raw_domains) in selection {
            if raw_domains.is_empty() {
                continue;
            }
            let limit = self.catalog.selection_limit(category);
            if raw_domains.len() > limit {
                return Err(WorkflowError::validation(format!(
                    "at most {limit} {category} domains may be selected"
                )));
            }

            let mut domains = Vec::with_capacity(raw_domains.len());
            for raw in raw_domains {
                let domain = DomainName::parse(&raw)?;
                match self.catalog.category_of(&domain) {
                    Some(actual) if actual == category => {}
                    Some(actual) => {
                        return Err(WorkflowError::validation(format!(
                            "domain {domain} belongs to {actual}, not {category}"
                        )))
                    }
                    None => return Err(WorkflowError::UnknownDomain(domain.to_string())),
                }
                if !seen.insert(domain.clone()) {
                    return Err(WorkflowError::validation(format!(
                        "domain {domain} is selected twice"
                    )));
                }
                domains.push(domain);
            }
            validated.insert(category, domains);
        }

        if validated.is_empty() {
            return Err(WorkflowError::validation("select at least one domain"));
        }
        Ok(validated)
    }
}
