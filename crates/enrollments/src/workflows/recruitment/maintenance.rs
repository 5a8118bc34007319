//! Privileged repair operations: purging a candidate from a domain and
//! rebuilding the candidate's derived ledgers from the domain records.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::catalog::DomainCatalog;
use super::domain::{Candidate, DomainName, Email};
use super::errors::WorkflowError;
use super::qualification::QualificationEngine;
use super::repository::RecruitmentStores;
use crate::store::{Condition, FieldPath, FieldUpdate};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub email: String,
    pub domains_checked: usize,
    pub ledger_entries_added: usize,
    pub mirror_entries_written: usize,
}

impl ReconcileReport {
    pub fn repaired(&self) -> usize {
        self.ledger_entries_added + self.mirror_entries_written
    }
}

pub struct Maintenance {
    stores: Arc<RecruitmentStores>,
    catalog: Arc<DomainCatalog>,
    admins: Arc<QualificationEngine>,
}

impl Maintenance {
    pub fn new(
        stores: Arc<RecruitmentStores>,
        catalog: Arc<DomainCatalog>,
        admins: Arc<QualificationEngine>,
    ) -> Self {
        Self {
            stores,
            catalog,
            admins,
        }
    }

    /// Deletes the domain record and every ledger/mirror reference to it in one transaction.
    pub async fn purge(
        &self,
        admin: &Email,
        domain: &str,
        email: &str,
    ) -> Result<(), WorkflowError> {
        let domain = DomainName::parse(domain)?;
        let email = Email::parse(email)?;
        self.admins.authorize(admin, &domain).await?;
        let records = self
            .stores
            .domains
            .for_domain(&domain)
            .ok_or_else(|| WorkflowError::UnknownDomain(domain.to_string()))?;

        let record = records.get(&email).await?;
        let candidate = self.stores.candidates.get(&email).await?;
        let referenced = candidate.as_ref().is_some_and(|candidate| {
            candidate
                .rounds
                .values()
                .any(|round| round.submitted.contains(&domain) || round.status.contains_key(&domain))
        });
        if record.is_none() && !referenced {
            return Err(WorkflowError::RecordNotFound {
                domain,
                email: email.to_string(),
            });
        }

        let mut ops = vec![records.delete_op(&email)];
        if let Some(candidate) = &candidate {
            let mut updates = Vec::new();
            for round in candidate.rounds.keys() {
                updates.push(FieldUpdate::remove_value(
                    Candidate::ledger_path(*round),
                    json!(domain),
                ));
                updates.push(FieldUpdate::remove(Candidate::status_path(*round, &domain)));
            }
            if !updates.is_empty() {
                ops.push(self.stores.candidates.table().update_op(
                    email.as_str(),
                    updates,
                    Some(Condition::Exists(FieldPath::new(["email"]))),
                ));
            }
        }

        self.stores.transact(ops).await?;
        info!(%admin, %email, %domain, "candidate purged from domain");
        Ok(())
    }

    /// Rebuilds ledgers and the status mirror from the authoritative domain records.
    pub async fn reconcile(
        &self,
        admin: &Email,
        email: &str,
    ) -> Result<ReconcileReport, WorkflowError> {
        let email = Email::parse(email)?;
        let admin_record = self
            .stores
            .admins
            .get(admin)
            .await?
            .ok_or_else(|| WorkflowError::NotAnAdmin(admin.to_string()))?;
        let candidate = self
            .stores
            .candidates
            .get(&email)
            .await?
            .ok_or_else(|| WorkflowError::CandidateNotFound(email.to_string()))?;

        let mut report = ReconcileReport {
            email: email.to_string(),
            ..ReconcileReport::default()
        };

        for domain in candidate.selected_domains() {
            if !admin_record.may_act_on(domain) || self.catalog.entry(domain).is_none() {
                continue;
            }
            let Some(records) = self.stores.domains.for_domain(domain) else {
                continue;
            };
            let Some(record) = records.get(&email).await? else {
                continue;
            };
            report.domains_checked += 1;

            for (round, entry) in &record.rounds {
                if entry.answers.is_some()
                    && !candidate.has_submitted(*round, domain)
                    && self
                        .stores
                        .candidates
                        .append_to_ledger(&email, *round, domain)
                        .await?
                {
                    report.ledger_entries_added += 1;
                }

                if let Some(status) = entry.qualification_status {
                    if candidate.mirrored_status(*round, domain) != Some(status)
                        && self
                            .stores
                            .candidates
                            .set_status_mirror(&email, *round, domain, status)
                            .await?
                    {
                        report.mirror_entries_written += 1;
                    }
                }
            }
        }

        info!(%admin, %email, repaired = report.repaired(), "candidate reconciled");
        Ok(report)
    }
}
