use std::collections::BTreeMap;
use std::sync::Arc;

use super::catalog::DomainCatalog;
use super::dashboard::{Dashboard, DashboardProjector};
use super::domain::{Candidate, Category, DomainName, Email, Round, RoundQuestions};
use super::errors::WorkflowError;
use super::identity::IdentityVerifier;
use super::maintenance::{Maintenance, ReconcileReport};
use super::profile::ProfileManager;
use super::qualification::{QualificationEngine, QualificationOutcome, QualificationRequest};
use super::questions::{NewQuestion, QuestionDesk};
use super::repository::RecruitmentStores;
use super::retry::RetryPolicy;
use super::review::{ReviewPage, ReviewQuery, ReviewQueue};
use super::submission::{SubmissionEngine, SubmissionReceipt, SubmissionRequest};
use crate::config::{RecruitmentConfig, StorageConfig};

/// Knobs the engines need from configuration.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub store_page_size: usize,
    pub retry: RetryPolicy,
}

impl ServiceSettings {
    pub fn from_config(storage: &StorageConfig, recruitment: &RecruitmentConfig) -> Self {
        Self {
            store_page_size: storage.page_size,
            retry: RetryPolicy::from_settings(&recruitment.retry),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            store_page_size: StorageConfig::default().page_size,
            retry: RetryPolicy::default(),
        }
    }
}

/// Facade composing identity verification with the workflow engines.
/// Every entry point takes the raw bearer credential and authenticates first.
pub struct RecruitmentService<V> {
    verifier: Arc<V>,
    stores: Arc<RecruitmentStores>,
    catalog: Arc<DomainCatalog>,
    submissions: SubmissionEngine,
    qualification: Arc<QualificationEngine>,
    review: ReviewQueue,
    dashboard: DashboardProjector,
    profiles: ProfileManager,
    questions: QuestionDesk,
    maintenance: Maintenance,
}

impl<V> RecruitmentService<V>
where
    V: IdentityVerifier + 'static,
{
    pub fn new(
        verifier: Arc<V>,
        stores: Arc<RecruitmentStores>,
        catalog: Arc<DomainCatalog>,
        settings: ServiceSettings,
    ) -> Self {
        let qualification = Arc::new(QualificationEngine::new(stores.clone()));

        Self {
            submissions: SubmissionEngine::new(stores.clone(), catalog.clone(), settings.retry),
            review: ReviewQueue::new(stores.clone(), settings.store_page_size),
            dashboard: DashboardProjector::new(stores.clone(), catalog.clone()),
            profiles: ProfileManager::new(stores.clone(), catalog.clone()),
            questions: QuestionDesk::new(stores.clone(), qualification.clone()),
            maintenance: Maintenance::new(stores.clone(), catalog.clone(), qualification.clone()),
            qualification,
            verifier,
            stores,
            catalog,
        }
    }

    pub fn stores(&self) -> &Arc<RecruitmentStores> {
        &self.stores
    }

    pub fn catalog(&self) -> &DomainCatalog {
        &self.catalog
    }

    pub async fn authenticate(&self, credential: &str) -> Result<Email, WorkflowError> {
        Ok(self.verifier.verify(credential).await?)
    }

    pub async fn login(&self, credential: &str) -> Result<Candidate, WorkflowError> {
        let email = self.authenticate(credential).await?;
        self.profiles.login(&email).await
    }

    pub async fn claim_username(
        &self,
        credential: &str,
        username: &str,
    ) -> Result<Candidate, WorkflowError> {
        let email = self.authenticate(credential).await?;
        self.profiles.claim_username(&email, username).await
    }

    pub async fn select_domains(
        &self,
        credential: &str,
        selection: BTreeMap<Category, Vec<String>>,
    ) -> Result<Candidate, WorkflowError> {
        let email = self.authenticate(credential).await?;
        self.profiles.select_domains(&email, selection).await
    }

    pub async fn submit(
        &self,
        credential: &str,
        request: SubmissionRequest,
    ) -> Result<SubmissionReceipt, WorkflowError> {
        let email = self.authenticate(credential).await?;
        self.submissions.submit(&email, request).await
    }

    pub async fn qualify(
        &self,
        credential: &str,
        request: QualificationRequest,
    ) -> Result<QualificationOutcome, WorkflowError> {
        let admin = self.authenticate(credential).await?;
        self.qualification.qualify(&admin, request).await
    }

    /// Review queue for a domain the caller administers.
    pub async fn review(
        &self,
        credential: &str,
        query: ReviewQuery,
    ) -> Result<ReviewPage, WorkflowError> {
        let admin = self.authenticate(credential).await?;
        let domain = DomainName::parse(&query.domain)?;
        self.qualification.authorize(&admin, &domain).await?;
        self.review.scan(query).await
    }

    pub async fn dashboard(&self, credential: &str, round: u32) -> Result<Dashboard, WorkflowError> {
        let email = self.authenticate(credential).await?;
        self.dashboard.project(&email, Round::new(round)?).await
    }

    pub async fn questions(
        &self,
        credential: &str,
        domain: &str,
        round: u32,
    ) -> Result<RoundQuestions, WorkflowError> {
        let email = self.authenticate(credential).await?;
        self.questions.for_candidate(&email, domain, round).await
    }

    pub async fn add_question(
        &self,
        credential: &str,
        request: NewQuestion,
    ) -> Result<usize, WorkflowError> {
        let admin = self.authenticate(credential).await?;
        self.questions.add(&admin, request).await
    }

    pub async fn purge(
        &self,
        credential: &str,
        domain: &str,
        email: &str,
    ) -> Result<(), WorkflowError> {
        let admin = self.authenticate(credential).await?;
        self.maintenance.purge(&admin, domain, email).await
    }

    pub async fn reconcile(
        &self,
        credential: &str,
        email: &str,
    ) -> Result<ReconcileReport, WorkflowError> {
        let admin = self.authenticate(credential).await?;
        self.maintenance.reconcile(&admin, email).await
    }
}
