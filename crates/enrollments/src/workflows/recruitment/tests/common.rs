use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use serde_json::{json, Value};

use crate::config::StorageConfig;
use crate::store::{
    Condition, FieldUpdate, Item, MemoryStore, PageToken, RecordStore, ScanPage, StoreError,
    WriteOp,
};
use crate::workflows::recruitment::{
    provision_memory_store, Admin, Category, DomainCatalog, DomainName, DomainRecord, Email,
    QualificationRequest, RecruitmentService, RecruitmentStores, RetryPolicy, Round,
    ServiceSettings, StaticTokenVerifier, SubmissionRequest,
};

pub(super) const CANDIDATE: &str = "candidate-token";
pub(super) const OTHER_CANDIDATE: &str = "other-candidate-token";
pub(super) const ADMIN: &str = "admin-token";
pub(super) const DESIGN_ADMIN: &str = "design-admin-token";
pub(super) const OUTSIDER: &str = "outsider-token";

pub(super) fn email(raw: &str) -> Email {
    Email::parse(raw).expect("valid email")
}

pub(super) fn domain(raw: &str) -> DomainName {
    DomainName::new(raw)
}

pub(super) fn verifier() -> StaticTokenVerifier {
    StaticTokenVerifier::new()
        .with_token(CANDIDATE, email("a@x.com"))
        .with_token(OTHER_CANDIDATE, email("b@x.com"))
        .with_token(ADMIN, email("admin@x.com"))
        .with_token(DESIGN_ADMIN, email("design@x.com"))
        .with_token(OUTSIDER, email("outsider@x.com"))
}

pub(super) type Service = RecruitmentService<StaticTokenVerifier>;

pub(super) struct Harness {
    pub(super) service: Arc<Service>,
    pub(super) stores: Arc<RecruitmentStores>,
    pub(super) memory: Arc<MemoryStore>,
}

pub(super) fn settings(page_size: usize) -> ServiceSettings {
    ServiceSettings {
        store_page_size: page_size,
        retry: RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)),
    }
}

pub(super) async fn harness() -> Harness {
    harness_with(DomainCatalog::standard(), 25).await
}

pub(super) async fn harness_with(catalog: DomainCatalog, page_size: usize) -> Harness {
    let storage = StorageConfig::default();
    let memory = Arc::new(MemoryStore::new());
    provision_memory_store(&memory, &storage, &catalog).expect("tables provisioned");
    let stores = Arc::new(RecruitmentStores::new(memory.clone(), &storage, &catalog));
    seed_admins(&stores).await;

    let service = Arc::new(RecruitmentService::new(
        Arc::new(verifier()),
        stores.clone(),
        Arc::new(catalog),
        settings(page_size),
    ));

    Harness {
        service,
        stores,
        memory,
    }
}

pub(super) async fn seed_admins(stores: &RecruitmentStores) {
    stores
        .admins
        .upsert(&Admin {
            email: email("admin@x.com"),
            allowed_domains: vec![domain("WEB"), domain("AI/ML"), domain("UI/UX")],
        })
        .await
        .expect("admin seeded");
    stores
        .admins
        .upsert(&Admin {
            email: email("design@x.com"),
            allowed_domains: vec![domain("UI/UX")],
        })
        .await
        .expect("admin seeded");
}

pub(super) fn selection(
    tech: &[&str],
    management: &[&str],
    design: &[&str],
) -> BTreeMap<Category, Vec<String>> {
    [
        (Category::Tech, tech),
        (Category::Management, management),
        (Category::Design, design),
    ]
    .into_iter()
    .filter(|(_, domains)| !domains.is_empty())
    .map(|(category, domains)| {
        (
            category,
            domains.iter().map(|domain| domain.to_string()).collect(),
        )
    })
    .collect()
}

/// Logs the candidate in and stores `{tech: [WEB, AI/ML], design: [UI/UX]}`.
pub(super) async fn enrolled(harness: &Harness, token: &str) {
    harness.service.login(token).await.expect("login");
    harness
        .service
        .select_domains(
            token,
            selection(&["web", "ai/ml"], &[], &["ui/ux"]),
        )
        .await
        .expect("selection stored");
}

pub(super) fn submission(domain: &str, round: u32) -> SubmissionRequest {
    SubmissionRequest {
        domain: domain.to_string(),
        round,
        questions: vec!["Why this domain?".to_string(), "Favourite tool?".to_string()],
        answers: vec!["Curiosity".to_string(), "A debugger".to_string()],
        score: None,
        extras: BTreeMap::new(),
    }
}

pub(super) fn qualify(
    domain: &str,
    candidate: &str,
    round: u32,
    status: &str,
) -> QualificationRequest {
    QualificationRequest {
        domain: domain.to_string(),
        email: candidate.to_string(),
        round,
        status: status.to_string(),
    }
}

/// Marks round `round` of a domain record directly, bypassing the round-1 lock.
pub(super) async fn force_status(
    harness: &Harness,
    domain_name: &str,
    candidate: &str,
    round: u32,
    status: &str,
) {
    let records = harness
        .stores
        .domains
        .for_domain(&domain(domain_name))
        .expect("known domain");
    records
        .table()
        .update(
            candidate,
            vec![FieldUpdate::set(
                DomainRecord::status_path(Round::new(round).expect("valid round")),
                json!(status),
            )],
            None,
        )
        .await
        .expect("status forced");
}

pub(super) async fn raw_domain_item(
    harness: &Harness,
    domain_name: &str,
    candidate: &str,
) -> Option<Item> {
    harness
        .stores
        .domains
        .for_domain(&domain(domain_name))
        .expect("known domain")
        .table()
        .get(candidate)
        .await
        .expect("read")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Wraps a store and fails the first `failures` updates against `table`.
pub(super) struct FlakyStore {
    inner: Arc<MemoryStore>,
    table: String,
    failures: AtomicU32,
    pub(super) update_calls: AtomicU32,
}

impl FlakyStore {
    pub(super) fn new(inner: Arc<MemoryStore>, table: &str, failures: u32) -> Self {
        Self {
            inner,
            table: table.to_string(),
            failures: AtomicU32::new(failures),
            update_calls: AtomicU32::new(0),
        }
    }

    /// Fails the next `failures` updates and resets the call counter.
    pub(super) fn arm(&self, failures: u32) {
        self.failures.store(failures, Ordering::SeqCst);
        self.update_calls.store(0, Ordering::SeqCst);
    }

    fn should_fail(&self, table: &str) -> bool {
        if table != self.table {
            return false;
        }
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<Item>, StoreError> {
        self.inner.get(table, key).await
    }

    async fn put_if_absent(&self, table: &str, key: &str, item: Item) -> Result<bool, StoreError> {
        self.inner.put_if_absent(table, key, item).await
    }

    async fn update(
        &self,
        table: &str,
        key: &str,
        updates: Vec<FieldUpdate>,
        condition: Option<Condition>,
    ) -> Result<bool, StoreError> {
        if self.should_fail(table) {
            return Err(StoreError::Unavailable("throttled".to_string()));
        }
        self.inner.update(table, key, updates, condition).await
    }

    async fn scan(
        &self,
        table: &str,
        filter: Option<&Condition>,
        start: Option<&PageToken>,
        page_size: usize,
    ) -> Result<ScanPage, StoreError> {
        self.inner.scan(table, filter, start, page_size).await
    }

    async fn delete(&self, table: &str, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(table, key).await
    }

    async fn transact(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        self.inner.transact(ops).await
    }
}

/// Builds a service over a [`FlakyStore`] that fails candidate-table updates.
pub(super) async fn flaky_harness(failures: u32) -> (Harness, Arc<FlakyStore>) {
    let storage = StorageConfig::default();
    let catalog = DomainCatalog::standard();
    let memory = Arc::new(MemoryStore::new());
    provision_memory_store(&memory, &storage, &catalog).expect("tables provisioned");

    // Seed through the reliable store, then route the service through the flaky one.
    let reliable = RecruitmentStores::new(memory.clone(), &storage, &catalog);
    seed_admins(&reliable).await;

    let flaky = Arc::new(FlakyStore::new(
        memory.clone(),
        &storage.table_name("users"),
        0,
    ));
    let stores = Arc::new(RecruitmentStores::new(flaky.clone(), &storage, &catalog));
    let service = Arc::new(RecruitmentService::new(
        Arc::new(verifier()),
        stores.clone(),
        Arc::new(catalog),
        settings(25),
    ));

    let harness = Harness {
        service,
        stores,
        memory,
    };
    enrolled(&harness, CANDIDATE).await;
    flaky.arm(failures);
    (harness, flaky)
}
