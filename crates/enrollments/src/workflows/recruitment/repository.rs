//! Typed repositories over the record store.
//!
//! Every table handle is resolved once from configuration when the
//! [`RecruitmentStores`] bundle is built; business logic asks for a domain's
//! records by [`DomainName`] and never formats table names itself.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use super::catalog::DomainCatalog;
use super::domain::{
    Admin, Candidate, Category, DomainName, DomainRecord, Email, QualificationStatus, Question,
    QuestionBank, QuestionKind, QuizStatus, Round, RoundEntry,
};
use crate::config::StorageConfig;
use crate::store::{
    Condition, FieldPath, FieldUpdate, Item, MemoryStore, PageToken, RecordStore, ScanPage,
    StoreError, Table, WriteOp,
};

pub const CANDIDATE_TABLE: &str = "users";
pub const ADMIN_TABLE: &str = "admins";
pub const QUESTION_TABLE: &str = "questions";
pub const USERNAME_TABLE: &str = "usernames";

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Item, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(item) => Ok(item),
        other => Err(StoreError::Malformed(format!(
            "expected an object, got {other}"
        ))),
    }
}

pub(crate) fn decode<T: DeserializeOwned>(item: Item) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(item))?)
}

/// Field-by-field overwrite, used for seeding.
fn overwrite(item: Item) -> Vec<FieldUpdate> {
    item.into_iter()
        .map(|(field, value)| FieldUpdate::set(FieldPath::new([field]), value))
        .collect()
}

fn email_exists() -> Condition {
    Condition::Exists(FieldPath::new(["email"]))
}

#[derive(Debug, Clone)]
pub struct CandidateRepository {
    table: Table,
}

impl CandidateRepository {
    pub fn new(table: Table) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub async fn get(&self, email: &Email) -> Result<Option<Candidate>, StoreError> {
        self.table
            .get(email.as_str())
            .await?
            .map(decode)
            .transpose()
    }

    pub async fn insert_if_absent(&self, candidate: &Candidate) -> Result<bool, StoreError> {
        self.table
            .put_if_absent(candidate.email.as_str(), encode(candidate)?)
            .await
    }

    /// Appends `domain` to the round ledger unless it is already listed.
    /// Returns `false` when nothing was written.
    pub async fn append_to_ledger(
        &self,
        email: &Email,
        round: Round,
        domain: &DomainName,
    ) -> Result<bool, StoreError> {
        let path = Candidate::ledger_path(round);
        let value = json!(domain);
        let guard = Condition::All(vec![
            email_exists(),
            Condition::not(Condition::Contains(path.clone(), value.clone())),
        ]);
        self.table
            .update(
                email.as_str(),
                vec![FieldUpdate::append(path, value)],
                Some(guard),
            )
            .await
    }

    pub async fn set_status_mirror(
        &self,
        email: &Email,
        round: Round,
        domain: &DomainName,
        status: QualificationStatus,
    ) -> Result<bool, StoreError> {
        self.table
            .update(
                email.as_str(),
                vec![FieldUpdate::set(
                    Candidate::status_path(round, domain),
                    status.to_value(),
                )],
                Some(email_exists()),
            )
            .await
    }

    pub async fn set_quiz_status(
        &self,
        email: &Email,
        status: QuizStatus,
    ) -> Result<bool, StoreError> {
        self.table
            .update(
                email.as_str(),
                vec![FieldUpdate::set(
                    Candidate::quiz_status_path(),
                    json!(status.label()),
                )],
                Some(email_exists()),
            )
            .await
    }

    /// Stores the selection unless one of the `dropped` domains is listed in the
    /// round-1 ledger at write time. Returns `false` when the guard fails.
    pub async fn set_selection<'a, I>(
        &self,
        email: &Email,
        selection: &BTreeMap<Category, Vec<DomainName>>,
        dropped: I,
    ) -> Result<bool, StoreError>
    where
        I: IntoIterator<Item = &'a DomainName>,
    {
        let ledger = Candidate::ledger_path(Round::FIRST);
        let mut guard = vec![email_exists()];
        guard.extend(
            dropped
                .into_iter()
                .map(|domain| Condition::not(Condition::Contains(ledger.clone(), json!(domain)))),
        );
        self.table
            .update(
                email.as_str(),
                vec![FieldUpdate::set(
                    Candidate::selection_path(),
                    serde_json::to_value(selection)?,
                )],
                Some(Condition::All(guard)),
            )
            .await
    }

    /// Sets the username only if none is stored yet.
    pub async fn set_username_once(
        &self,
        email: &Email,
        username: &str,
    ) -> Result<bool, StoreError> {
        let path = Candidate::username_path();
        self.table
            .update(
                email.as_str(),
                vec![FieldUpdate::set(path.clone(), json!(username))],
                Some(Condition::All(vec![
                    email_exists(),
                    Condition::MissingOrNull(path),
                ])),
            )
            .await
    }

    pub async fn replace(&self, candidate: &Candidate) -> Result<(), StoreError> {
        self.table
            .update(candidate.email.as_str(), overwrite(encode(candidate)?), None)
            .await
            .map(|_| ())
    }
}

/// Records of a single domain table.
#[derive(Debug, Clone)]
pub struct DomainRecords {
    domain: DomainName,
    table: Table,
}

impl DomainRecords {
    pub fn new(domain: DomainName, table: Table) -> Self {
        Self { domain, table }
    }

    pub fn domain(&self) -> &DomainName {
        &self.domain
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub async fn get(&self, email: &Email) -> Result<Option<DomainRecord>, StoreError> {
        self.table
            .get(email.as_str())
            .await?
            .map(decode)
            .transpose()
    }

    /// First-write-wins creation of the record.
    pub async fn create(&self, record: &DomainRecord) -> Result<bool, StoreError> {
        self.table
            .put_if_absent(record.email.as_str(), encode(record)?)
            .await
    }

    /// Writes a later round's submission. The guard requires the previous round to be
    /// qualified and the round's answers to be absent, so a duplicate never overwrites.
    pub async fn write_round_if_absent(
        &self,
        email: &Email,
        round: Round,
        entry: &RoundEntry,
    ) -> Result<bool, StoreError> {
        let mut guard = vec![
            email_exists(),
            Condition::NotExists(DomainRecord::answers_path(round)),
        ];
        if let Some(previous) = round.previous() {
            guard.push(Condition::Equals(
                DomainRecord::status_path(previous),
                QualificationStatus::Qualified.to_value(),
            ));
        }

        let mut updates = Vec::new();
        for (field, value) in encode(entry)? {
            if field == "qualification_status" || field == "updated_by" {
                continue;
            }
            updates.push(FieldUpdate::set(DomainRecord::round_path(round, &field), value));
        }

        self.table
            .update(email.as_str(), updates, Some(Condition::All(guard)))
            .await
    }

    /// Stores an admin decision, guarded by the previous round's qualification.
    pub async fn set_status(
        &self,
        email: &Email,
        round: Round,
        status: QualificationStatus,
        admin: &Email,
    ) -> Result<bool, StoreError> {
        let mut guard = vec![email_exists()];
        if let Some(previous) = round.previous() {
            guard.push(Condition::Equals(
                DomainRecord::status_path(previous),
                QualificationStatus::Qualified.to_value(),
            ));
        }

        self.table
            .update(
                email.as_str(),
                vec![
                    FieldUpdate::set(DomainRecord::status_path(round), status.to_value()),
                    FieldUpdate::set(
                        DomainRecord::round_path(round, "updated_by"),
                        json!(admin),
                    ),
                ],
                Some(Condition::All(guard)),
            )
            .await
    }

    pub async fn scan(
        &self,
        filter: Option<&Condition>,
        start: Option<&PageToken>,
        page_size: usize,
    ) -> Result<ScanPage, StoreError> {
        self.table.scan(filter, start, page_size).await
    }

    pub fn delete_op(&self, email: &Email) -> WriteOp {
        self.table.delete_op(email.as_str())
    }

    pub async fn replace(&self, record: &DomainRecord) -> Result<(), StoreError> {
        self.table
            .update(record.email.as_str(), overwrite(encode(record)?), None)
            .await
            .map(|_| ())
    }
}

/// Domain name → table handle, resolved from the catalog at startup.
#[derive(Debug, Clone, Default)]
pub struct DomainRepository {
    tables: BTreeMap<DomainName, DomainRecords>,
}

impl DomainRepository {
    pub fn for_domain(&self, domain: &DomainName) -> Option<&DomainRecords> {
        self.tables.get(domain)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DomainRecords> {
        self.tables.values()
    }
}

#[derive(Debug, Clone)]
pub struct AdminRepository {
    table: Table,
}

impl AdminRepository {
    pub fn new(table: Table) -> Self {
        Self { table }
    }

    pub async fn get(&self, email: &Email) -> Result<Option<Admin>, StoreError> {
        self.table
            .get(email.as_str())
            .await?
            .map(decode)
            .transpose()
    }

    pub async fn upsert(&self, admin: &Admin) -> Result<(), StoreError> {
        self.table
            .update(admin.email.as_str(), overwrite(encode(admin)?), None)
            .await
            .map(|_| ())
    }
}

#[derive(Debug, Clone)]
pub struct QuestionBankRepository {
    table: Table,
}

impl QuestionBankRepository {
    pub fn new(table: Table) -> Self {
        Self { table }
    }

    pub async fn get(&self, domain: &DomainName) -> Result<Option<QuestionBank>, StoreError> {
        self.table
            .get(domain.as_str())
            .await?
            .map(decode)
            .transpose()
    }

    /// Appends atomically, creating the bank entry when missing.
    pub async fn append(
        &self,
        domain: &DomainName,
        round: Round,
        kind: QuestionKind,
        question: &Question,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(question)?;
        self.table
            .update(
                domain.as_str(),
                vec![FieldUpdate::append(
                    QuestionBank::questions_path(round, kind),
                    value,
                )],
                None,
            )
            .await
            .map(|_| ())
    }

    pub async fn upsert(&self, bank: &QuestionBank) -> Result<(), StoreError> {
        self.table
            .update(bank.qid.as_str(), overwrite(encode(bank)?), None)
            .await
            .map(|_| ())
    }
}

/// Reservation table that keeps usernames unique across candidates.
#[derive(Debug, Clone)]
pub struct UsernameRegistry {
    table: Table,
}

impl UsernameRegistry {
    pub fn new(table: Table) -> Self {
        Self { table }
    }

    pub fn key(username: &str) -> String {
        username.trim().to_lowercase()
    }

    pub async fn reserve(&self, username: &str, owner: &Email) -> Result<bool, StoreError> {
        let mut item = Item::new();
        item.insert("owner".to_string(), json!(owner));
        self.table.put_if_absent(&Self::key(username), item).await
    }

    pub async fn release(&self, username: &str) -> Result<bool, StoreError> {
        self.table.delete(&Self::key(username)).await
    }

    pub async fn owner(&self, username: &str) -> Result<Option<Email>, StoreError> {
        let Some(item) = self.table.get(&Self::key(username)).await? else {
            return Ok(None);
        };
        match item.get("owner") {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }
}

/// Table name and key field for every table the workflow uses.
pub fn table_layout(storage: &StorageConfig, catalog: &DomainCatalog) -> Vec<(String, &'static str)> {
    let mut layout = vec![
        (storage.table_name(CANDIDATE_TABLE), "email"),
        (storage.table_name(ADMIN_TABLE), "email"),
        (storage.table_name(QUESTION_TABLE), "qid"),
        (storage.table_name(USERNAME_TABLE), "username"),
    ];
    layout.extend(
        catalog
            .domains()
            .map(|entry| (storage.table_name(&entry.table), "email")),
    );
    layout
}

/// Creates every table in a process-local store.
pub fn provision_memory_store(
    store: &MemoryStore,
    storage: &StorageConfig,
    catalog: &DomainCatalog,
) -> Result<(), StoreError> {
    for (name, key_field) in table_layout(storage, catalog) {
        store.create_table(&name, key_field)?;
    }
    Ok(())
}

/// Explicitly constructed dependency bundle, built once and shared read-only.
#[derive(Clone)]
pub struct RecruitmentStores {
    store: Arc<dyn RecordStore>,
    pub candidates: CandidateRepository,
    pub domains: DomainRepository,
    pub admins: AdminRepository,
    pub questions: QuestionBankRepository,
    pub usernames: UsernameRegistry,
}

impl RecruitmentStores {
    pub fn new(
        store: Arc<dyn RecordStore>,
        storage: &StorageConfig,
        catalog: &DomainCatalog,
    ) -> Self {
        let table = |suffix: &str| Table::new(store.clone(), storage.table_name(suffix));
        let tables = catalog
            .domains()
            .map(|entry| {
                (
                    entry.name.clone(),
                    DomainRecords::new(entry.name.clone(), table(&entry.table)),
                )
            })
            .collect();

        Self {
            candidates: CandidateRepository::new(table(CANDIDATE_TABLE)),
            domains: DomainRepository { tables },
            admins: AdminRepository::new(table(ADMIN_TABLE)),
            questions: QuestionBankRepository::new(table(QUESTION_TABLE)),
            usernames: UsernameRegistry::new(table(USERNAME_TABLE)),
            store,
        }
    }

    /// In-memory bundle with every table provisioned.
    pub fn in_memory(
        storage: &StorageConfig,
        catalog: &DomainCatalog,
    ) -> Result<(Self, Arc<MemoryStore>), StoreError> {
        let memory = Arc::new(MemoryStore::new());
        provision_memory_store(&memory, storage, catalog)?;
        let stores = Self::new(memory.clone(), storage, catalog);
        Ok((stores, memory))
    }

    pub async fn transact(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        self.store.transact(ops).await
    }
}

impl std::fmt::Debug for RecruitmentStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecruitmentStores")
            .field("candidates", &self.candidates)
            .field("domains", &self.domains)
            .finish_non_exhaustive()
    }
}
