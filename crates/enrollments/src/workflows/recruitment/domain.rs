use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::FieldPath;

/// Verified subject identifier. Stored lower-cased so lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.split_once('@') {
            Some((local, host)) if !local.is_empty() && !host.is_empty() => Ok(Self(normalized)),
            _ => Err(ModelError::InvalidEmail(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Email {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Competition track name, upper-cased at the boundary (`web` and `WEB` are the same domain).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DomainName(String);

impl DomainName {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }

    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        let name = Self::new(raw);
        if name.0.is_empty() {
            return Err(ModelError::EmptyDomain);
        }
        Ok(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DomainName {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<DomainName> for String {
    fn from(value: DomainName) -> Self {
        value.0
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 1-indexed evaluation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Round(u32);

impl Round {
    pub const FIRST: Round = Round(1);

    pub fn new(number: u32) -> Result<Self, ModelError> {
        if number == 0 {
            return Err(ModelError::InvalidRound(number));
        }
        Ok(Self(number))
    }

    pub fn number(self) -> u32 {
        self.0
    }

    pub fn is_first(self) -> bool {
        self.0 == 1
    }

    /// The round whose qualification gates this one.
    pub fn previous(self) -> Option<Round> {
        (self.0 > 1).then(|| Round(self.0 - 1))
    }

    pub(crate) fn key(self) -> String {
        self.0.to_string()
    }
}

impl TryFrom<u32> for Round {
    type Error = ModelError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Round> for u32 {
    fn from(value: Round) -> Self {
        value.0
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Admin-assigned outcome for a candidate in a domain and round. "Unset" is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualificationStatus {
    Qualified,
    Unqualified,
    Pending,
}

impl QualificationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            QualificationStatus::Qualified => "qualified",
            QualificationStatus::Unqualified => "unqualified",
            QualificationStatus::Pending => "pending",
        }
    }

    pub fn to_value(self) -> Value {
        Value::String(self.label().to_string())
    }
}

impl FromStr for QualificationStatus {
    type Err = ModelError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "qualified" => Ok(Self::Qualified),
            "unqualified" => Ok(Self::Unqualified),
            "pending" => Ok(Self::Pending),
            _ => Err(ModelError::InvalidStatus(raw.to_string())),
        }
    }
}

impl fmt::Display for QualificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Dashboard grouping for domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Tech,
    Management,
    Design,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Tech, Category::Management, Category::Design];

    pub const fn label(self) -> &'static str {
        match self {
            Category::Tech => "tech",
            Category::Management => "management",
            Category::Design => "design",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Cached summary of the candidate's dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizStatus {
    Pending,
    Completed,
}

impl QuizStatus {
    pub const fn label(self) -> &'static str {
        match self {
            QuizStatus::Pending => "pending",
            QuizStatus::Completed => "completed",
        }
    }
}

/// Per-round view of a candidate: which domains were submitted and the mirrored decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRound {
    #[serde(default)]
    pub submitted: Vec<DomainName>,
    #[serde(default)]
    pub status: BTreeMap<DomainName, QualificationStatus>,
}

/// One candidate per verified identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub email: Email,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub domain_selection: BTreeMap<Category, Vec<DomainName>>,
    #[serde(default)]
    pub rounds: BTreeMap<Round, CandidateRound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_status: Option<QuizStatus>,
    pub created_at: DateTime<Utc>,
}

impl Candidate {
    pub fn new(email: Email, created_at: DateTime<Utc>) -> Self {
        Self {
            email,
            username: None,
            domain_selection: BTreeMap::new(),
            rounds: BTreeMap::new(),
            quiz_status: None,
            created_at,
        }
    }

    pub fn selected_domains(&self) -> impl Iterator<Item = &DomainName> {
        self.domain_selection.values().flatten()
    }

    pub fn has_selected(&self, domain: &DomainName) -> bool {
        self.selected_domains().any(|selected| selected == domain)
    }

    pub fn has_submitted(&self, round: Round, domain: &DomainName) -> bool {
        self.rounds
            .get(&round)
            .is_some_and(|entry| entry.submitted.contains(domain))
    }

    pub fn mirrored_status(&self, round: Round, domain: &DomainName) -> Option<QualificationStatus> {
        self.rounds
            .get(&round)
            .and_then(|entry| entry.status.get(domain).copied())
    }

    pub fn ledger_path(round: Round) -> FieldPath {
        FieldPath::new(["rounds".to_string(), round.key(), "submitted".to_string()])
    }

    pub fn status_path(round: Round, domain: &DomainName) -> FieldPath {
        FieldPath::new([
            "rounds".to_string(),
            round.key(),
            "status".to_string(),
            domain.to_string(),
        ])
    }

    pub fn username_path() -> FieldPath {
        FieldPath::new(["username"])
    }

    pub fn selection_path() -> FieldPath {
        FieldPath::new(["domain_selection"])
    }

    pub fn quiz_status_path() -> FieldPath {
        FieldPath::new(["quiz_status"])
    }
}

/// Question text paired with the candidate's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    pub answer: String,
}

/// Everything recorded for one round of one domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answers: Option<Vec<Answer>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualification_status: Option<QualificationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<Email>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    /// Domain-specific sub-answers (e.g. `frontend`, `backend`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extras: BTreeMap<String, Value>,
}

/// Authoritative per-(domain, candidate) record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub email: Email,
    #[serde(default)]
    pub rounds: BTreeMap<Round, RoundEntry>,
}

impl DomainRecord {
    pub fn round(&self, round: Round) -> Option<&RoundEntry> {
        self.rounds.get(&round)
    }

    pub fn has_answers(&self, round: Round) -> bool {
        self.round(round).is_some_and(|entry| entry.answers.is_some())
    }

    pub fn status(&self, round: Round) -> Option<QualificationStatus> {
        self.round(round).and_then(|entry| entry.qualification_status)
    }

    /// True when `round` is open: round 1 always, later rounds once the previous one qualified.
    pub fn is_unlocked(&self, round: Round) -> bool {
        match round.previous() {
            None => true,
            Some(previous) => self.status(previous) == Some(QualificationStatus::Qualified),
        }
    }

    pub fn round_path(round: Round, field: &str) -> FieldPath {
        FieldPath::new(["rounds".to_string(), round.key(), field.to_string()])
    }

    pub fn answers_path(round: Round) -> FieldPath {
        Self::round_path(round, "answers")
    }

    pub fn status_path(round: Round) -> FieldPath {
        Self::round_path(round, "qualification_status")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Mcq,
    Desc,
}

impl FromStr for QuestionKind {
    type Err = ModelError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mcq" => Ok(Self::Mcq),
            "desc" => Ok(Self::Desc),
            _ => Err(ModelError::InvalidQuestionKind(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

impl Question {
    /// Copy safe to hand to candidates.
    pub fn redacted(&self) -> Question {
        Question {
            correct_index: None,
            ..self.clone()
        }
    }
}

/// Questions of one round, split by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundQuestions {
    #[serde(default)]
    pub mcq: Vec<Question>,
    #[serde(default)]
    pub desc: Vec<Question>,
}

/// Question bank entry, keyed by `qid` (the domain name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionBank {
    pub qid: DomainName,
    #[serde(default)]
    pub rounds: BTreeMap<Round, RoundQuestions>,
}

impl QuestionBank {
    pub fn questions_path(round: Round, kind: QuestionKind) -> FieldPath {
        let kind = match kind {
            QuestionKind::Mcq => "mcq",
            QuestionKind::Desc => "desc",
        };
        FieldPath::new(["rounds".to_string(), round.key(), kind.to_string()])
    }
}

/// Reviewer account restricted to a set of domains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admin {
    pub email: Email,
    #[serde(default)]
    pub allowed_domains: Vec<DomainName>,
}

impl Admin {
    pub fn may_act_on(&self, domain: &DomainName) -> bool {
        self.allowed_domains.contains(domain)
    }
}

/// Validation failures for boundary values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    #[error("domain name cannot be empty")]
    EmptyDomain,
    #[error("round numbers start at 1 (got {0})")]
    InvalidRound(u32),
    #[error("'{0}' is not a qualification status (expected qualified, unqualified or pending)")]
    InvalidStatus(String),
    #[error("'{0}' is not a question kind (expected mcq or desc)")]
    InvalidQuestionKind(String),
}
