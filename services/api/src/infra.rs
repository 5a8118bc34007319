use async_trait::async_trait;
use chrono::Utc;
use enrollments::config::{AuthConfig, RecruitmentConfig};
use enrollments::error::AppError;
use enrollments::workflows::recruitment::{
    Admin, Candidate, Category, DomainCatalog, DomainName, Email, IdentityError,
    IdentityVerifier, JwtIdentityVerifier, QuestionBank, RecruitmentStores, StaticTokenVerifier,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Verifier chosen at startup: HS256 when a secret is configured, otherwise the
/// static token table from the seed file.
pub(crate) enum AppVerifier {
    Jwt(JwtIdentityVerifier),
    Static(StaticTokenVerifier),
}

#[async_trait]
impl IdentityVerifier for AppVerifier {
    async fn verify(&self, credential: &str) -> Result<Email, IdentityError> {
        match self {
            AppVerifier::Jwt(verifier) => verifier.verify(credential).await,
            AppVerifier::Static(verifier) => verifier.verify(credential).await,
        }
    }
}

pub(crate) fn build_verifier(auth: &AuthConfig, tokens: &BTreeMap<String, Email>) -> AppVerifier {
    match &auth.jwt_secret {
        Some(secret) => AppVerifier::Jwt(JwtIdentityVerifier::new(secret, auth.audience.as_deref())),
        None => {
            warn!(
                tokens = tokens.len(),
                "AUTH_JWT_SECRET is not set; only seeded static tokens are accepted"
            );
            let mut verifier = StaticTokenVerifier::new();
            for (token, email) in tokens {
                verifier.insert(token.clone(), email.clone());
            }
            AppVerifier::Static(verifier)
        }
    }
}

/// Loads the configured catalog (or the built-in one) and applies the deny-list.
pub(crate) fn build_catalog(recruitment: &RecruitmentConfig) -> Result<DomainCatalog, AppError> {
    let mut catalog = match &recruitment.catalog_path {
        Some(path) => DomainCatalog::load(path)?,
        None => DomainCatalog::standard(),
    };
    let unknown = catalog.close(recruitment.closed_domains.iter());
    if !unknown.is_empty() {
        warn!(?unknown, "closed domains are not in the catalog");
    }
    Ok(catalog)
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SeedCandidate {
    pub(crate) email: Email,
    #[serde(default)]
    pub(crate) username: Option<String>,
    #[serde(default)]
    pub(crate) domain_selection: BTreeMap<Category, Vec<DomainName>>,
}

/// Development fixture for the in-memory store.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct SeedFile {
    #[serde(default)]
    pub(crate) admins: Vec<Admin>,
    #[serde(default)]
    pub(crate) candidates: Vec<SeedCandidate>,
    /// Static bearer token -> email, used when no JWT secret is configured.
    #[serde(default)]
    pub(crate) tokens: BTreeMap<String, Email>,
    #[serde(default)]
    pub(crate) question_banks: Vec<QuestionBank>,
}

impl SeedFile {
    pub(crate) fn parse(raw: &str, origin: &str) -> Result<Self, AppError> {
        serde_json::from_str(raw).map_err(|err| AppError::Seed {
            path: origin.to_string(),
            detail: err.to_string(),
        })
    }

    pub(crate) fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw, &path.display().to_string())
    }

    /// Writes the fixture; existing candidates are left untouched.
    pub(crate) async fn apply(&self, stores: &RecruitmentStores) -> Result<(), AppError> {
        for admin in &self.admins {
            stores.admins.upsert(admin).await?;
        }

        let mut created = 0;
        for seed in &self.candidates {
            let candidate = Candidate {
                username: seed.username.clone(),
                domain_selection: seed.domain_selection.clone(),
                ..Candidate::new(seed.email.clone(), Utc::now())
            };
            if !stores.candidates.insert_if_absent(&candidate).await? {
                continue;
            }
            created += 1;
            if let Some(username) = &seed.username {
                if !stores.usernames.reserve(username, &seed.email).await? {
                    warn!(email = %seed.email, username, "seeded username is already reserved");
                }
            }
        }

        for bank in &self.question_banks {
            stores.questions.upsert(bank).await?;
        }

        info!(
            admins = self.admins.len(),
            candidates = created,
            question_banks = self.question_banks.len(),
            tokens = self.tokens.len(),
            "seed data applied"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enrollments::config::StorageConfig;

    const SEED: &str = r#"{
        "admins": [{ "email": "Lead@X.com", "allowed_domains": ["web"] }],
        "candidates": [
            { "email": "ada@x.com", "username": "ada", "domain_selection": { "tech": ["web"] } }
        ],
        "tokens": { "dev-ada": "ada@x.com" },
        "question_banks": [
            { "qid": "web", "rounds": { "1": { "desc": [{ "text": "Why web?" }] } } }
        ]
    }"#;

    #[tokio::test]
    async fn seed_file_populates_the_store() {
        let catalog = DomainCatalog::standard();
        let (stores, _) = RecruitmentStores::in_memory(&StorageConfig::default(), &catalog)
            .expect("tables");
        let seed = SeedFile::parse(SEED, "inline").expect("seed parses");

        seed.apply(&stores).await.expect("seed applied");
        seed.apply(&stores).await.expect("seed is idempotent");

        let admin = stores
            .admins
            .get(&Email::parse("lead@x.com").expect("email"))
            .await
            .expect("read")
            .expect("admin");
        assert!(admin.may_act_on(&DomainName::new("WEB")));

        let candidate = stores
            .candidates
            .get(&Email::parse("ada@x.com").expect("email"))
            .await
            .expect("read")
            .expect("candidate");
        assert_eq!(candidate.username.as_deref(), Some("ada"));
        assert!(candidate.has_selected(&DomainName::new("WEB")));

        let bank = stores
            .questions
            .get(&DomainName::new("WEB"))
            .await
            .expect("read")
            .expect("bank");
        assert_eq!(bank.rounds.len(), 1);
    }

    #[tokio::test]
    async fn static_tokens_back_the_verifier_without_a_secret() {
        let seed = SeedFile::parse(SEED, "inline").expect("seed parses");
        let auth = AuthConfig {
            jwt_secret: None,
            audience: None,
        };
        let verifier = build_verifier(&auth, &seed.tokens);

        let email = verifier.verify("dev-ada").await.expect("known token");
        assert_eq!(email.as_str(), "ada@x.com");
        assert!(verifier.verify("unknown").await.is_err());
    }

    #[test]
    fn malformed_seed_names_its_origin() {
        let err = SeedFile::parse("{ \"admins\": 3 }", "seed.json").expect_err("invalid");
        assert!(err.to_string().contains("seed.json"));
    }

    #[test]
    fn closed_domains_are_applied_to_the_catalog() {
        let recruitment = RecruitmentConfig {
            closed_domains: vec!["web".to_string()],
            ..RecruitmentConfig::default()
        };
        let catalog = build_catalog(&recruitment).expect("catalog");
        assert!(catalog.is_closed(&DomainName::new("WEB")));
    }
}
