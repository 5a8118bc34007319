use chrono::Utc;
use clap::Args;
use enrollments::config::{RecruitmentConfig, StorageConfig};
use enrollments::error::AppError;
use enrollments::workflows::recruitment::{
    Admin, Category, Dashboard, DomainName, Email, QualificationRequest, QualificationStatus,
    RecruitmentService, RecruitmentStores, ReviewQuery, Round, ServiceSettings,
    StaticTokenVerifier, SubmissionRequest,
};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::infra::build_catalog;

const CANDIDATE_TOKEN: &str = "demo-candidate";
const ADMIN_TOKEN: &str = "demo-admin";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Close a domain before the walkthrough starts (repeatable).
    #[arg(long = "close")]
    pub(crate) closed: Vec<String>,
    /// Print dashboards as JSON instead of a summary line.
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { closed, json } = args;

    let recruitment = RecruitmentConfig {
        closed_domains: closed,
        ..RecruitmentConfig::default()
    };
    let catalog = build_catalog(&recruitment)?;
    let storage = StorageConfig::default();
    let (stores, _memory) = RecruitmentStores::in_memory(&storage, &catalog)?;
    let stores = Arc::new(stores);

    let candidate = demo_email("ada@example.com")?;
    let admin = demo_email("lead@example.com")?;
    stores
        .admins
        .upsert(&Admin {
            email: admin.clone(),
            allowed_domains: vec![DomainName::new("WEB"), DomainName::new("UI/UX")],
        })
        .await?;

    let verifier = StaticTokenVerifier::new()
        .with_token(CANDIDATE_TOKEN, candidate.clone())
        .with_token(ADMIN_TOKEN, admin.clone());
    let service = RecruitmentService::new(
        Arc::new(verifier),
        stores.clone(),
        Arc::new(catalog),
        ServiceSettings::default(),
    );

    println!("Recruitment walkthrough ({})", Utc::now().format("%Y-%m-%d"));

    let profile = service.login(CANDIDATE_TOKEN).await?;
    println!("- {} logged in", profile.email);

    let mut selection = BTreeMap::new();
    selection.insert(Category::Tech, vec!["web".to_string(), "ai/ml".to_string()]);
    selection.insert(Category::Design, vec!["ui/ux".to_string()]);
    service.select_domains(CANDIDATE_TOKEN, selection).await?;
    println!("- selected WEB, AI/ML and UI/UX");

    for domain in ["web", "ui/ux"] {
        match service
            .submit(CANDIDATE_TOKEN, demo_submission(domain, 1))
            .await
        {
            Ok(receipt) => println!(
                "- round 1 {} submitted ({} answers)",
                receipt.domain, receipt.answers
            ),
            Err(err) => println!("- round 1 {domain} rejected: {err}"),
        }
    }
    print_dashboard(&service.dashboard(CANDIDATE_TOKEN, 1).await?, json);

    // Round one is graded outside the admin API.
    let web = DomainName::new("WEB");
    if let Some(records) = stores.domains.for_domain(&web) {
        if records
            .set_status(&candidate, Round::FIRST, QualificationStatus::Qualified, &admin)
            .await?
        {
            println!("- round 1 WEB graded: qualified");
        }
    }
    print_dashboard(&service.dashboard(CANDIDATE_TOKEN, 2).await?, json);

    match service
        .submit(CANDIDATE_TOKEN, demo_submission("ui/ux", 2))
        .await
    {
        Ok(_) => println!("- round 2 UI/UX submitted"),
        Err(err) => println!("- round 2 UI/UX refused: {err}"),
    }
    if service
        .submit(CANDIDATE_TOKEN, demo_submission("web", 2))
        .await
        .is_ok()
    {
        println!("- round 2 WEB submitted");
    }

    let queue = service
        .review(
            ADMIN_TOKEN,
            ReviewQuery {
                domain: "web".to_string(),
                round: 2,
                status: Some("unmarked".to_string()),
                page_token: None,
                limit: 10,
            },
        )
        .await?;
    println!("- admin review queue for WEB round 2: {} unmarked", queue.items.len());

    let outcome = service
        .qualify(
            ADMIN_TOKEN,
            QualificationRequest {
                domain: "web".to_string(),
                email: candidate.to_string(),
                round: 2,
                status: "qualified".to_string(),
            },
        )
        .await?;
    println!(
        "- {} marked round {} {} as {} (mirrored: {})",
        outcome.updated_by, outcome.round, outcome.domain, outcome.status, outcome.mirrored
    );
    print_dashboard(&service.dashboard(CANDIDATE_TOKEN, 3).await?, json);

    Ok(())
}

fn demo_email(raw: &str) -> Result<Email, AppError> {
    Email::parse(raw).map_err(|err| AppError::Workflow(err.into()))
}

fn demo_submission(domain: &str, round: u32) -> SubmissionRequest {
    SubmissionRequest {
        domain: domain.to_string(),
        round,
        questions: vec![
            "What did you build last?".to_string(),
            "What would you like to learn?".to_string(),
        ],
        answers: vec![
            "A campus event tracker".to_string(),
            "Distributed systems".to_string(),
        ],
        score: None,
        extras: BTreeMap::new(),
    }
}

fn print_dashboard(dashboard: &Dashboard, json: bool) {
    if json {
        match serde_json::to_string_pretty(dashboard) {
            Ok(rendered) => println!("{rendered}"),
            Err(err) => println!("  dashboard unavailable: {err}"),
        }
        return;
    }

    let names = |domains: &[DomainName]| {
        domains
            .iter()
            .map(DomainName::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!(
        "  round {} dashboard ({}): pending [{} | {} | {}] completed [{} | {} | {}]",
        dashboard.round,
        dashboard.quiz_status().label(),
        names(&dashboard.pending.tech),
        names(&dashboard.pending.management),
        names(&dashboard.pending.design),
        names(&dashboard.completed.tech),
        names(&dashboard.completed.management),
        names(&dashboard.completed.design),
    );
}
