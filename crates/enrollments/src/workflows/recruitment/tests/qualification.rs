use serde_json::json;

use super::common::*;
use crate::workflows::recruitment::{ErrorKind, QualificationStatus, Round, WorkflowError};

async fn round_one_submitted(harness: &Harness) {
    enrolled(harness, CANDIDATE).await;
    harness
        .service
        .submit(CANDIDATE, submission("web", 1))
        .await
        .expect("round one");
}

#[tokio::test]
async fn qualifying_round_two_mirrors_into_the_candidate() {
    let harness = harness().await;
    round_one_submitted(&harness).await;
    force_status(&harness, "web", "a@x.com", 1, "qualified").await;

    let outcome = harness
        .service
        .qualify(ADMIN, qualify("WEB", "a@x.com", 2, "qualified"))
        .await
        .expect("qualified");

    assert!(outcome.mirrored);
    assert_eq!(outcome.updated_by, email("admin@x.com"));

    let round_two = Round::new(2).expect("valid");
    let record = harness
        .stores
        .domains
        .for_domain(&domain("WEB"))
        .expect("known domain")
        .get(&email("a@x.com"))
        .await
        .expect("read")
        .expect("record");
    assert_eq!(record.status(round_two), Some(QualificationStatus::Qualified));
    assert_eq!(
        record.round(round_two).and_then(|entry| entry.updated_by.clone()),
        Some(email("admin@x.com"))
    );

    let candidate = harness
        .stores
        .candidates
        .get(&email("a@x.com"))
        .await
        .expect("read")
        .expect("candidate");
    assert_eq!(
        candidate.mirrored_status(round_two, &domain("WEB")),
        Some(QualificationStatus::Qualified)
    );
}

#[tokio::test]
async fn round_one_is_locked_regardless_of_scope() {
    let harness = harness().await;
    round_one_submitted(&harness).await;

    for token in [ADMIN, DESIGN_ADMIN, OUTSIDER] {
        let error = harness
            .service
            .qualify(token, qualify("web", "a@x.com", 1, "qualified"))
            .await
            .expect_err("round one locked");
        assert_eq!(error, WorkflowError::RoundLocked);
        assert_eq!(error.kind(), ErrorKind::Conflict);
    }
}

#[tokio::test]
async fn preceding_round_gate_blocks_without_mutation() {
    let harness = harness().await;
    round_one_submitted(&harness).await;
    let before = raw_domain_item(&harness, "web", "a@x.com").await;

    let error = harness
        .service
        .qualify(ADMIN, qualify("web", "a@x.com", 2, "qualified"))
        .await
        .expect_err("round one not qualified");

    assert_eq!(
        error,
        WorkflowError::PrecedingRoundNotQualified {
            domain: domain("WEB"),
            blocking: Round::FIRST,
        }
    );
    assert!(error.to_string().contains("round 1"));
    assert_eq!(raw_domain_item(&harness, "web", "a@x.com").await, before);
}

#[tokio::test]
async fn admin_scope_is_enforced() {
    let harness = harness().await;
    round_one_submitted(&harness).await;
    force_status(&harness, "web", "a@x.com", 1, "qualified").await;

    let error = harness
        .service
        .qualify(OUTSIDER, qualify("web", "a@x.com", 2, "qualified"))
        .await
        .expect_err("not an admin");
    assert!(matches!(error, WorkflowError::NotAnAdmin(_)));

    let error = harness
        .service
        .qualify(DESIGN_ADMIN, qualify("web", "a@x.com", 2, "qualified"))
        .await
        .expect_err("wrong domain");
    assert_eq!(error, WorkflowError::DomainNotPermitted(domain("WEB")));
    assert_eq!(error.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn status_values_are_a_closed_set() {
    let harness = harness().await;
    round_one_submitted(&harness).await;
    force_status(&harness, "web", "a@x.com", 1, "qualified").await;

    let error = harness
        .service
        .qualify(ADMIN, qualify("web", "a@x.com", 2, "true"))
        .await
        .expect_err("invalid status");
    assert!(matches!(error, WorkflowError::InvalidStatusValue(_)));
    assert_eq!(error.kind(), ErrorKind::Validation);

    harness
        .service
        .qualify(ADMIN, qualify("web", "a@x.com", 2, "Unqualified"))
        .await
        .expect("casing is normalized");
    let item = raw_domain_item(&harness, "web", "a@x.com")
        .await
        .expect("record");
    assert_eq!(
        item["rounds"]["2"]["qualification_status"],
        json!("unqualified")
    );
}

#[tokio::test]
async fn missing_domain_record_is_candidate_not_found() {
    let harness = harness().await;
    enrolled(&harness, CANDIDATE).await;

    let error = harness
        .service
        .qualify(ADMIN, qualify("ai/ml", "a@x.com", 2, "pending"))
        .await
        .expect_err("no record");
    assert!(matches!(error, WorkflowError::CandidateNotFound(_)));
    assert_eq!(error.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn later_decisions_overwrite_earlier_ones() {
    let harness = harness().await;
    round_one_submitted(&harness).await;
    force_status(&harness, "web", "a@x.com", 1, "qualified").await;

    for status in ["pending", "qualified", "unqualified"] {
        harness
            .service
            .qualify(ADMIN, qualify("web", "a@x.com", 2, status))
            .await
            .expect("decision stored");
    }

    let candidate = harness
        .stores
        .candidates
        .get(&email("a@x.com"))
        .await
        .expect("read")
        .expect("candidate");
    assert_eq!(
        candidate.mirrored_status(Round::new(2).expect("valid"), &domain("web")),
        Some(QualificationStatus::Unqualified)
    );
}

#[tokio::test]
async fn mirror_failure_does_not_fail_the_decision() {
    let (harness, flaky) = flaky_harness(0).await;
    harness
        .service
        .submit(CANDIDATE, submission("web", 1))
        .await
        .expect("round one");
    force_status(&harness, "web", "a@x.com", 1, "qualified").await;
    flaky.arm(1);

    let outcome = harness
        .service
        .qualify(ADMIN, qualify("web", "a@x.com", 2, "qualified"))
        .await
        .expect("domain write is authoritative");
    assert!(!outcome.mirrored);

    let item = raw_domain_item(&harness, "web", "a@x.com")
        .await
        .expect("record");
    assert_eq!(
        item["rounds"]["2"]["qualification_status"],
        json!("qualified")
    );
}
