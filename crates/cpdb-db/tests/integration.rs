//! Offline tests for pool configuration and row decoding.
//! No database connection is needed.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use cpdb_core::{
    AppConfig, Environment, FailureKind, LogOutcome, ProcessingLogEntry, Profile, ProfileStatus,
    ReviewStatus, Stage,
};
use cpdb_db::{DbError, PoolConfig, ProcessingLogRow, ProfileRow};
use uuid::Uuid;

fn app_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        profiles_path: PathBuf::from("./config/profiles.yaml"),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        discovery_api_key: None,
        scraper_api_key: None,
        assessment_api_key: None,
        assessment_model: "gpt-4o-mini".to_string(),
        discovery_timeout_secs: 30,
        scraping_timeout_secs: 300,
        assessment_timeout_secs: 60,
        max_attempts: 3,
        max_timeout_attempts: 2,
        retry_backoff_base_ms: 1000,
        max_concurrent_profiles: 10,
        batch_deadline_secs: None,
        discovery_max_results: 5,
        profile_host: "profile-host.example".to_string(),
        scraper_poll_interval_secs: 10,
        user_agent: "ua".to_string(),
    }
}

fn profile_row() -> ProfileRow {
    let now = Utc::now();
    ProfileRow {
        id: Uuid::new_v4(),
        source_ref: Some("evt-001".to_string()),
        name: "A. Liang".to_string(),
        company: Some("Example Labs".to_string()),
        email: None,
        additional_info: None,
        supplied_url: None,
        discovered_url: Some("https://profile-host.example/in/andyliang/nl".to_string()),
        canonical_url: Some("https://profile-host.example/in/andyliang".to_string()),
        scraped_data: Some(serde_json::json!({"basic_info": {"name": "A. Liang"}})),
        assessment: Some(serde_json::json!({
            "overall_score": 6.5,
            "criteria": {"seniority": 7.0},
            "evidence": {"seniority": "staff engineer"}
        })),
        final_score: Some(6.5),
        ranking: Some(1),
        status: "completed".to_string(),
        failure_stage: None,
        failure_kind: None,
        failure_detail: None,
        run: 1,
        version: 4,
        review_status: "candidate".to_string(),
        review_notes: Some("strong systems background".to_string()),
        created_at: now,
        updated_at: now,
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout, Duration::from_secs(9));
}

#[test]
fn completed_row_decodes_into_profile() {
    let profile = Profile::try_from(profile_row()).expect("row decodes");

    assert_eq!(profile.status, ProfileStatus::Completed);
    assert_eq!(profile.final_score, Some(6.5));
    let assessment = profile.assessment.as_ref().expect("assessment present");
    assert_eq!(assessment.criteria.get("seniority"), Some(&7.0));
    assert!(profile.failure.is_none());
    assert_eq!(profile.version, 4);
    assert_eq!(profile.review_status, ReviewStatus::Candidate);
    assert!(profile.check_invariants().is_ok());
}

#[test]
fn unknown_review_status_is_a_decode_error() {
    let mut row = profile_row();
    row.review_status = "maybe".to_string();

    let err = Profile::try_from(row).unwrap_err();
    assert!(matches!(err, DbError::Decode(_)), "got: {err:?}");
}

#[test]
fn failed_row_decodes_failure_reason() {
    let mut row = profile_row();
    row.scraped_data = None;
    row.assessment = None;
    row.final_score = None;
    row.ranking = None;
    row.status = "failed".to_string();
    row.failure_stage = Some("scraping".to_string());
    row.failure_kind = Some("permanent".to_string());
    row.failure_detail = Some("unsupported URL".to_string());

    let profile = Profile::try_from(row).expect("row decodes");
    let failure = profile.failure.expect("failure present");
    assert_eq!(failure.stage, Stage::Scraping);
    assert_eq!(failure.kind, Some(FailureKind::Permanent));
    assert_eq!(failure.detail, "unsupported URL");
}

#[test]
fn timed_out_failure_has_no_kind() {
    let mut row = profile_row();
    row.scraped_data = None;
    row.assessment = None;
    row.final_score = None;
    row.canonical_url = None;
    row.status = "failed".to_string();
    row.failure_stage = Some("discovery".to_string());
    row.failure_detail = Some("no response within 30s".to_string());

    let profile = Profile::try_from(row).expect("row decodes");
    assert_eq!(profile.failure.and_then(|f| f.kind), None);
}

#[test]
fn unknown_status_is_a_decode_error() {
    let mut row = profile_row();
    row.status = "archived".to_string();

    let err = Profile::try_from(row).unwrap_err();
    assert!(matches!(err, DbError::Decode(_)), "got: {err:?}");
}

#[test]
fn malformed_assessment_json_is_a_json_error() {
    let mut row = profile_row();
    row.assessment = Some(serde_json::json!({"score": "high"}));

    let err = Profile::try_from(row).unwrap_err();
    assert!(matches!(err, DbError::Json(_)), "got: {err:?}");
}

#[test]
fn log_row_decodes_into_entry() {
    let row = ProcessingLogRow {
        id: 17,
        profile_id: Uuid::nil(),
        run: 3,
        stage: "assessment".to_string(),
        attempt: 2,
        outcome: "timed_out".to_string(),
        detail: serde_json::json!({"timeout_secs": 60}),
        recorded_at: Utc::now(),
    };

    let entry = ProcessingLogEntry::try_from(row).expect("row decodes");
    assert_eq!(entry.stage, Stage::Assessment);
    assert_eq!(entry.run, 3);
    assert_eq!(entry.attempt, 2);
    assert_eq!(entry.outcome, LogOutcome::TimedOut);
}
