use lexiflow_core::{
    handle_claim, handle_claim_json, ApiError, ClaimResponse, DailyRecord, DailyRepository,
    DayId, FixedClock, MemoryDailyRepository, RewardConfig, RewardService, SeededRandom, UserId,
    WordId,
};
use serde_json::Value;

// 2026-10-18T09:30:00Z, 12:30 in UTC+3.
const NOW_MS: i64 = 1_792_315_800_000;

fn pool(count: usize) -> Vec<WordId> {
    (0..count).map(|i| format!("p{i}")).collect()
}

fn service_with_alice(
    repo: &MemoryDailyRepository,
) -> RewardService<&MemoryDailyRepository, FixedClock, SeededRandom> {
    repo.insert_public_words(&pool(12)).unwrap();
    let record = DailyRecord::new(
        DayId::from_epoch_ms(NOW_MS, 180),
        vec!["p0".to_string(), "p1".to_string()],
        NOW_MS,
    );
    repo.insert_daily_record(&UserId::parse("alice").unwrap(), &record)
        .unwrap();
    RewardService::try_new(repo, RewardConfig::default())
        .unwrap()
        .with_clock(FixedClock::new(NOW_MS))
        .with_random(SeededRandom::new(7))
}

fn error_code(reply: &str) -> String {
    let value: Value = serde_json::from_str(reply).unwrap();
    assert!(value.get("extraWords").is_none(), "partial success in {reply}");
    value["code"].as_str().unwrap().to_string()
}

#[test]
fn json_success_carries_only_extra_words() {
    let repo = MemoryDailyRepository::new();
    let service = service_with_alice(&repo);

    let reply = handle_claim_json(&service, Some("alice"), r#"{"userId":"alice"}"#);
    let value: Value = serde_json::from_str(&reply).unwrap();
    let object = value.as_object().unwrap();
    assert_eq!(object.len(), 1);

    let decoded: ClaimResponse = serde_json::from_str(&reply).unwrap();
    assert_eq!(decoded.extra_words.len(), 5);
    assert!(!decoded.extra_words.contains(&"p0".to_string()));
}

#[test]
fn unauthenticated_wins_over_malformed_payload() {
    let repo = MemoryDailyRepository::new();
    let service = service_with_alice(&repo);

    assert_eq!(error_code(&handle_claim_json(&service, None, "not json")), "unauthenticated");
    assert_eq!(
        error_code(&handle_claim_json(&service, Some("  "), r#"{"userId":"alice"}"#)),
        "unauthenticated"
    );
}

#[test]
fn identity_errors_map_to_their_codes() {
    let repo = MemoryDailyRepository::new();
    let service = service_with_alice(&repo);

    assert_eq!(
        error_code(&handle_claim_json(&service, Some("alice"), r#"{"userId":7}"#)),
        "invalid-argument"
    );
    assert_eq!(
        error_code(&handle_claim_json(&service, Some("alice"), "{}")),
        "invalid-argument"
    );
    assert_eq!(
        error_code(&handle_claim_json(&service, Some("alice"), r#"{"userId":"bob"}"#)),
        "permission-denied"
    );
}

#[test]
fn second_claim_reports_failed_precondition() {
    let repo = MemoryDailyRepository::new();
    let service = service_with_alice(&repo);
    let payload = r#"{"userId":"alice"}"#;

    assert!(handle_claim(&service, Some("alice"), payload).is_ok());
    let err: ApiError = handle_claim(&service, Some("alice"), payload).unwrap_err();
    assert_eq!(err.code, "failed-precondition");
    assert!(!err.message.is_empty());
}

#[test]
fn missing_daily_record_reports_failed_precondition() {
    let repo = MemoryDailyRepository::new();
    let service = service_with_alice(&repo);

    repo.insert_daily_record(
        &UserId::parse("carol").unwrap(),
        &DailyRecord::new(DayId::parse("2026-10-17").unwrap(), Vec::new(), NOW_MS),
    )
    .unwrap();
    let reply = handle_claim_json(&service, Some("carol"), r#"{"userId":"carol"}"#);
    assert_eq!(error_code(&reply), "failed-precondition");
}
