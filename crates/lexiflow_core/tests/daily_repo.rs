use lexiflow_core::config::DEFAULT_MAX_TRANSACTION_ATTEMPTS as ATTEMPTS;
use lexiflow_core::db::{open_db, open_db_in_memory};
use lexiflow_core::{
    Clock, DailyRecord, DailyRepository, DayId, MemoryDailyRepository, RepoError, RewardGrant,
    SqliteDailyRepository, SystemClock, TransactionError, UserId, WordId,
};
use rusqlite::Connection;

const CREATED_AT: i64 = 1_792_300_000_000;

fn user(id: &str) -> UserId {
    UserId::parse(id).unwrap()
}

fn day() -> DayId {
    DayId::parse("2026-10-18").unwrap()
}

fn ids(values: &[&str]) -> Vec<WordId> {
    values.iter().map(|value| value.to_string()).collect()
}

fn grant(values: &[&str]) -> RewardGrant {
    RewardGrant {
        extra_word_ids: ids(values),
    }
}

fn stored_version(conn: &Connection, user_id: &str) -> i64 {
    conn.query_row(
        "SELECT version FROM daily_words WHERE user_id = ?1 AND day_id = ?2;",
        [user_id, day().as_str()],
        |row| row.get(0),
    )
    .unwrap()
}

#[test]
fn insert_and_get_roundtrip_preserves_word_lists() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDailyRepository::new(&conn);

    let mut record = DailyRecord::new(day(), ids(&["a", "b", "c"]), CREATED_AT);
    record.extra_word_ids = ids(&["d"]);
    record.last_rewarded_at = Some(CREATED_AT - 1);
    repo.insert_daily_record(&user("alice"), &record).unwrap();

    let loaded = repo.get_daily_record(&user("alice"), &day()).unwrap();
    assert_eq!(loaded, Some(record));
    assert_eq!(repo.get_daily_record(&user("bob"), &day()).unwrap(), None);
}

#[test]
fn duplicate_insert_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDailyRepository::new(&conn);
    let record = DailyRecord::new(day(), ids(&["a"]), CREATED_AT);

    repo.insert_daily_record(&user("alice"), &record).unwrap();
    let err = repo
        .insert_daily_record(&user("alice"), &record)
        .unwrap_err();
    assert!(matches!(err, RepoError::AlreadyExists { .. }));
}

#[test]
fn invalid_record_is_rejected_before_insert() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDailyRepository::new(&conn);
    let record = DailyRecord::new(day(), ids(&["a", "a"]), CREATED_AT);

    let err = repo
        .insert_daily_record(&user("alice"), &record)
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
    assert_eq!(repo.get_daily_record(&user("alice"), &day()).unwrap(), None);
}

#[test]
fn public_word_insert_skips_existing_ids() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDailyRepository::new(&conn);

    assert_eq!(repo.insert_public_words(&ids(&["a", "b"])).unwrap(), 2);
    assert_eq!(repo.insert_public_words(&ids(&["b", "c"])).unwrap(), 1);
    assert!(matches!(
        repo.insert_public_words(&ids(&[" "])).unwrap_err(),
        RepoError::InvalidData(_)
    ));

    let mut pool = repo
        .run_transaction(ATTEMPTS, |tx| tx.list_public_words())
        .unwrap();
    pool.sort();
    assert_eq!(pool, ids(&["a", "b", "c"]));
}

#[test]
fn committed_grant_stamps_time_and_bumps_version() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDailyRepository::new(&conn);
    repo.insert_daily_record(&user("alice"), &DailyRecord::new(day(), ids(&["a"]), CREATED_AT))
        .unwrap();

    let before = SystemClock.now_ms();
    repo.run_transaction(ATTEMPTS, |tx| -> Result<(), RepoError> {
        tx.get_daily_record(&user("alice"), &day())?;
        tx.stage_reward_grant(&user("alice"), &day(), grant(&["x", "y"]))
    })
    .unwrap();
    let after = SystemClock.now_ms();

    let stored = repo.get_daily_record(&user("alice"), &day()).unwrap().unwrap();
    assert!(stored.reward_claimed);
    assert_eq!(stored.extra_word_ids, ids(&["x", "y"]));
    let stamped = stored.last_rewarded_at.unwrap();
    assert_eq!(stored.updated_at, stamped);
    // Millisecond wall clock, not the record's creation time.
    assert!(
        (before..=after).contains(&stamped),
        "stamp {stamped} outside [{before}, {after}]"
    );
    assert_eq!(stored_version(&conn, "alice"), 2);
}

#[test]
fn aborted_body_discards_staged_write() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteDailyRepository::new(&conn);
    let record = DailyRecord::new(day(), ids(&["a"]), CREATED_AT);
    repo.insert_daily_record(&user("alice"), &record).unwrap();

    let err = repo
        .run_transaction(ATTEMPTS, |tx| -> Result<(), String> {
            tx.get_daily_record(&user("alice"), &day())
                .map_err(|err| err.to_string())?;
            tx.stage_reward_grant(&user("alice"), &day(), grant(&["x"]))
                .map_err(|err| err.to_string())?;
            Err("changed my mind".to_string())
        })
        .unwrap_err();

    assert!(matches!(err, TransactionError::Aborted(message) if message == "changed my mind"));
    assert_eq!(
        repo.get_daily_record(&user("alice"), &day()).unwrap(),
        Some(record)
    );
    assert_eq!(stored_version(&conn, "alice"), 1);
}

#[test]
fn staging_without_read_is_rejected() {
    let repo = MemoryDailyRepository::new();
    repo.insert_daily_record(&user("alice"), &DailyRecord::new(day(), Vec::new(), CREATED_AT))
        .unwrap();

    let err = repo
        .run_transaction(ATTEMPTS, |tx| {
            tx.stage_reward_grant(&user("alice"), &day(), grant(&["x"]))
        })
        .unwrap_err();
    assert!(matches!(
        err,
        TransactionError::Aborted(RepoError::WriteWithoutRead { .. })
    ));
}

#[test]
fn concurrent_commit_between_read_and_write_triggers_rerun() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conflict.db");
    let conn_a = open_db(&path).unwrap();
    let conn_b = open_db(&path).unwrap();
    let repo_a = SqliteDailyRepository::new(&conn_a);
    let repo_b = SqliteDailyRepository::new(&conn_b);
    repo_a
        .insert_daily_record(&user("alice"), &DailyRecord::new(day(), Vec::new(), CREATED_AT))
        .unwrap();

    let mut attempts = 0;
    let err = repo_a
        .run_transaction(ATTEMPTS, |tx| -> Result<(), RepoError> {
            attempts += 1;
            let record = tx.get_daily_record(&user("alice"), &day())?.unwrap();
            if record.reward_claimed {
                return Err(RepoError::InvalidData("already claimed".to_string()));
            }
            if attempts == 1 {
                repo_b
                    .run_transaction(ATTEMPTS, |rival| -> Result<(), RepoError> {
                        rival.get_daily_record(&user("alice"), &day())?;
                        rival.stage_reward_grant(&user("alice"), &day(), grant(&["rival"]))
                    })
                    .unwrap();
            }
            tx.stage_reward_grant(&user("alice"), &day(), grant(&["mine"]))
        })
        .unwrap_err();

    assert_eq!(attempts, 2);
    assert!(matches!(err, TransactionError::Aborted(RepoError::InvalidData(_))));
    let stored = repo_a.get_daily_record(&user("alice"), &day()).unwrap().unwrap();
    assert_eq!(stored.extra_word_ids, ids(&["rival"]));
}

#[test]
fn different_records_do_not_conflict() {
    let repo = MemoryDailyRepository::new();
    for id in ["alice", "bob"] {
        repo.insert_daily_record(&user(id), &DailyRecord::new(day(), Vec::new(), CREATED_AT))
            .unwrap();
    }

    let mut attempts = 0;
    repo.run_transaction(ATTEMPTS, |tx| -> Result<(), RepoError> {
        attempts += 1;
        tx.get_daily_record(&user("alice"), &day())?;
        if attempts == 1 {
            repo.run_transaction(ATTEMPTS, |rival| -> Result<(), RepoError> {
                rival.get_daily_record(&user("bob"), &day())?;
                rival.stage_reward_grant(&user("bob"), &day(), grant(&["b"]))
            })
            .unwrap();
        }
        tx.stage_reward_grant(&user("alice"), &day(), grant(&["a"]))
    })
    .unwrap();

    assert_eq!(attempts, 1);
    assert_eq!(repo.record_version(&user("alice"), &day()), Some(2));
    assert_eq!(repo.record_version(&user("bob"), &day()), Some(2));
}

#[test]
fn corrupt_persisted_row_is_reported_not_masked() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO daily_words (user_id, day_id, assigned_word_ids, updated_at)
         VALUES ('alice', ?1, 'not-json', 0);",
        [day().as_str()],
    )
    .unwrap();
    let repo = SqliteDailyRepository::new(&conn);

    let err = repo.get_daily_record(&user("alice"), &day()).unwrap_err();
    assert!(matches!(err, RepoError::InvalidData(message) if message.contains("assigned_word_ids")));
}
