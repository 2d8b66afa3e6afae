use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use electra_db::migrations::{self, CURRENT_VERSION};
use electra_db::{Database, ManualClock, StoreError};
use electra_types::PollDuration;
use electra_types::models::{CandidateId, PollId, UserId};
use uuid::Uuid;

const T0: i64 = 1_700_000_000_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "electra_db=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// A database file under the temp dir, removed (with its WAL files) on drop.
struct TempDb {
    path: PathBuf,
}

impl TempDb {
    fn new() -> Self {
        let path = std::env::temp_dir().join(format!("electra-{}.db", Uuid::new_v4()));
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut p = self.path.clone().into_os_string();
            p.push(suffix);
            let _ = std::fs::remove_file(p);
        }
    }
}

struct Election {
    db: Database,
    clock: ManualClock,
    poll: PollId,
    alice: CandidateId,
    bob: CandidateId,
}

fn election() -> Election {
    init_tracing();
    let clock = ManualClock::new(T0);
    let db = Database::open_in_memory_with_clock(Arc::new(clock.clone())).unwrap();

    let code = electra_crypto::generate_voting_code();
    let poll = db.insert_poll(&code, PollDuration::ThirtyMinutes).unwrap();
    let alice = db
        .insert_candidate("Alice Njeri", "Chairperson", "Longer library hours.", poll)
        .unwrap();
    let bob = db
        .insert_candidate("Bob Kiprono", "Chairperson", "More sports funding.", poll)
        .unwrap();

    Election {
        db,
        clock,
        poll,
        alice,
        bob,
    }
}

fn voter(db: &Database, n: usize) -> UserId {
    db.insert_user("Voter", &n.to_string(), &format!("voter{}@example.com", n), "pw")
        .unwrap()
}

#[test]
fn voters_find_poll_by_code_and_vote() {
    let e = election();
    let code = e.db.get_poll(e.poll).unwrap().unwrap().voting_code;

    let found = e.db.find_poll_by_code(&code).unwrap().unwrap();
    assert_eq!(found.id, e.poll);
    assert_eq!(found.end_time_ms, T0 + 1_800_000);

    let v1 = voter(&e.db, 1);
    let v2 = voter(&e.db, 2);
    let v3 = voter(&e.db, 3);
    e.db.cast_vote(e.poll, e.bob, v1).unwrap();
    e.db.cast_vote(e.poll, e.bob, v2).unwrap();
    e.db.cast_vote(e.poll, e.alice, v3).unwrap();

    let tally = e.db.tally(e.poll).unwrap();
    let counts: Vec<(CandidateId, u64)> = tally.iter().map(|t| (t.candidate_id, t.votes)).collect();
    assert_eq!(counts, vec![(e.bob, 2), (e.alice, 1)]);
    assert_eq!(tally[0].name, "Bob Kiprono");

    assert!(e.db.has_voted(e.poll, v1).unwrap());
    assert_eq!(e.db.list_votes(e.poll).unwrap().len(), 3);
}

#[test]
fn tally_includes_candidates_without_votes() {
    let e = election();
    let tally = e.db.tally(e.poll).unwrap();

    assert_eq!(tally.len(), 2);
    assert!(tally.iter().all(|t| t.votes == 0));
    // ties fall back to insertion order
    assert_eq!(tally[0].candidate_id, e.alice);
    assert!(e.db.tally(PollId(404)).unwrap().is_empty());
}

#[test]
fn one_vote_per_voter() {
    let e = election();
    let v = voter(&e.db, 1);
    e.db.cast_vote(e.poll, e.alice, v).unwrap();

    let err = e.db.cast_vote(e.poll, e.bob, v).unwrap_err();
    assert!(matches!(err, StoreError::AlreadyVoted { .. }));

    let tally = e.db.tally(e.poll).unwrap();
    assert_eq!(tally.iter().map(|t| t.votes).sum::<u64>(), 1);
}

#[test]
fn votes_refused_after_expiry() {
    let e = election();
    let v = voter(&e.db, 1);

    e.clock.set(T0 + PollDuration::ThirtyMinutes.as_millis());
    let err = e.db.cast_vote(e.poll, e.alice, v).unwrap_err();
    assert!(matches!(err, StoreError::PollClosed(p) if p == e.poll));
    assert!(!e.db.has_voted(e.poll, v).unwrap());
}

#[test]
fn vote_must_match_poll_candidate_and_voter() {
    let e = election();
    let v = voter(&e.db, 1);

    let other_poll = e.db.insert_poll("999999", PollDuration::TwoHours).unwrap();
    let stranger = e
        .db
        .insert_candidate("Carol Wambui", "Secretary", "Minutes on time.", other_poll)
        .unwrap();

    let err = e.db.cast_vote(e.poll, stranger, v).unwrap_err();
    assert!(matches!(err, StoreError::CandidateNotInPoll { .. }));

    let err = e.db.cast_vote(PollId(404), e.alice, v).unwrap_err();
    assert!(matches!(err, StoreError::PollNotFound(PollId(404))));

    let err = e.db.cast_vote(e.poll, e.alice, UserId(404)).unwrap_err();
    assert!(matches!(err, StoreError::UserNotFound(UserId(404))));

    assert!(e.db.list_votes(e.poll).unwrap().is_empty());
}

#[test]
fn vote_queued_behind_lock_sees_expiry() {
    let e = election();
    let v = voter(&e.db, 1);
    let end = e.db.get_poll_end_time(e.poll).unwrap().unwrap();

    let result = thread::scope(|s| {
        let handle = e
            .db
            .with_conn(|_| {
                let handle = s.spawn(|| e.db.cast_vote(e.poll, e.alice, v));
                // the vote is still waiting on the lock while the poll closes
                thread::sleep(Duration::from_millis(50));
                e.clock.set(end);
                Ok(handle)
            })
            .unwrap();
        handle.join().unwrap()
    });

    assert!(matches!(result, Err(StoreError::PollClosed(p)) if p == e.poll));
    assert!(!e.db.has_voted(e.poll, v).unwrap());
}

#[test]
fn unavailable_storage_is_fatal() {
    init_tracing();
    let path = std::env::temp_dir()
        .join(format!("electra-missing-{}", Uuid::new_v4()))
        .join("nested")
        .join("polls.db");

    let err = Database::open(&path).err().unwrap();
    assert!(matches!(err, StoreError::Storage(_)));
}

#[test]
fn upgrade_from_claimed_version_refused_on_v1_file() {
    init_tracing();
    let file = TempDb::new();

    {
        let mut conn = rusqlite::Connection::open(file.path()).unwrap();
        migrations::create_schema(&mut conn).unwrap();

        let err = migrations::upgrade_schema(&mut conn, 2, 3).unwrap_err();
        assert!(matches!(
            err,
            StoreError::SchemaVersionMismatch {
                expected: 2,
                found: 1
            }
        ));
        assert_eq!(migrations::current_version(&conn).unwrap(), 1);
    }

    let db = Database::open(file.path()).unwrap();
    assert_eq!(db.schema_version().unwrap(), CURRENT_VERSION);
    let poll = db.insert_poll("123456", PollDuration::TwoHours).unwrap();
    assert!(db.is_poll_active(poll).unwrap());
}

#[test]
fn remaining_time_counts_down_from_stored_end() {
    let e = election();
    assert_eq!(e.db.remaining_millis(e.poll).unwrap(), Some(1_800_000));

    e.clock.advance(60_000);
    assert_eq!(e.db.remaining_millis(e.poll).unwrap(), Some(1_740_000));
    assert_eq!(e.db.get_poll_end_time(e.poll).unwrap(), Some(T0 + 1_800_000));
}

#[test]
fn authenticate_returns_user_without_hash() {
    init_tracing();
    let db = Database::open_in_memory().unwrap();
    let id = db
        .insert_user("Grace", "Atieno", "grace@example.com", "letmein")
        .unwrap();

    let user = db.authenticate("grace@example.com", "letmein").unwrap().unwrap();
    assert_eq!(user.id, id);
    assert_eq!(user.last_name, "Atieno");

    let json = serde_json::to_value(&user).unwrap();
    assert!(json.get("password_hash").is_none());

    assert!(db.authenticate("grace@example.com", "LETMEIN").unwrap().is_none());
}

#[test]
fn data_survives_reopen() {
    init_tracing();
    let file = TempDb::new();

    let poll = {
        let db = Database::open(file.path()).unwrap();
        let poll = db.insert_poll("314159", PollDuration::TwentyFourHours).unwrap();
        db.insert_candidate("Dan Ouma", "Treasurer", "Balanced books.", poll)
            .unwrap();
        db.insert_user("Dan", "Ouma", "dan@example.com", "pw").unwrap();
        poll
    };

    let db = Database::open(file.path()).unwrap();
    assert_eq!(db.schema_version().unwrap(), CURRENT_VERSION);
    assert!(db.is_poll_active(poll).unwrap());
    assert_eq!(db.list_candidates(poll).unwrap().len(), 1);
    assert!(db.get_user_by_email_and_password("dan@example.com", "pw").unwrap());
}

#[test]
fn opens_and_upgrades_a_v1_file() {
    init_tracing();
    let file = TempDb::new();

    {
        let mut conn = rusqlite::Connection::open(file.path()).unwrap();
        migrations::create_schema(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO polls (voting_code, duration_label, end_time_ms)
             VALUES ('271828', '2 hours', 42)",
            [],
        )
        .unwrap();
    }

    let db = Database::open(file.path()).unwrap();
    assert_eq!(db.schema_version().unwrap(), CURRENT_VERSION);

    let old = db.find_poll_by_code("271828").unwrap().unwrap();
    assert_eq!(old.duration, PollDuration::TwoHours);
    assert_eq!(old.end_time_ms, 42);
    assert_eq!(old.created_at_ms, None);
    assert!(!db.is_poll_active(old.id).unwrap());

    // Explicit upgrades after the fact are no-ops
    db.create_schema().unwrap();
    db.upgrade_schema(1, CURRENT_VERSION).unwrap();
    assert!(matches!(
        db.upgrade_schema(CURRENT_VERSION, 1),
        Err(StoreError::Downgrade { .. })
    ));
}

#[test]
fn concurrent_signups_are_serialized() {
    init_tracing();
    let db = Arc::new(Database::open_in_memory().unwrap());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let db = Arc::clone(&db);
            // every thread races for the same email once, then a unique one
            thread::spawn(move || {
                let shared = db.insert_user("Same", "Email", "shared@example.com", "pw");
                let own = db.insert_user("Own", "Email", &format!("own{}@example.com", i), "pw");
                (shared.is_ok(), own.is_ok())
            })
        })
        .collect();

    let results: Vec<(bool, bool)> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|(shared, _)| *shared).count(), 1);
    assert!(results.iter().all(|(_, own)| *own));
}
