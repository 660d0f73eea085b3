// Unit tests for the session store

use crate::error::store::StoreError;
use crate::session::SessionStore;

use common::CookieSet;

use tempfile::TempDir;

fn store_in(dir: &TempDir) -> SessionStore {
    SessionStore::new(dir.path().join("session.json"))
}

fn cookies(pairs: &[(&str, &str)]) -> CookieSet {
    let mut set = CookieSet::new();
    for (name, value) in pairs {
        set.insert(*name, *value);
    }
    set
}

/// **VALUE**: Verifies the persist/recover round trip.
///
/// **WHY THIS MATTERS**: Recovered cookies are what let a restarted process
/// skip the interactive email login. A lossy round trip silently downgrades
/// every restart to a manual step.
///
/// **BUG THIS CATCHES**: Would catch serialization shape drift between
/// persist and recover, or values truncated on the way through.
#[test]
fn given_persisted_cookies_when_recovered_in_fresh_store_then_identical() {
    let dir = TempDir::new().unwrap();
    let saved = cookies(&[("session-token", "abc"), ("csrf", "xyz")]);

    store_in(&dir).persist("user@example.org", &saved).unwrap();

    // Fresh instance, same path: simulates a process restart.
    let recovered = store_in(&dir)
        .recover("user@example.org")
        .unwrap()
        .expect("entry exists");
    assert_eq!(recovered, saved);
}

#[test]
fn given_missing_file_when_recovered_then_none() {
    let dir = TempDir::new().unwrap();
    assert!(store_in(&dir).recover("user@example.org").unwrap().is_none());
}

#[test]
fn given_other_account_when_recovered_then_none() {
    let dir = TempDir::new().unwrap();
    store_in(&dir)
        .persist("a@example.org", &cookies(&[("t", "1")]))
        .unwrap();

    assert!(store_in(&dir).recover("b@example.org").unwrap().is_none());
}

/// **VALUE**: Verifies read-then-merge-then-overwrite keeps other accounts.
///
/// **WHY THIS MATTERS**: One file holds every account's cookies; persisting
/// for one account must not wipe the others.
///
/// **BUG THIS CATCHES**: Would catch a persist that writes a single-entry
/// map instead of merging into the existing one.
#[test]
fn given_two_accounts_when_persisted_then_both_survive() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    store.persist("a@example.org", &cookies(&[("t", "1")])).unwrap();
    store.persist("b@example.org", &cookies(&[("t", "2")])).unwrap();

    assert_eq!(
        store.recover("a@example.org").unwrap().unwrap().get("t"),
        Some("1")
    );
    assert_eq!(
        store.recover("b@example.org").unwrap().unwrap().get("t"),
        Some("2")
    );
}

#[test]
fn given_repersisted_account_when_recovered_then_latest_cookies_win() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    store.persist("a@example.org", &cookies(&[("t", "old")])).unwrap();
    store.persist("a@example.org", &cookies(&[("t", "new")])).unwrap();

    assert_eq!(
        store.recover("a@example.org").unwrap().unwrap().get("t"),
        Some("new")
    );
}

#[test]
fn given_corrupt_file_when_recovered_then_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, "{ not json").unwrap();

    let result = SessionStore::new(&path).recover("user@example.org");
    assert!(matches!(result, Err(StoreError::ParseError { .. })));
}

#[test]
fn given_corrupt_file_when_persisted_then_overwritten_with_current_entry() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, "{ not json").unwrap();

    let store = SessionStore::new(&path);
    store.persist("a@example.org", &cookies(&[("t", "1")])).unwrap();

    assert_eq!(store.recover("a@example.org").unwrap().unwrap().get("t"), Some("1"));
}
