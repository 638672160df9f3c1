mod common;

use common::MemoryRemote;
use contactbook::accounts::{AccountDirectory, Accounts};
use contactbook::persistence::load_store;
use contactbook::LoadStatus;

fn directory() -> (MemoryRemote, AccountDirectory<MemoryRemote>) {
    let remote = MemoryRemote::new();
    let directory = AccountDirectory::new(remote.clone(), "DATA");
    (remote, directory)
}

#[test]
fn register_then_login() {
    let (remote, directory) = directory();

    assert!(directory.register("dana", "secret"));
    assert!(directory.login("dana", "secret"));
    assert!(!directory.login("dana", "wrong"));
    assert!(!directory.login("nobody", "secret"));

    let users: Accounts =
        serde_json::from_slice(&remote.content("DATA/users.json").unwrap()).unwrap();
    assert_eq!(users["dana"].password, "secret");
    let created_at = users["dana"].created_at.as_deref().unwrap();
    assert!(chrono::NaiveDateTime::parse_from_str(created_at, "%Y-%m-%dT%H:%M:%S%.f").is_ok());
}

#[test]
fn registration_creates_an_empty_document() {
    let (_, directory) = directory();
    assert!(directory.register("dana", "secret"));

    let (store, status) = load_store(&directory.data_file("dana"));
    assert!(matches!(status, LoadStatus::Loaded));
    assert!(store.is_empty());
}

#[test]
fn duplicate_registration_is_denied() {
    let (_, directory) = directory();
    assert!(directory.register("dana", "secret"));
    assert!(!directory.register("dana", "other"));
    assert!(directory.login("dana", "secret"));
}

#[test]
fn existing_users_file_is_read_as_written_by_older_clients() {
    let (remote, directory) = directory();
    remote.insert(
        "DATA/users.json",
        br#"{"dana": {"password": "secret", "created_at": "2024-05-01T10:30:00.123456"}}"#,
    );

    assert!(directory.login("dana", "secret"));
    assert!(directory.register("avi", "pw"));
    assert!(directory.login("dana", "secret"));
    assert!(directory.login("avi", "pw"));
}

#[test]
fn odd_timestamps_never_lock_out_other_accounts() {
    for created_at in [
        r#""2024-05-01 10:00:00""#,
        r#""2024-05-01T10:00:00+03:00""#,
        r#""""#,
        "null",
    ] {
        let (remote, directory) = directory();
        let users = format!(
            r#"{{"alice": {{"password": "a", "created_at": {created_at}}}, "bob": {{"password": "b"}}}}"#
        );
        remote.insert("DATA/users.json", users.as_bytes());

        assert!(directory.login("bob", "b"), "created_at {created_at}");
        assert!(directory.login("alice", "a"), "created_at {created_at}");
        assert!(directory.register("carol", "c"));

        let stored: Accounts =
            serde_json::from_slice(&remote.content("DATA/users.json").unwrap()).unwrap();
        let expected: Option<String> = serde_json::from_str(created_at).unwrap();
        assert_eq!(stored["alice"].created_at, expected);
        assert_eq!(stored["bob"].created_at, None);
    }
}

#[test]
fn path_like_usernames_are_denied() {
    let (_, directory) = directory();
    assert!(!directory.register("../etc", "pw"));
    assert!(!directory.register("a/b", "pw"));
    assert!(!directory.register("", "pw"));
    assert!(!directory.register("dana", ""));
}

#[test]
fn remote_failure_denies_instead_of_failing() {
    let (remote, directory) = directory();
    assert!(directory.register("dana", "secret"));

    remote.set_failing(true);
    assert!(!directory.login("dana", "secret"));
    assert!(!directory.register("avi", "pw"));
}

#[test]
fn paths_follow_the_folder_layout() {
    let (_, directory) = directory();
    assert_eq!(directory.users_path(), "DATA/users.json");
    assert_eq!(directory.data_path("dana"), "DATA/dana/data.json");
    assert_eq!(directory.data_file("dana").path(), "DATA/dana/data.json");

    let root = AccountDirectory::new(MemoryRemote::new(), "");
    assert_eq!(root.users_path(), "users.json");
}
