mod common;

use common::MemoryRemote;
use contactbook::persistence::{load_store, save_store};
use contactbook::{ContactInput, DataStore, GroupInput, LoadStatus, LocalFile, RemoteDataFile, Store};

fn sample_store() -> Store {
    let mut store = Store::new();
    store.seed_data().unwrap();
    store
}

#[test]
fn missing_file_is_a_fresh_start() {
    let dir = tempfile::tempdir().unwrap();
    let backend = LocalFile::new(dir.path().join("app_data.json"));

    let (store, status) = load_store(&backend);

    assert!(matches!(status, LoadStatus::Fresh));
    assert!(store.is_empty());
}

#[test]
fn local_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let backend = LocalFile::new(dir.path().join("nested").join("app_data.json"));
    let store = sample_store();

    save_store(&backend, &store).unwrap();
    let (loaded, status) = load_store(&backend);

    assert!(matches!(status, LoadStatus::Loaded));
    assert_eq!(loaded, store);
    assert!(backend.path().is_file());
    assert!(!backend.path().with_extension("json.tmp").exists());
}

#[test]
fn saved_document_has_the_expected_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app_data.json");
    let backend = LocalFile::new(&path);
    let mut store = Store::new();
    store.add_group(GroupInput::new("Family", "")).unwrap();
    store
        .add_contact(ContactInput::new("Dana", "050-1111111", "", "Family"))
        .unwrap();

    save_store(&backend, &store).unwrap();

    let value: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys.len(), 3);
    for key in ["contacts", "events", "groups"] {
        assert!(value.get(key).is_some(), "missing {key}");
    }
    assert_eq!(value["contacts"][0]["name"], "Dana");
    assert_eq!(value["contacts"][0]["email"], "");
    assert_eq!(value["groups"][0]["members"], serde_json::json!(["Dana"]));
}

#[test]
fn malformed_file_leaves_store_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app_data.json");
    std::fs::write(&path, "{\"contacts\": [").unwrap();

    let (store, status) = load_store(&LocalFile::new(&path));

    assert!(matches!(status, LoadStatus::Failed(_)));
    assert!(store.is_empty());
}

#[test]
fn failed_write_keeps_memory_state() {
    let dir = tempfile::tempdir().unwrap();
    // A directory in place of the document cannot be replaced by a file.
    let path = dir.path().join("app_data.json");
    std::fs::create_dir(&path).unwrap();
    let backend = LocalFile::new(&path);
    let store = sample_store();
    let before = store.clone();

    assert!(save_store(&backend, &store).is_err());
    assert_eq!(store, before);
}

#[test]
fn hand_edited_document_is_repaired_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app_data.json");
    std::fs::write(
        &path,
        r#"{
            "contacts": [
                {"name": "Dana", "phone": "1", "email": "", "group": "Family"},
                {"name": "Avi", "phone": "2", "email": "", "group": "Gone"}
            ],
            "events": [],
            "groups": [{"name": "Family", "description": "", "members": ["Avi"]}]
        }"#,
    )
    .unwrap();

    let (store, _) = load_store(&LocalFile::new(&path));

    assert!(store.violations().is_empty());
    let dana = store.find_contact_by_name("Dana").unwrap().id;
    assert_eq!(store.groups()[0].members, vec![dana]);
    assert_eq!(store.find_contact_by_name("Avi").unwrap().group, "");
}

#[test]
fn legacy_document_with_repeated_group_names_loads_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app_data.json");
    std::fs::write(
        &path,
        r#"{
            "contacts": [
                {"name": "Dana", "phone": "1", "email": "", "group": "Family"},
                {"name": "Avi", "phone": "2", "email": "", "group": "Family"}
            ],
            "events": [],
            "groups": [
                {"name": "Family", "description": "parents", "members": ["Dana"]},
                {"name": "Family", "description": "cousins", "members": ["Avi"]}
            ]
        }"#,
    )
    .unwrap();

    let (mut store, status) = load_store(&LocalFile::new(&path));

    assert!(matches!(status, LoadStatus::Loaded));
    assert!(store.violations().is_empty(), "{:?}", store.violations());
    let cousins = store.groups()[1].clone();
    assert_eq!(cousins.name, "Family (2)");
    assert_eq!(store.find_contact_by_name("Avi").unwrap().group, "Family (2)");

    store
        .update_group(cousins.id, GroupInput::new(cousins.name.clone(), "second cousins"))
        .unwrap();
    assert_eq!(store.groups()[1].description, "second cousins");
}

#[test]
fn remote_data_file_round_trip_overwrites_each_time() {
    let remote = MemoryRemote::new();
    let backend = RemoteDataFile::new(remote.clone(), "DATA/dana/data.json");

    let (empty, status) = load_store(&backend);
    assert!(matches!(status, LoadStatus::Fresh));
    assert!(empty.is_empty());

    let mut store = sample_store();
    save_store(&backend, &store).unwrap();
    store
        .add_contact(ContactInput::new("Late", "050-9", "", ""))
        .unwrap();
    save_store(&backend, &store).unwrap();

    let (loaded, status) = load_store(&backend);
    assert!(matches!(status, LoadStatus::Loaded));
    assert_eq!(loaded, store);
    assert_eq!(remote.puts().len(), 2);
    assert_eq!(backend.describe(), format!("remote {}", backend.path()));
    assert_eq!(remote.puts(), vec![backend.path().to_string(); 2]);
}

#[test]
fn remote_failures_are_persistence_errors() {
    let remote = MemoryRemote::new();
    remote.set_failing(true);
    let backend = RemoteDataFile::new(remote, "DATA/dana/data.json");

    let (store, status) = load_store(&backend);
    assert!(matches!(status, LoadStatus::Failed(contactbook::BookError::Remote(_))));
    assert!(store.is_empty());
    assert!(save_store(&backend, &sample_store()).is_err());
}
