//! Credential file persistence, environment overlay and downstream sync.

use mespack_auth::fakes::{FailingSync, RecordingSync};
use mespack_auth::{generate_env_vars, Credential, CredentialStore, RepositoryType};

fn npm_token(repo: &str, token: &str) -> Credential {
    Credential::bearer(RepositoryType::Npm, Some(repo.to_string()), None, token)
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn test_saved_credentials_survive_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("auth.json");

    let mut store = CredentialStore::new(&path);
    store
        .save(&[npm_token("https://npm.example.com", "one")], false)
        .unwrap();

    let reloaded = CredentialStore::load(&path).unwrap();
    let creds: Vec<_> = reloaded.credentials().cloned().collect();
    assert_eq!(creds, vec![npm_token("https://npm.example.com", "one")]);
}

#[test]
fn test_save_upserts_same_slot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("auth.json");

    let mut store = CredentialStore::new(&path);
    store
        .save(&[npm_token("https://npm.example.com", "old")], false)
        .unwrap();
    let report = store
        .save(&[npm_token("https://npm.example.com/", "new")], false)
        .unwrap();
    assert_eq!(report.stored, 1);

    let reloaded = CredentialStore::load(&path).unwrap();
    let found = reloaded
        .get_credentials_for(RepositoryType::Npm, Some("https://npm.example.com"))
        .unwrap();
    assert_eq!(found, &npm_token("https://npm.example.com/", "new"));
}

#[test]
fn test_missing_file_loads_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::load(dir.path().join("absent.json")).unwrap();
    assert_eq!(store.credentials().count(), 0);
}

// ---------------------------------------------------------------------------
// Downstream sync
// ---------------------------------------------------------------------------

#[test]
fn test_sync_failure_keeps_local_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("auth.json");
    let recorder = RecordingSync::new();

    let mut store = CredentialStore::new(&path)
        .with_sync_target(Box::new(FailingSync::new("docker")))
        .with_sync_target(Box::new(recorder.clone()));
    let report = store
        .save(&[npm_token("https://npm.example.com", "t")], true)
        .unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.sync_failures.len(), 1);
    assert_eq!(report.sync_failures[0].0, "docker");
    assert_eq!(recorder.received().len(), 1);

    let reloaded = CredentialStore::load(&path).unwrap();
    assert_eq!(reloaded.credentials().count(), 1);
}

#[test]
fn test_store_only_skips_sync_targets() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = RecordingSync::new();
    let mut store = CredentialStore::new(dir.path().join("auth.json"))
        .with_sync_target(Box::new(recorder.clone()));

    let report = store
        .save(&[npm_token("https://npm.example.com", "t")], false)
        .unwrap();
    assert!(report.is_complete());
    assert!(recorder.received().is_empty());
}

// ---------------------------------------------------------------------------
// Environment variables
// ---------------------------------------------------------------------------

#[test]
fn test_generated_env_vars_load_back_as_overlay() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("auth.json");
    let cifs = Credential::basic(
        RepositoryType::Cifs,
        Some(r"\\files\packages".to_string()),
        None,
        Some("CORP".to_string()),
        "svc",
        "pw",
    );

    let vars = generate_env_vars(std::slice::from_ref(&cifs)).unwrap();
    assert_eq!(vars.len(), 1);
    assert!(vars[0].0.starts_with("MESPACK_AUTH__CIFS__"));

    let mut store = CredentialStore::load(&path).unwrap();
    store.merge_env(vars);
    let found = store
        .get_credentials_for(RepositoryType::Cifs, Some("//files/packages/ci"))
        .unwrap();
    assert_eq!(found, &cifs);

    // overlay entries are never persisted
    store.save(&[], false).unwrap();
    let reloaded = CredentialStore::load(&path).unwrap();
    assert_eq!(reloaded.credentials().count(), 0);
}
