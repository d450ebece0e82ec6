//! Share session behavior against the scripted SMB client.

use mespack_auth::{Credential, RepositoryType};
use mespack_transport::fakes::ScriptedSmbClient;
use mespack_transport::{ConnectionState, ShareSession, TransportError, UncPath};

fn basic() -> Option<Credential> {
    Some(Credential::basic(
        RepositoryType::Cifs,
        Some(r"\\files\packages".to_string()),
        None,
        Some("CORP".to_string()),
        "svc",
        "pw",
    ))
}

fn folder(raw: &str) -> UncPath {
    UncPath::parse(raw).unwrap()
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_missing_credential_degrades_to_not_found() {
    let client = ScriptedSmbClient::new().with_file("packages", r"ci\a.1.0.zip", "A");
    let mut session = ShareSession::new("files", Box::new(client.clone()), None);
    let idx = session.add_folder(folder(r"\\files\packages\ci"));

    assert!(!session.connect().await.unwrap());
    assert_eq!(session.state(), ConnectionState::Failed);
    assert!(session.get_file(idx, "a.1.0.zip").await.unwrap().is_none());
    assert_eq!(client.calls().connects, 0);
}

#[tokio::test]
async fn test_offered_credential_rearms_session_without_one() {
    let client = ScriptedSmbClient::new().with_file("packages", r"ci\a.1.0.zip", "A");
    let mut session = ShareSession::new("files", Box::new(client.clone()), None);
    let idx = session.add_folder(folder(r"\\files\packages\ci"));
    assert!(!session.connect().await.unwrap());

    assert!(session.offer_credential(basic().unwrap()));
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(session.get_file(idx, "a.1.0.zip").await.unwrap().is_some());
    assert_eq!(client.calls().logins, 1);
}

#[test]
fn test_first_credential_is_kept() {
    let other = Credential::basic(RepositoryType::Cifs, None, None, None, "other", "x");
    let mut session = ShareSession::new("files", Box::new(ScriptedSmbClient::new()), basic());
    assert!(!session.offer_credential(other));
}

#[tokio::test]
async fn test_bearer_credential_is_invalid_auth_type() {
    let cred = Credential::bearer(RepositoryType::Cifs, None, None, "tok");
    let mut session = ShareSession::new("files", Box::new(ScriptedSmbClient::new()), Some(cred));
    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, TransportError::InvalidAuthType { .. }));
}

#[tokio::test]
async fn test_handshake_happens_once_until_disconnect() {
    let client = ScriptedSmbClient::new().with_file("packages", r"ci\a.1.0.zip", "A");
    let mut session = ShareSession::new("files", Box::new(client.clone()), basic());
    let idx = session.add_folder(folder("//files/packages/ci"));

    session.get_file(idx, "a.1.0.zip").await.unwrap().unwrap();
    session.get_file(idx, "a.1.0.zip").await.unwrap().unwrap();
    assert_eq!(client.calls().logins, 1);

    session.disconnect().await;
    assert_eq!(session.state(), ConnectionState::Disconnected);
    session.get_file(idx, "a.1.0.zip").await.unwrap().unwrap();
    assert_eq!(client.calls().logins, 2);
    assert_eq!(client.calls().disconnects, 1);
}

#[tokio::test]
async fn test_rejected_login_is_sticky_failure() {
    let client = ScriptedSmbClient::new()
        .with_file("packages", "a.1.0.zip", "A")
        .rejecting_login();
    let mut session = ShareSession::new("files", Box::new(client.clone()), basic());
    let idx = session.add_folder(folder(r"\\files\packages"));

    assert!(session.get_file(idx, "a.1.0.zip").await.unwrap().is_none());
    assert!(session.get_file(idx, "a.1.0.zip").await.unwrap().is_none());
    assert_eq!(client.calls().logins, 1);
    assert_eq!(session.state(), ConnectionState::Failed);
}

#[tokio::test]
async fn test_failed_mount_only_affects_its_share() {
    let client = ScriptedSmbClient::new().with_file("packages", "a.1.0.zip", "A");
    let mut session = ShareSession::new("files", Box::new(client.clone()), basic());
    let missing = session.add_folder(folder(r"\\files\gone\dir"));
    let present = session.add_folder(folder(r"\\files\packages"));

    assert!(session.connect().await.unwrap());
    assert!(!session.folder(missing).unwrap().exists());
    assert!(session.folder(present).unwrap().exists());
    assert!(session.get_file(missing, "a.1.0.zip").await.unwrap().is_none());
    assert!(session.get_file(present, "a.1.0.zip").await.unwrap().is_some());
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_chunked_read_reassembles_file_in_order() {
    let contents: Vec<u8> = (0u8..=200).collect();
    let client = ScriptedSmbClient::new()
        .with_file("packages", r"released\big.1.0.zip", contents.clone())
        .with_max_read(7);
    let mut session = ShareSession::new("files", Box::new(client.clone()), basic());
    let idx = session.add_folder(folder(r"\\files\packages\released\"));

    let file = session.get_file(idx, "big.1.0.zip").await.unwrap().unwrap();
    assert_eq!(file.data, contents);
    assert_eq!(file.location.to_native(), r"\\files\packages\released\big.1.0.zip");
    assert_eq!(client.calls().opens, vec![r"released\big.1.0.zip".to_string()]);
    assert_eq!(client.calls().closes, 1);
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let client = ScriptedSmbClient::new().with_share("packages");
    let mut session = ShareSession::new("files", Box::new(client), basic());
    let idx = session.add_folder(folder(r"\\files\packages"));
    assert!(session.get_file(idx, "nope.1.0.zip").await.unwrap().is_none());
}

#[tokio::test]
async fn test_read_error_after_open_is_read_failure() {
    let client = ScriptedSmbClient::new().with_broken_file("packages", "a.1.0.zip", "A");
    let mut session = ShareSession::new("files", Box::new(client.clone()), basic());
    let idx = session.add_folder(folder(r"\\files\packages"));

    let err = session.get_file(idx, "a.1.0.zip").await.unwrap_err();
    match err {
        TransportError::ReadFailure { path, .. } => assert_eq!(path, "//files/packages/a.1.0.zip"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(client.calls().closes, 1);
}

#[tokio::test]
async fn test_empty_file_reads_as_empty_buffer() {
    let client = ScriptedSmbClient::new().with_file("packages", "empty.1.0.zip", Vec::new());
    let mut session = ShareSession::new("files", Box::new(client), basic());
    let idx = session.add_folder(folder(r"\\files\packages"));
    let file = session.get_file(idx, "empty.1.0.zip").await.unwrap().unwrap();
    assert!(file.data.is_empty());
}
