mod common;

use std::fs;

use common::{path_str, MockTransport};
use syncengine::{audit, default_workers, send, AuditStatus, DigestOracle, SyncContext, SyncOptions};

fn synced_tree(remote: &MockTransport, root: &std::path::Path) -> String {
    let docs = root.join("docs");
    fs::create_dir_all(docs.join("nested")).expect("Failed to create dirs");
    fs::write(docs.join("one.txt"), b"one").expect("Failed to write file");
    fs::write(docs.join("two.txt"), b"two").expect("Failed to write file");
    fs::write(docs.join("nested").join("three.txt"), b"three").expect("Failed to write file");

    let options = SyncOptions::default();
    let ctx = SyncContext::new(remote, &options);
    let docs = path_str(&docs);
    send(&ctx, &docs, "/mirror", None).expect("send should succeed");
    docs
}

#[test]
fn test_audit_after_sync_is_clean() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let remote = MockTransport::new();
    let docs = synced_tree(&remote, temp_dir.path());

    for workers in [0, 1, 2, default_workers()] {
        let report = audit(&remote, DigestOracle::default(), &docs, "/mirror/docs", workers)
            .expect("audit should succeed");
        assert_eq!(report.records.len(), 3);
        assert!(report.is_clean(), "workers = {}", workers);
    }
}

#[test]
fn test_audit_reports_mismatch_and_missing() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let remote = MockTransport::new();
    let docs = synced_tree(&remote, temp_dir.path());

    remote.write_remote("/mirror/docs/two.txt", b"tampered");
    fs::remove_file(remote.backing_path("/mirror/docs/nested/three.txt"))
        .expect("Failed to remove remote file");

    let report = audit(&remote, DigestOracle::default(), &docs, "/mirror/docs", 0)
        .expect("audit should succeed");

    let statuses: Vec<(&str, &AuditStatus)> = report
        .records
        .iter()
        .map(|r| (r.remote_path.as_str(), &r.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("/mirror/docs/nested/three.txt", &AuditStatus::MissingRemote),
            ("/mirror/docs/one.txt", &AuditStatus::Match),
            ("/mirror/docs/two.txt", &AuditStatus::Mismatch),
        ]
    );
    assert!(!report.is_clean());
    assert_eq!(report.problems().count(), 2);
}

#[test]
fn test_audit_empty_tree() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let remote = MockTransport::new();

    let report = audit(
        &remote,
        DigestOracle::default(),
        &path_str(temp_dir.path()),
        "/anything",
        4,
    )
    .expect("audit should succeed");

    assert!(report.records.is_empty());
    assert!(report.is_clean());
}
