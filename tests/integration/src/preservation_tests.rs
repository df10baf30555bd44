//! Hand-edited endpoint files survive syncs byte for byte
//!
//! Only the sections of the synced extension change; comments, templates,
//! unrelated sections and CRLF line endings stay as they were.

use pbx_core::{ApplyOptions, Target};
use pbx_test_utils::{TestPbx, record};
use pretty_assertions::assert_eq;

const HAND_EDITED: &str = "; PJSIP configuration\r\n\
; edited by hand\r\n\
\r\n\
[transport-udp]\r\n\
type=transport\r\n\
protocol=udp    ; keep udp\r\n\
bind=0.0.0.0\r\n\
\r\n\
[1001]\r\n\
type=endpoint\r\n\
context=old\r\n\
\r\n\
; reception phone\r\n\
[2000](phone-template)\r\n\
type=endpoint\r\n\
context=internal\r\n\
allow = ulaw   ; legacy\r\n\
\r\n\
[1001]\r\n\
type=aor\r\n\
max_contacts=1\r\n";

async fn sync_one(pbx: &TestPbx, id: &str) {
    let report = pbx
        .service()
        .sync_record_to_live(Target::One(id.to_string()), &ApplyOptions::default())
        .await
        .unwrap();
    assert!(report.success(), "{:?}", report.summary());
}

fn assert_crlf_only(content: &str) {
    assert!(!content.replace("\r\n", "").contains('\n'), "bare LF in {:?}", content);
}

#[tokio::test]
async fn test_unrelated_content_is_untouched() {
    let pbx = TestPbx::new();
    pbx.write_endpoints(HAND_EDITED);
    pbx.repository.insert(record("1001"));

    sync_one(&pbx, "1001").await;

    let content = pbx.read_endpoints();
    assert!(
        content.starts_with(
            "; PJSIP configuration\r\n; edited by hand\r\n\r\n[transport-udp]\r\ntype=transport\r\n\
             protocol=udp    ; keep udp\r\nbind=0.0.0.0\r\n\r\n[1001]\r\ntype=endpoint\r\ncontext=internal\r\n"
        ),
        "{:?}",
        content
    );
    assert!(content.contains(
        "\r\n\r\n; reception phone\r\n[2000](phone-template)\r\ntype=endpoint\r\ncontext=internal\r\n\
         allow = ulaw   ; legacy\r\n\r\n[1001]\r\ntype=aor\r\nmax_contacts=1\r\nremove_existing=yes\r\n\
         \r\n[1001]\r\ntype=auth\r\n"
    ));
    assert!(content.ends_with("password=pw-1001\r\n"));
    assert_crlf_only(&content);
}

#[tokio::test]
async fn test_dropping_secret_removes_only_auth() {
    let pbx = TestPbx::new();
    pbx.write_endpoints(HAND_EDITED);
    pbx.repository.insert(record("1001"));
    sync_one(&pbx, "1001").await;

    let mut without_secret = record("1001");
    without_secret.secret = None;
    pbx.repository.insert(without_secret);
    sync_one(&pbx, "1001").await;

    let content = pbx.read_endpoints();
    assert!(!content.contains("type=auth"));
    assert!(!content.contains("auth=1001"));
    assert!(content.ends_with("[1001]\r\ntype=aor\r\nmax_contacts=1\r\nremove_existing=yes\r\n"));
    assert!(content.contains("[2000](phone-template)\r\n"));
    assert_crlf_only(&content);
}

#[tokio::test]
async fn test_resync_changes_nothing() {
    let pbx = TestPbx::new();
    pbx.write_endpoints(HAND_EDITED);
    pbx.repository.insert(record("1001"));
    sync_one(&pbx, "1001").await;
    let service = pbx.service();
    let after_first = pbx.read_endpoints();
    let backups = service.list_backups(pbx.endpoints()).await.unwrap();

    let report = service
        .sync_record_to_live(Target::One("1001".to_string()), &ApplyOptions::default())
        .await
        .unwrap();

    assert!(!report.items[0].changed);
    assert_eq!(pbx.read_endpoints(), after_first);
    assert_eq!(service.list_backups(pbx.endpoints()).await.unwrap(), backups);
    assert_eq!(pbx.engine.reload_count(), 1);
}

#[tokio::test]
async fn test_first_backup_holds_the_hand_edited_file() {
    let pbx = TestPbx::new();
    pbx.write_endpoints(HAND_EDITED);
    pbx.repository.insert(record("1001"));

    sync_one(&pbx, "1001").await;

    let backups = pbx.service().list_backups(pbx.endpoints()).await.unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(
        std::fs::read_to_string(backups[0].backup_path.to_native()).unwrap(),
        HAND_EDITED
    );
}
