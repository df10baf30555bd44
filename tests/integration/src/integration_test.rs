//! End-to-end test of the full flow
//!
//! settings -> record repository on disk -> status -> sync to live ->
//! engine reload -> drift on the engine -> sync to records -> backups.

use std::fs;
use std::sync::Arc;

use pbx_core::service::config_store;
use pbx_core::{
    ApplyOptions, PbxSync, RecordRepository, ReloadStatus, SettingsResolver, SyncStatus, Target,
    TomlRecordRepository,
};
use pbx_fs::NormalizedPath;
use pbx_test_utils::{FakeEngine, record};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

struct Site {
    _temp: TempDir,
    endpoints: NormalizedPath,
    engine: Arc<FakeEngine>,
    repository: Arc<TomlRecordRepository>,
    service: PbxSync,
}

fn site() -> Site {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("asterisk")).unwrap();
    fs::write(
        root.join("pbxsync.toml"),
        format!(
            "[files]\nendpoints = \"{}\"\nbackup_dir = \"{}\"\n\n[backup]\ntag = \"pbx\"\nkeep = 3\n\n[repository]\npath = \"{}\"\n",
            root.join("asterisk/pjsip.conf").display(),
            root.join("backups").display(),
            root.join("extensions.toml").display()
        ),
    )
    .unwrap();

    let settings = SettingsResolver::new(root.join("pbxsync.toml"))
        .with_global_config_dir(root.join("global"))
        .resolve()
        .unwrap();
    let endpoints = NormalizedPath::new(&settings.files.endpoints);
    let engine = Arc::new(FakeEngine::reading(endpoints.clone()));
    let repository = Arc::new(TomlRecordRepository::new(NormalizedPath::new(&settings.repository.path)));
    let service = PbxSync::new(
        engine.clone(),
        repository.clone(),
        config_store(&settings).unwrap(),
        endpoints.clone(),
        settings.engine.timeout(),
    );

    Site {
        _temp: temp,
        endpoints,
        engine,
        repository,
        service,
    }
}

#[tokio::test]
async fn test_full_reconciliation_cycle() {
    let site = site();
    fs::write(site.endpoints.to_native(), "[transport-udp]\ntype=transport\nprotocol=udp\n").unwrap();
    for id in ["1001", "1002"] {
        site.repository.upsert(record(id)).await.unwrap();
    }

    // Both records are pending.
    let status = site.service.get_sync_status().await.unwrap();
    assert_eq!(status.counts.record_only, 2);

    // Push them and reload once.
    let report = site
        .service
        .sync_record_to_live(Target::All, &ApplyOptions::default())
        .await
        .unwrap();
    assert!(report.success(), "{:?}", report.summary());
    assert!(matches!(report.reload, ReloadStatus::Reloaded { .. }));
    assert_eq!(site.engine.reload_count(), 1);
    assert!(site.service.get_sync_status().await.unwrap().is_in_sync());

    // The engine drifts: someone renamed 1002 directly on the PBX.
    let mut drifted = site.engine.live()["1002"].clone();
    drifted.name = Some("Reception".to_string());
    site.engine.set_live(drifted);
    let status = site.service.get_sync_status().await.unwrap();
    assert!(matches!(status.statuses["1002"], SyncStatus::Mismatched { .. }));

    // Pull the live state back; the secret survives.
    let report = site
        .service
        .sync_live_to_record(Target::All, &ApplyOptions::default())
        .await
        .unwrap();
    assert_eq!(report.items.len(), 1);
    let stored = site.repository.get("1002").await.unwrap().unwrap();
    assert_eq!(stored.name, "Reception");
    assert_eq!(stored.secret.as_deref(), Some("pw-1002"));
    assert_eq!(report.reload, ReloadStatus::NotNeeded);

    // Records now differ from the file: pushing writes the new caller id.
    let report = site
        .service
        .sync_record_to_live(Target::One("1002".to_string()), &ApplyOptions::default())
        .await
        .unwrap();
    assert!(report.items[0].changed);
    let content = fs::read_to_string(site.endpoints.to_native()).unwrap();
    assert!(content.contains("callerid=\"Reception\" <1002>"));
    assert!(site.service.get_sync_status().await.unwrap().is_in_sync());
}

#[tokio::test]
async fn test_backups_follow_settings() {
    let site = site();
    fs::write(site.endpoints.to_native(), "[global]\ntype=global\n").unwrap();

    for id in ["1001", "1002", "1003", "1004", "1005"] {
        site.repository.upsert(record(id)).await.unwrap();
        site.service
            .sync_record_to_live(Target::One(id.to_string()), &ApplyOptions::default())
            .await
            .unwrap();
    }

    let backups = site.service.list_backups(&site.endpoints).await.unwrap();
    assert_eq!(backups.len(), 3);
    for entry in &backups {
        assert!(entry.id.starts_with("pjsip.conf.pbx."), "{}", entry.id);
        assert!(entry.backup_path.as_str().contains("/backups/"), "{}", entry.backup_path);
    }

    // The newest backup holds the content before the last write.
    let newest = fs::read_to_string(backups[0].backup_path.to_native()).unwrap();
    assert!(newest.contains("[1004]"));
    assert!(!newest.contains("[1005]"));

    site.service.restore_backup(&backups[0].id, &site.endpoints).await.unwrap();
    let restored = fs::read_to_string(site.endpoints.to_native()).unwrap();
    assert_eq!(restored, newest);
}

#[tokio::test]
async fn test_dry_run_leaves_everything_untouched() {
    let site = site();
    site.repository.upsert(record("1001")).await.unwrap();

    let report = site
        .service
        .sync_record_to_live(Target::All, &ApplyOptions::dry_run())
        .await
        .unwrap();

    assert!(report.items[0].diff.as_deref().unwrap().contains("+[1001]"));
    assert!(!site.endpoints.exists());
    assert_eq!(site.engine.reload_count(), 0);
    assert!(site.service.list_backups(&site.endpoints).await.unwrap().is_empty());
}
