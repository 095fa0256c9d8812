use avsync_client::config::{ClientConfig, SyncConfig, TelemetryConfig};
use avsync_client::persistence::{self, SourceRegistry};
use avsync_client::{generate_item_id, DatabaseConfig, SourceConfig};
use avsync_core::extract_identifier;
use avsync_test_utils::generators::arb_ident;
use proptest::prelude::*;
use serde_json::json;

fn base_config() -> ClientConfig {
    ClientConfig {
        api_base_url: "http://127.0.0.1:6806".to_string(),
        api_token: Some("test-token".to_string()),
        request_timeout_ms: 5_000,
        sync: SyncConfig::default(),
        telemetry: TelemetryConfig::default(),
        registry_path: "tmp/avsync-registry.json".into(),
    }
}

#[test]
fn config_base_is_valid() {
    assert!(base_config().validate().is_ok());
}

#[test]
fn config_requires_http_base_url() {
    let mut config = base_config();
    config.api_base_url = "127.0.0.1:6806".to_string();
    assert!(config.validate().is_err());
    config.api_base_url = "  ".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn config_rejects_blank_token() {
    let mut config = base_config();
    config.api_token = Some(" ".to_string());
    assert!(config.validate().is_err());
    config.api_token = None;
    assert!(config.validate().is_ok());
}

#[test]
fn config_requires_poll_attempts() {
    let mut config = base_config();
    config.sync.poll_attempts = 0;
    assert!(config.validate().is_err());
}

#[test]
fn config_requires_timeout() {
    let mut config = base_config();
    config.request_timeout_ms = 0;
    assert!(config.validate().is_err());
}

#[test]
fn config_from_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("avsync.toml");
    std::fs::write(
        &path,
        "api_base_url = \"http://127.0.0.1:6806\"\nrequest_timeout_ms = 3000\nregistry_path = \"reg.json\"\n[sync]\npoll_interval_ms = 250\n",
    )
    .unwrap();
    let config = ClientConfig::from_path(&path).unwrap();
    assert_eq!(config.sync.poll_interval_ms, 250);
    assert_eq!(config.sync.poll_attempts, 10);
    assert!(config.validate().is_ok());
}

#[test]
fn registry_round_trip_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.json");
    let mut registry = SourceRegistry {
        legacy: Some(SourceConfig::new("av-legacy")),
        ..Default::default()
    };
    let mut source: SourceConfig = serde_json::from_value(json!({
        "avID": "av-plan",
        "startKeyID": "k-start",
        "endKeyID": "k-end",
    }))
    .unwrap();
    source.view_id = Some("v-gantt".to_string());
    registry.upsert(DatabaseConfig {
        id: "db-plan".to_string(),
        name: "Plan".to_string(),
        source,
    });
    persistence::save(&path, &registry).unwrap();

    let loaded = persistence::load(&path).unwrap().unwrap();
    let selected = loaded.select(Some("db-plan")).unwrap();
    assert_eq!(selected.view_id.as_deref(), Some("v-gantt"));
    assert_eq!(selected.roles.end(), Some("k-end"));
    assert_eq!(loaded.select(Some("db-gone")).unwrap().av_id, "av-legacy");
}

proptest! {
    #[test]
    fn generated_item_ids_are_references(_seed in 0u8..16) {
        let id = generate_item_id();
        prop_assert_eq!(extract_identifier(&json!(format!("[[{}]]", id))), id);
    }

    #[test]
    fn registry_select_prefers_database(db_id in arb_ident(), av_id in arb_ident()) {
        let mut registry = SourceRegistry {
            legacy: Some(SourceConfig::new("av-legacy")),
            ..Default::default()
        };
        registry.upsert(DatabaseConfig {
            id: db_id.clone(),
            name: "db".to_string(),
            source: SourceConfig::new(av_id.clone()),
        });
        prop_assert_eq!(&registry.select(Some(&db_id)).unwrap().av_id, &av_id);
        prop_assert_eq!(registry.select(None).unwrap().av_id.as_str(), "av-legacy");
    }
}
