//! Settings file loading tests

use std::io::Write;
use svcmesh_config::{ConfigError, Settings};

fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp file");
    file.write_all(content.as_bytes()).expect("write settings");
    file
}

#[test]
fn test_load_toml_settings() {
    let file = write_temp(
        ".toml",
        r#"
[rpc]
max_coroutine = 8
rpc_expired = 3

[[module.Chat]]
id = "chat-1"
process_id = "development"

[module.Chat.settings]
room = "lobby"

[[module.Chat]]
id = "chat-2"
process_id = "edge"
"#,
    );

    let settings = Settings::load_from_file(file.path()).expect("load toml");
    assert_eq!(settings.rpc.max_coroutine, 8);
    assert_eq!(settings.rpc.rpc_expired, 3);
    assert!(settings.rpc.log, "unset keys keep defaults");

    let chat: Vec<_> = settings.module_instances("Chat", "development").collect();
    assert_eq!(chat.len(), 1);
    assert_eq!(chat[0].id, "chat-1");
    assert_eq!(chat[0].get_str("room"), Some("lobby"));
}

#[test]
fn test_load_json_settings_with_legacy_keys() {
    let file = write_temp(
        ".json",
        r#"{
  "Module": {
    "Gate": [
      { "Id": "gate-1", "ProcessID": "development", "Settings": { "TCPAddr": ":3563" } }
    ]
  },
  "Rpc": { "MaxCoroutine": 50, "RpcExpired": 7, "Log": false }
}"#,
    );

    let settings = Settings::load_from_file(file.path()).expect("load json");
    assert_eq!(settings.rpc.max_coroutine, 50);
    assert_eq!(settings.rpc.rpc_expired, 7);
    assert!(!settings.rpc.log);

    let gate: Vec<_> = settings.module_instances("Gate", "development").collect();
    assert_eq!(gate.len(), 1);
    assert_eq!(gate[0].get_str("TCPAddr"), Some(":3563"));
}

#[test]
fn test_missing_file_is_read_error() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let err = Settings::load_from_file(&dir.path().join("absent.toml"))
        .expect_err("missing file must fail");
    assert!(matches!(err, ConfigError::Read { .. }), "unexpected error: {err}");
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let file = write_temp(".toml", "[rpc\nmax_coroutine = ");
    let err = Settings::load_from_file(file.path()).expect_err("malformed file must fail");
    assert!(matches!(err, ConfigError::Toml { .. }), "unexpected error: {err}");
}

#[test]
fn test_invalid_queue_depth_rejected() {
    let file = write_temp(".toml", "[network]\nwrite_loop_chan_num = 1\n");
    let err = Settings::load_from_file(file.path()).expect_err("queue depth 1 must fail");
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_save_then_load() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let path = dir.path().join("server.toml");

    let mut settings = Settings::default();
    settings.rpc.max_coroutine = 12;
    settings.save_to_file(&path).expect("save");

    let loaded = Settings::load_from_file(&path).expect("reload");
    assert_eq!(loaded, settings);
}
