use super::*;
use std::fs;
use tempfile::tempdir;

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("config.yaml");
    fs::write(&path, body).expect("Failed to write config file");
    path
}

#[test]
fn test_default_config() {
    let config = AppConfig::default();

    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8087);
    assert_eq!(config.api.version, "v1");
    assert_eq!(config.api.docs_path, "/docs");
    assert!(config.api.enable_docs);
    assert_eq!(config.api.body_limit_bytes, 16 * 1024 * 1024);
    assert!(config.api.auth_tokens.is_empty());

    let logging = config.logging.as_ref().unwrap();
    assert_eq!(logging["default"].console_level, "info");
    assert_eq!(logging["default"].file, "logs/billing-server.log");
}

#[test]
fn test_yaml_serialization() {
    let yaml = AppConfig::default().to_yaml().expect("Failed to serialize to YAML");
    assert!(yaml.contains("server:"));
    assert!(yaml.contains("logging:"));
    assert!(yaml.contains("api:"));
    assert!(yaml.contains("docs_path: /docs"));
}

#[test]
fn test_layered_loading_yaml_only() {
    let tmp = tempdir().unwrap();
    let home = tmp.path().join("home");
    let yaml = format!(
        r#"
server:
  host: "0.0.0.0"
  port: 9999
  home_dir: "{}"

logging:
  default:
    console_level: warn
    file: ""
  contractkit:
    console_level: debug
    file: logs/contractkit.log
    file_level: trace

api:
  version: v2
  enable_docs: false
  cors:
    allowed_origins: ["https://app.example"]
  auth_tokens:
    clerk-token:
      subject: clerk
      roles: [clerk]
      permissions: [billing.read]
"#,
        home.display()
    );
    let path = write_config(tmp.path(), &yaml);

    let config = AppConfig::load_layered(&path).expect("Failed to load config");

    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 9999);
    assert_eq!(config.server.home_dir, home.to_string_lossy());
    assert!(home.is_dir());

    let logging = config.logging.as_ref().unwrap();
    assert_eq!(logging["default"].console_level, "warn");
    assert_eq!(logging["contractkit"].file_level, "trace");

    assert_eq!(config.api.version, "v2");
    assert!(!config.api.enable_docs);
    // Untouched api keys keep their defaults.
    assert_eq!(config.api.docs_path, "/docs");
    assert_eq!(config.api.cors.allowed_origins, vec!["https://app.example"]);
    let clerk = &config.api.auth_tokens["clerk-token"];
    assert_eq!(clerk.subject, "clerk");
    assert_eq!(clerk.permissions, vec!["billing.read"]);
}

#[test]
fn test_logging_stays_unset_when_not_configured() {
    let tmp = tempdir().unwrap();
    let yaml = format!(
        "server:\n  home_dir: \"{}\"\n",
        tmp.path().join("home").display()
    );
    let path = write_config(tmp.path(), &yaml);

    let config = AppConfig::load_layered(&path).unwrap();
    assert!(config.logging.is_none());
    assert_eq!(config.server.port, 8087);
}

#[test]
fn test_unknown_keys_are_rejected() {
    let tmp = tempdir().unwrap();
    let yaml = format!(
        "server:\n  home_dir: \"{}\"\n  color: blue\n",
        tmp.path().join("home").display()
    );
    let path = write_config(tmp.path(), &yaml);

    let err = AppConfig::load_layered(&path).unwrap_err();
    assert!(format!("{err:#}").contains("color"), "{err:#}");
}

#[test]
fn test_relative_home_dir_fails() {
    let tmp = tempdir().unwrap();
    let path = write_config(tmp.path(), "server:\n  home_dir: relative/home\n");

    let err = AppConfig::load_layered(&path).unwrap_err();
    assert!(format!("{err:#}").contains("home_dir"), "{err:#}");
}

#[test]
fn test_cli_overrides() {
    let mut config = AppConfig::default();
    let args = CliArgs {
        port: Some(3000),
        verbose: 1,
        ..CliArgs::default()
    };
    config.apply_cli_overrides(&args);
    assert_eq!(config.server.port, 3000);
    assert_eq!(config.logging.as_ref().unwrap()["default"].console_level, "debug");

    config.apply_cli_overrides(&CliArgs {
        verbose: 3,
        ..CliArgs::default()
    });
    assert_eq!(config.server.port, 3000);
    assert_eq!(config.logging.as_ref().unwrap()["default"].console_level, "trace");
}

#[test]
fn test_cli_overrides_create_logging_when_missing() {
    let mut config = AppConfig {
        logging: None,
        ..AppConfig::default()
    };
    config.apply_cli_overrides(&CliArgs::default());
    let logging = config.logging.unwrap();
    assert_eq!(logging["default"].console_level, "info");
}

#[test]
fn test_bind_addr() {
    let config = AppConfig::default();
    assert_eq!(config.bind_addr(), "127.0.0.1:8087");
}
