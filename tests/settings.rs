use std::fs;
use std::path::PathBuf;

use optab::OptabError;
use optab::logging;
use optab::settings::Settings;

fn settings_file(name: &str, content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("optab-{}-{}.toml", name, std::process::id()));
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn defaults_without_a_file() {
    let settings = Settings::default();
    assert_eq!(settings.log_filter, "info");
    assert_eq!(settings.indent, 2);
    assert!(settings.hex_ieee_doubles);
    assert_eq!(settings.database, None);
    assert_eq!(Settings::load(None).unwrap(), settings);
}

#[test]
fn file_overrides_defaults() {
    let path = settings_file("override", "indent = 4\nhex_ieee_doubles = false\ndatabase = \"model.db\"\n");
    let settings = Settings::load(path.to_str()).unwrap();
    fs::remove_file(&path).ok();
    assert_eq!(settings.indent, 4);
    assert!(!settings.hex_ieee_doubles);
    assert_eq!(settings.database.as_deref(), Some("model.db"));
    assert_eq!(settings.log_filter, "info");
}

#[test]
fn missing_file_is_a_config_error() {
    let err = Settings::load(Some("/nonexistent/optab-settings.toml")).unwrap_err();
    assert!(matches!(err, OptabError::Config(_)));
}

#[test]
fn malformed_value_is_a_config_error() {
    let path = settings_file("malformed", "indent = \"wide\"\n");
    let result = Settings::load(path.to_str());
    fs::remove_file(&path).ok();
    assert!(matches!(result.unwrap_err(), OptabError::Config(_)));
}

#[test]
fn logging_can_be_initialized_twice() {
    let settings = Settings { log_filter: String::from("optab=debug"), ..Settings::default() };
    logging::init(&settings).unwrap();
    logging::init(&settings).unwrap();
}
