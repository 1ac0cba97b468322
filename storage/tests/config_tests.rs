use std::path::PathBuf;
use storage::config::{DatabaseConfig, DatabaseLocation, DEFAULT_DATABASE_URL};

#[test]
fn test_default_url_is_relative_file() {
    let config = DatabaseConfig::from_url(DEFAULT_DATABASE_URL).unwrap();
    assert_eq!(
        config.location,
        DatabaseLocation::File(PathBuf::from("sentiment_predictions.db"))
    );
    assert!(config.validate().is_ok());
}

#[test]
fn test_absolute_and_bare_paths() {
    let config = DatabaseConfig::from_url("sqlite:////var/lib/sentiment/db.sqlite").unwrap();
    assert_eq!(
        config.location,
        DatabaseLocation::File(PathBuf::from("/var/lib/sentiment/db.sqlite"))
    );

    let config = DatabaseConfig::from_url("predictions.db").unwrap();
    assert_eq!(
        config.location,
        DatabaseLocation::File(PathBuf::from("predictions.db"))
    );
}

#[test]
fn test_in_memory_forms() {
    for url in [":memory:", "sqlite://:memory:", "sqlite:///:memory:"] {
        let config = DatabaseConfig::from_url(url).unwrap();
        assert_eq!(config.location, DatabaseLocation::InMemory, "{url}");
    }
}

#[test]
fn test_rejects_other_schemes_and_empty_paths() {
    assert!(DatabaseConfig::from_url("postgres://localhost/db").is_err());
    assert!(DatabaseConfig::from_url("sqlite:///").is_err());
    assert!(DatabaseConfig::from_url("   ").is_err());
}

#[test]
fn test_directory_is_not_a_database() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig::file(dir.path());
    assert!(config.validate().is_err());
}

fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
    move |key| {
        vars.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    }
}

#[test]
fn test_lookup_defaults_and_overrides() {
    let config = DatabaseConfig::from_lookup(lookup(&[])).unwrap();
    assert_eq!(
        config.location,
        DatabaseLocation::File(PathBuf::from("sentiment_predictions.db"))
    );
    assert_eq!(config.busy_timeout_ms, 5_000);

    let config = DatabaseConfig::from_lookup(lookup(&[
        ("DATABASE_URL", ":memory:"),
        ("DATABASE_BUSY_TIMEOUT_MS", " 250 "),
    ]))
    .unwrap();
    assert_eq!(config.location, DatabaseLocation::InMemory);
    assert_eq!(config.busy_timeout_ms, 250);

    let config = DatabaseConfig::from_lookup(lookup(&[("DATABASE_URL", "  ")])).unwrap();
    assert_eq!(
        config.location,
        DatabaseLocation::File(PathBuf::from("sentiment_predictions.db"))
    );
}

#[test]
fn test_lookup_rejects_bad_timeout() {
    assert!(DatabaseConfig::from_lookup(lookup(&[("DATABASE_BUSY_TIMEOUT_MS", "soon")])).is_err());
}
