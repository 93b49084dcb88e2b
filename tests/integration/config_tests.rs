use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use linkdupe::checksum::Algorithm;
use linkdupe::config::{Config, ENV_PREFIX};
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
symlink_folder = "/srv/pool"
checksum_algo = "fletcher32"
chunk_size = 4096
"#,
    )
    .unwrap();

    let figment =
        Figment::from(Serialized::defaults(Config::default())).merge(Toml::file(&config_path));
    let config = Config::extract(figment).unwrap();

    assert_eq!(config.symlink_folder, PathBuf::from("/srv/pool"));
    assert_eq!(config.algorithm().unwrap(), Algorithm::Fletcher32);
    assert_eq!(config.chunk_size, 4096);
}

#[test]
fn test_config_env_overrides_file() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "checksum_algo = \"fletcher16\"\n").unwrap();

    // Use a dedicated prefix so other tests are not affected
    std::env::set_var("LINKDUPE_TEST_CHECKSUM_ALGO", "adler32");
    let figment = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .merge(Env::prefixed("LINKDUPE_TEST_"));
    let config = Config::extract(figment).unwrap();
    std::env::remove_var("LINKDUPE_TEST_CHECKSUM_ALGO");

    assert_eq!(config.algorithm().unwrap(), Algorithm::Adler32);
    assert_eq!(ENV_PREFIX, "LINKDUPE_");
}

#[test]
fn test_config_missing_file_uses_defaults() {
    let temp_dir = tempdir().unwrap();
    let figment = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(temp_dir.path().join("absent.toml")));
    assert_eq!(Config::extract(figment).unwrap(), Config::default());
}

#[test]
fn test_config_invalid_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "chunk_size = \"big\"").unwrap();

    let figment =
        Figment::from(Serialized::defaults(Config::default())).merge(Toml::file(&config_path));
    assert!(Config::extract(figment).is_err());
}

#[test]
fn test_config_save_toml_roundtrip() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let config = Config {
        symlink_folder: PathBuf::from("pool"),
        checksum_algo: "fletcher64".to_string(),
        chunk_size: 1024,
    };
    fs::write(&config_path, toml::to_string_pretty(&config).unwrap()).unwrap();

    let saved = fs::read_to_string(&config_path).unwrap();
    assert!(saved.contains("checksum_algo = \"fletcher64\""));

    let figment =
        Figment::from(Serialized::defaults(Config::default())).merge(Toml::file(&config_path));
    assert_eq!(Config::extract(figment).unwrap(), config);
}
