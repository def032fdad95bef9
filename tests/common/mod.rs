use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Write a config file into a fresh temporary directory
#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Config pointing at `base_url` with an identity file inside `dir`
#[allow(dead_code)]
pub fn server_config(dir: &TempDir, base_url: &str) -> PathBuf {
    let identity = dir.path().join("identity.json");
    let config_path = dir.path().join("config.yaml");
    let contents = format!(
        "server:\n  base_url: {}\n  request_timeout_seconds: 5\nidentity:\n  path: {}\n",
        base_url,
        identity.display()
    );
    fs::write(&config_path, contents).expect("failed to write config file");
    config_path
}

/// Identity file with a fixed user
#[allow(dead_code)]
pub fn write_identity(dir: &TempDir, user_id: &str, username: &str) -> PathBuf {
    let path = dir.path().join("identity.json");
    let contents = serde_json::json!({
        "fgo_user_id": user_id,
        "fgo_username": username,
    });
    fs::write(&path, contents.to_string()).expect("failed to write identity file");
    path
}
