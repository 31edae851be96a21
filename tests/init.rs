use std::process::Command;

#[test]
fn init_creates_valid_toml() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_tessera"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(output.status.success(), "tessera init failed: {}", String::from_utf8_lossy(&output.stderr));

    let config_path = dir.path().join(".tessera.toml");
    assert!(config_path.exists(), ".tessera.toml should exist");

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[retrieval]"));
    assert!(content.contains("[embedding]"));

    // Every option is commented out, so the file parses to defaults
    let config: tessera_core::TesseraConfig = toml::from_str(&content).unwrap();
    assert_eq!(config.retrieval.chunk_max_tokens, 500);
    assert_eq!(config.llm.model, "mistral:latest");
}

#[test]
fn init_refuses_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".tessera.toml"), "# existing").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_tessera"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
}

#[test]
fn init_reset_creates_sqlite_collection() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(".tessera.toml"),
        "[embedding]\ndimensions = 4\n",
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_tessera"))
        .args(["init", "--reset"])
        .current_dir(dir.path())
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(dir.path().join(".tessera/index.db").exists());

    let output = Command::new(env!("CARGO_BIN_EXE_tessera"))
        .args(["status", "--format", "json"])
        .current_dir(dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["dimension"], 4);
    assert_eq!(stats["totalPoints"], 0);
}
