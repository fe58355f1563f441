use std::process::Command;

#[test]
fn init_creates_valid_toml() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_todone"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "todone init failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let config_path = dir.path().join("todone.toml");
    assert!(config_path.exists(), "todone.toml should exist");

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[llm]"));
    assert!(content.contains("[search]"));
    assert!(content.contains("[enrich]"));

    let config: todone_core::TodoneConfig = toml::from_str(&content).unwrap();
    config.validate().unwrap();
    assert!(config.repos.is_empty());
    assert_eq!(config.enrich.concurrency, 8);
    assert_eq!(config.search.context_lines, 5);
}

#[test]
fn init_refuses_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("todone.toml"), "# existing").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_todone"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    let content = std::fs::read_to_string(dir.path().join("todone.toml")).unwrap();
    assert_eq!(content, "# existing");
}
