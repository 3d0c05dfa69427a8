use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ragr_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ragr");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let docs = root.join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(
        docs.join("onboarding.md"),
        "# Onboarding\n\nNew hires receive a laptop on their first day.\n\nBadges are collected from reception.",
    )
    .unwrap();
    fs::write(
        docs.join("travel.txt"),
        "Travel policy.\n\nEconomy class is required for flights under six hours.",
    )
    .unwrap();

    fs::create_dir_all(root.join("config")).unwrap();
    let config_path = root.join("config/ragr.toml");
    fs::write(
        &config_path,
        format!(
            r#"[db]
path = "{root}/data/ragr.sqlite"

[knowledge]
root = "{root}/docs"

[web_search]
provider = "disabled"
"#,
            root = root.display()
        ),
    )
    .unwrap();

    (tmp, config_path)
}

fn run_ragr(config: &Path, args: &[&str]) -> std::process::Output {
    Command::new(ragr_binary())
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("OPENAI_API_KEY")
        .env_remove("GOOGLE_API_KEY")
        .env_remove("TAVILY_API_KEY")
        .output()
        .expect("failed to run ragr")
}

#[test]
fn test_init_is_idempotent() {
    let (_tmp, config) = setup_test_env();

    for _ in 0..2 {
        let output = run_ragr(&config, &["init"]);
        assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
        assert!(String::from_utf8_lossy(&output.stdout).contains("Database initialized successfully."));
    }
}

#[test]
fn test_ingest_and_search() {
    let (_tmp, config) = setup_test_env();

    let output = run_ragr(&config, &["ingest"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("upserted documents: 2"), "stdout: {}", stdout);
    assert!(stdout.trim_end().ends_with("ok"));

    let output = run_ragr(&config, &["search", "laptop", "--k", "1"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("first day"), "stdout: {}", stdout);
    assert!(!stdout.contains("Economy"));

    let output = run_ragr(&config, &["search", "submarine"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No results."));
}

#[test]
fn test_ingest_creates_missing_folder() {
    let (tmp, config) = setup_test_env();
    fs::remove_dir_all(tmp.path().join("docs")).unwrap();

    let output = run_ragr(&config, &["ingest"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("created empty folder"));
    assert!(tmp.path().join("docs").is_dir());
}

#[test]
fn test_ask_reports_missing_keys() {
    let (_tmp, config) = setup_test_env();

    let output = run_ragr(&config, &["ask", "hello"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("OPENAI_API_KEY"), "stderr: {}", stderr);
    assert!(!stderr.contains("TAVILY_API_KEY"));
}

#[test]
fn test_missing_config_fails() {
    let output = run_ragr(Path::new("/nonexistent/ragr.toml"), &["init"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to read config file"));
}
