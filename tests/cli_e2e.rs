//! End-to-end tests for the chatvault binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const EXPORT: &str = r##"<html><body>
<h3>Alice</h3>
<p class="date"><font color="#b4b4b4">2025/04/13 21:06</font></p>
<p class="triangle-isosceles"><font>Bonjour!</font></p>
</body></html>"##;

fn chatvault() -> Command {
    Command::cargo_bin("chatvault").unwrap()
}

#[test]
fn no_arguments_reports_config_error() {
    chatvault()
        .assert()
        .failure()
        .stderr(predicate::str::contains("provide --config"));
}

#[test]
fn runs_with_directory_flags() {
    let dir = TempDir::new().unwrap();
    let html_dir = dir.path().join("html");
    let media_dir = dir.path().join("media");
    let out_dir = dir.path().join("out");
    std::fs::create_dir_all(&html_dir).unwrap();
    std::fs::create_dir_all(&media_dir).unwrap();
    std::fs::write(html_dir.join("alice.html"), EXPORT).unwrap();

    chatvault()
        .arg("--html-dir")
        .arg(&html_dir)
        .arg("--media-dir")
        .arg(&media_dir)
        .arg("--output-dir")
        .arg(&out_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Success rate:   100.0%"));

    assert!(out_dir.join("Alice/Alice_conversation.txt").exists());
    assert!(out_dir.join(".chatvault_registry.json").exists());
}

#[test]
fn runs_from_settings_file() {
    let dir = TempDir::new().unwrap();
    let html_dir = dir.path().join("html");
    std::fs::create_dir_all(&html_dir).unwrap();
    std::fs::write(html_dir.join("alice.html"), EXPORT).unwrap();
    std::fs::create_dir_all(dir.path().join("media")).unwrap();

    let config = dir.path().join("chatvault.toml");
    std::fs::write(
        &config,
        format!(
            "[paths]\nhtml_dir = {:?}\nmedia_dir = {:?}\noutput_dir = {:?}\n",
            html_dir,
            dir.path().join("media"),
            dir.path().join("out"),
        ),
    )
    .unwrap();

    chatvault()
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 parsed"));
}

#[test]
fn missing_settings_file_fails() {
    chatvault()
        .arg("--config")
        .arg("/no/such/chatvault.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}
