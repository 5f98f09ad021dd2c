use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::path::Path;
use std::process::Command;

const CORPUS: &str = "situation,thought,reframe\n\
Exam,I will fail,One exam doesn't define you\n\
Job interview,I'm not good enough,You prepared well\n";

fn offline(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("reframe"));
    cmd.env_remove("REFRAME_API_KEY")
        .env_remove("OPENAI_API_KEY")
        .args(["--embed-mode", "stub", "--quiet"])
        .arg("--corpus")
        .arg(dir.join("corpus.csv"))
        .arg("--cache")
        .arg(dir.join("cache.bin"));
    cmd
}

#[test]
fn measure_runs_without_credentials() {
    let dir = tempfile::tempdir().unwrap();
    offline(dir.path())
        .args([
            "measure",
            "--reframe",
            "You can try to practice and plan next steps, and it's okay to feel upset, you are not worthless.",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"actionability\": 1.0"))
        .stdout(predicate::str::contains("\"empathy\": 0.667"))
        .stdout(predicate::str::contains("\"positivity\": 0.25"));
}

#[test]
fn index_builds_then_reuses_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("corpus.csv"), CORPUS).unwrap();

    offline(dir.path())
        .arg("index")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"rows\": 2"))
        .stdout(predicate::str::contains("\"outcome\": \"built\""));
    assert!(dir.path().join("cache.bin").exists());

    offline(dir.path())
        .arg("index")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"outcome\": \"hit\""));
}

#[test]
fn search_returns_k_cases() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("corpus.csv"), CORPUS).unwrap();

    let output = offline(dir.path())
        .args([
            "search",
            "--thought",
            "I'll never finish my project",
            "--situation",
            "My project failed",
            "-k",
            "2",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let cases: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(cases.len(), 2);
    assert!(cases.iter().all(|case| case["reframe"].is_string()));
}

#[test]
fn search_rejects_k_above_corpus_size() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("corpus.csv"), CORPUS).unwrap();

    offline(dir.path())
        .args(["search", "--thought", "t", "--situation", "s", "-k", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid argument"));
}
