use assert_cmd::Command;
use predicates::prelude::*;

fn threadscope() -> Command {
    Command::cargo_bin("threadscope").expect("binary built")
}

#[test]
fn prints_version() {
    threadscope()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    threadscope()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("threadscope"))
        .stdout(predicate::str::contains("--sort"));
}

#[test]
fn rejects_unsupported_video_host() {
    threadscope()
        .arg("https://example.com/watch?v=abc")
        .env("THREADSCOPE_API__BASE_URL", "http://127.0.0.1:9/")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unsupported host"));
}

#[test]
fn requires_a_video() {
    threadscope()
        .assert()
        .failure()
        .stderr(predicate::str::contains("no video given"));
}

#[test]
fn rejects_unknown_sort() {
    threadscope()
        .args(["--sort", "hot", "abc123"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown sort"));
}
