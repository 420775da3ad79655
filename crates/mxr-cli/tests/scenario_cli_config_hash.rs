use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

#[test]
fn config_hash_prints_hash_and_canonical_json() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(b"reconcile:\n  pool: \"ethermine\"\n  product: \"ETH-USD\"\n")
        .unwrap();

    Command::cargo_bin("mxr")
        .unwrap()
        .arg("config-hash")
        .arg(f.path())
        .assert()
        .success()
        .stdout(predicate::str::is_match("config_hash=[0-9a-f]{64}").unwrap())
        .stdout(predicate::str::contains(r#""pool":"ethermine""#));
}

#[test]
fn config_hash_rejects_literal_secret() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(b"exchange:\n  keys_env:\n    api_key: \"sk-live-0123456789abcdef\"\n")
        .unwrap();

    Command::cargo_bin("mxr")
        .unwrap()
        .arg("config-hash")
        .arg(f.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"))
        .stderr(predicate::str::contains("0123456789abcdef").not());
}

#[test]
fn config_hash_requires_a_path() {
    Command::cargo_bin("mxr")
        .unwrap()
        .arg("config-hash")
        .assert()
        .failure();
}
