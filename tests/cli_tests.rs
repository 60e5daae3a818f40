use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SECRET: &str = "cli-test-server-secret-value";

// Point the binary at a throwaway vault with cheap key derivation
fn set_up_vault() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("config.json"),
        r#"{
  "institution_name": "CLI Test School",
  "key_derivation": { "memory_cost": 1024, "time_cost": 1, "parallelism": 1 }
}"#,
    )
    .unwrap();
    fs::create_dir_all(temp.path().join("uploads")).unwrap();
    fs::write(temp.path().join("uploads").join("logo.png"), b"0123456789").unwrap();
    temp
}

fn command(vault: &Path) -> Command {
    let mut cmd = Command::cargo_bin("rollcall-vault").unwrap();
    cmd.env_clear()
        .env("HOME", vault)
        .env("ROLLCALL_VAULT_DIR", vault)
        .env("ROLLCALL_BACKUP_SECRET", SECRET)
        .env("BACKUP_PASSWORD", "Str0ngPass!");
    cmd
}

fn create_backup(vault: &Path, out: &Path) {
    command(vault)
        .args(["backup", "create", "--password-env", "BACKUP_PASSWORD", "--out"])
        .arg(out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup created"));
}

#[test]
fn test_cli_no_args() {
    let vault = set_up_vault();
    command(vault.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("rollcall-vault --help"));
}

#[test]
fn test_cli_config_hides_secret() {
    let vault = set_up_vault();
    command(vault.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("CLI Test School"))
        .stdout(predicate::str::contains("configured"))
        .stdout(predicate::str::contains(SECRET).not());
}

#[test]
fn test_cli_create_and_info() {
    let vault = set_up_vault();
    let out = vault.path().join("exported.json");
    create_backup(vault.path(), &out);

    command(vault.path())
        .args(["backup", "info"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("rollcall-backup/1"))
        .stdout(predicate::str::contains("CLI Test School"));
}

#[test]
fn test_cli_create_without_secret_fails() {
    let vault = set_up_vault();
    command(vault.path())
        .env_remove("ROLLCALL_BACKUP_SECRET")
        .args(["backup", "create", "--password-env", "BACKUP_PASSWORD"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ROLLCALL_BACKUP_SECRET"));
}

#[test]
fn test_cli_restore_requires_force() {
    let vault = set_up_vault();
    let out = vault.path().join("exported.json");
    create_backup(vault.path(), &out);

    command(vault.path())
        .args(["backup", "restore"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("--force"));
}

#[test]
fn test_cli_restore_round_trip() {
    let vault = set_up_vault();
    let out = vault.path().join("exported.json");
    create_backup(vault.path(), &out);

    let logo = vault.path().join("uploads").join("logo.png");
    fs::remove_file(&logo).unwrap();

    command(vault.path())
        .args(["backup", "restore", "--force", "--password-env", "BACKUP_PASSWORD"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Restart the application"));

    assert_eq!(fs::read(&logo).unwrap(), b"0123456789");

    command(vault.path())
        .args(["backup", "history"])
        .assert()
        .success()
        .stdout(predicate::str::contains("RESTORE"))
        .stdout(predicate::str::contains("BACKUP"));
}

#[test]
fn test_cli_restore_wrong_password() {
    let vault = set_up_vault();
    let out = vault.path().join("exported.json");
    create_backup(vault.path(), &out);

    command(vault.path())
        .env("BACKUP_PASSWORD", "Wr0ngPassword")
        .args(["backup", "restore", "--force", "--password-env", "BACKUP_PASSWORD"])
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not be opened"));
}

#[test]
fn test_cli_info_rejects_garbage() {
    let vault = set_up_vault();
    let bogus = vault.path().join("bogus.json");
    fs::write(&bogus, b"{\"version\": \"rollcall-backup/1\"}").unwrap();

    command(vault.path())
        .args(["backup", "info"])
        .arg(&bogus)
        .assert()
        .failure();
}
