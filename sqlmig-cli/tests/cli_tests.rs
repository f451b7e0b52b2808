//! Integration tests for the sqlmig CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get the sqlmig binary
#[allow(deprecated)]
fn sqlmig_cmd() -> Command {
    let mut cmd = Command::cargo_bin("sqlmig").unwrap();
    cmd.env_remove("SQLMIG_CONFIG").env_remove("RUST_LOG");
    cmd
}

/// A solution whose only project does not reference the migrations package
fn solution_without_migration_projects() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("App.sln"), "").unwrap();

    let project = dir.path().join("src").join("Web");
    fs::create_dir_all(&project).unwrap();
    fs::write(
        project.join("Web.csproj"),
        r#"<Project Sdk="Microsoft.NET.Sdk.Web">
  <ItemGroup>
    <PackageReference Include="Serilog" Version="4.0.0" />
  </ItemGroup>
</Project>
"#,
    )
    .unwrap();

    dir
}

#[test]
fn test_help_command() {
    sqlmig_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Schema migrations across a whole solution"))
        .stdout(predicate::str::contains("scan"))
        .stdout(predicate::str::contains("pending"))
        .stdout(predicate::str::contains("apply"))
        .stdout(predicate::str::contains("reset-migrations"));
}

#[test]
fn test_version_command() {
    sqlmig_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("Version"))
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_add_help() {
    sqlmig_cmd()
        .args(["add", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--context"))
        .stdout(predicate::str::contains("--name"))
        .stdout(predicate::str::contains("--output-dir"));
}

#[test]
fn test_scan_without_solution() {
    let dir = TempDir::new().unwrap();

    sqlmig_cmd()
        .current_dir(dir.path())
        .arg("scan")
        .assert()
        .success()
        .stdout(predicate::str::contains("No solution manifest found"));
}

#[test]
fn test_scan_solution_without_migration_projects() {
    let dir = solution_without_migration_projects();

    sqlmig_cmd()
        .current_dir(dir.path())
        .arg("scan")
        .assert()
        .success()
        .stdout(predicate::str::contains("App.sln"))
        .stdout(predicate::str::contains("(no migration projects)"));
}

#[test]
fn test_scan_json() {
    let dir = solution_without_migration_projects();

    let output = sqlmig_cmd()
        .current_dir(dir.path())
        .args(["scan", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let solution: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(solution["projects"], serde_json::json!([]));
    assert!(solution["manifest"].as_str().unwrap().ends_with("App.sln"));
}

#[test]
fn test_scan_from_nested_directory() {
    let dir = solution_without_migration_projects();

    sqlmig_cmd()
        .current_dir(dir.path())
        .args(["scan", "src/Web"])
        .assert()
        .success()
        .stdout(predicate::str::contains("App.sln"));
}

#[test]
fn test_pending_no_build_without_solution() {
    let dir = TempDir::new().unwrap();

    sqlmig_cmd()
        .current_dir(dir.path())
        .args(["pending", "--no-build"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No solution manifest found"));
}

#[test]
fn test_build_without_solution_fails() {
    let dir = TempDir::new().unwrap();

    sqlmig_cmd()
        .current_dir(dir.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No solution found"));
}

#[test]
fn test_add_context_requires_name() {
    let dir = TempDir::new().unwrap();

    sqlmig_cmd()
        .current_dir(dir.path())
        .args(["add", "--context", "AppDbContext"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--name is required"));
}

#[test]
fn test_unknown_context_fails() {
    let dir = solution_without_migration_projects();

    sqlmig_cmd()
        .current_dir(dir.path())
        .args(["drop", "--context", "MissingDbContext", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown context 'MissingDbContext'"));
}

#[test]
fn test_apply_without_contexts() {
    let dir = solution_without_migration_projects();

    sqlmig_cmd()
        .current_dir(dir.path())
        .args(["apply", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No schema contexts found"));
}

#[test]
fn test_invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("sqlmig.toml");
    fs::write(&config, "[scanner\nproject_markers = 1").unwrap();

    sqlmig_cmd()
        .current_dir(dir.path())
        .arg("scan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_explicit_config_missing() {
    let dir = TempDir::new().unwrap();

    sqlmig_cmd()
        .current_dir(dir.path())
        .args(["--config", "nowhere.toml", "scan"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot read"));
}

#[test]
fn test_config_from_environment() {
    let dir = solution_without_migration_projects();
    let config = dir.path().join("custom.toml");
    fs::write(&config, "[scanner]\nproject_markers = [\"Serilog\"]\n").unwrap();

    // The Web project now counts as a migration project but has no build output.
    sqlmig_cmd()
        .current_dir(dir.path())
        .env("SQLMIG_CONFIG", &config)
        .arg("scan")
        .assert()
        .success()
        .stdout(predicate::str::contains("(no migration projects)"));
}

#[cfg(unix)]
mod interrupt {
    use super::*;
    use std::io::Read;
    use std::process::{Command as StdCommand, Stdio};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    const HELPER_SCRIPT: &str = r#"
while IFS= read -r line; do
  case "$line" in
    *'"op":"load"'*)
      echo '{"status":"loaded","module":"Data"}' ;;
    *'"op":"describe"'*)
      echo '{"status":"types","types":[{"full_name":"Data.TestDbContextFactory","is_class":true,"interfaces":[{"name":"Microsoft.EntityFrameworkCore.Design.IDesignTimeDbContextFactory`1","type_arguments":["Data.TestDbContext"]}]}]}' ;;
    *'"op":"inspect"'*)
      echo '{"status":"context","context_type":"Data.TestDbContext","migrations":["20251213102558_AddFirstName"],"applied":["20251213102558_AddFirstName"],"pending":[]}' ;;
    *'"op":"shutdown"'*)
      echo '{"status":"ack"}'
      exit 0 ;;
    *)
      echo '{"status":"error","message":"unsupported"}' ;;
  esac
done
"#;

    /// A solution with one migration project whose helper reports one applied migration
    fn solution_with_context() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("App.sln"), "").unwrap();

        let project = dir.path().join("src").join("Data");
        let out = project.join("bin").join("Debug").join("net9.0");
        fs::create_dir_all(&out).unwrap();
        fs::write(
            project.join("Data.csproj"),
            r#"<Project Sdk="Microsoft.NET.Sdk">
  <ItemGroup>
    <PackageReference Include="Nabs.Launchpad.Core.DataMigrations" Version="1.0.0" />
  </ItemGroup>
</Project>
"#,
        )
        .unwrap();
        fs::write(out.join("Data.dll"), b"MZ").unwrap();
        fs::write(
            out.join("Data.deps.json"),
            r#"{
  "runtimeTarget": { "name": ".NETCoreApp,Version=v9.0" },
  "targets": {
    ".NETCoreApp,Version=v9.0": {
      "Data/1.0.0": { "runtime": { "Data.dll": {} } }
    }
  }
}"#,
        )
        .unwrap();

        let script = dir.path().join("helper.sh");
        fs::write(&script, HELPER_SCRIPT).unwrap();
        fs::write(
            dir.path().join("sqlmig.toml"),
            format!(
                "[scanner.loader]\nprobe_command = [\"sh\", '{}']\ncollectible = true\n",
                script.display()
            ),
        )
        .unwrap();

        dir
    }

    fn wait_for(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let started = Instant::now();
        while started.elapsed() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(50));
        }
        false
    }

    #[test]
    fn test_interrupt_at_confirmation_exits() {
        let dir = solution_with_context();

        let mut child = StdCommand::new(env!("CARGO_BIN_EXE_sqlmig"))
            .current_dir(dir.path())
            .env_remove("SQLMIG_CONFIG")
            .env_remove("RUST_LOG")
            .arg("remove")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();

        // Keep stdin open so the prompt blocks.
        let _stdin = child.stdin.take().unwrap();

        let seen = Arc::new(Mutex::new(String::new()));
        let mut stdout = child.stdout.take().unwrap();
        let sink = Arc::clone(&seen);
        thread::spawn(move || {
            let mut buf = [0u8; 256];
            while let Ok(n) = stdout.read(&mut buf) {
                if n == 0 {
                    break;
                }
                sink.lock().unwrap().push_str(&String::from_utf8_lossy(&buf[..n]));
            }
        });

        let prompted = wait_for(Duration::from_secs(30), || {
            seen.lock().unwrap().contains("Remove migration AddFirstName from TestDbContext?")
        });
        if !prompted {
            let _ = child.kill();
            panic!("no confirmation prompt, output: {}", seen.lock().unwrap());
        }

        let sent = StdCommand::new("kill")
            .args(["-INT", &child.id().to_string()])
            .status()
            .unwrap();
        assert!(sent.success());

        let mut status = None;
        let exited = wait_for(Duration::from_secs(10), || {
            status = child.try_wait().unwrap();
            status.is_some()
        });
        if !exited {
            let _ = child.kill();
            panic!("still running after Ctrl-C at the prompt");
        }

        assert_eq!(status.unwrap().code(), Some(130));
    }
}
