#![allow(dead_code)]

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::TempDir;

pub const REALM: &str = "acme";
pub const ADMIN_EMAIL: &str = "ada@acme.test";

/// Runs the `ptrack` binary against a throwaway database, acting as the
/// realm admin unless told otherwise.
pub struct CliTestHarness {
    temp_dir: TempDir,
    db_path: PathBuf,
}

impl CliTestHarness {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("ptrack.db");
        Self { temp_dir, db_path }
    }

    /// A harness whose realm and admin already exist.
    pub fn bootstrapped() -> Self {
        let harness = Self::new();
        harness.run_success(&[
            "realm",
            "create",
            REALM,
            "--admin-email",
            ADMIN_EMAIL,
            "--admin-name",
            "Ada Lovelace",
        ]);
        harness
    }

    /// A `ptrack` command with no realm or user configured.
    pub fn bare_command(&self) -> Command {
        let mut cmd = Command::cargo_bin("ptrack").expect("Failed to find ptrack binary");
        cmd.current_dir(self.temp_dir.path())
            .env("PTRACK_DATABASE_PATH", &self.db_path)
            .env_remove("PTRACK_REALM")
            .env_remove("PTRACK_USER_EMAIL")
            .env_remove("RUST_LOG");
        cmd
    }

    pub fn command(&self) -> Command {
        self.command_as(ADMIN_EMAIL)
    }

    pub fn command_as(&self, email: &str) -> Command {
        let mut cmd = self.bare_command();
        cmd.env("PTRACK_REALM", REALM).env("PTRACK_USER_EMAIL", email);
        cmd
    }

    pub fn run_success(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().success()
    }

    pub fn run_failure(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.command().args(args).assert().failure()
    }

    pub fn stdout(&self, args: &[&str]) -> String {
        let output = self.run_success(args).get_output().stdout.clone();
        String::from_utf8(output).expect("stdout is not UTF-8")
    }

    /// Runs a create command and returns the short id from its
    /// "Created <kind> <id> ..." confirmation.
    pub fn create(&self, args: &[&str]) -> String {
        let out = self.stdout(args);
        extract_short_id(&out).unwrap_or_else(|| panic!("no id in output: {out}"))
    }
}

/// The first eight-character hex word after "Created " or "Added ".
pub fn extract_short_id(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let rest = line
            .split_once("Created ")
            .or_else(|| line.split_once("Added "))?
            .1;
        rest.split_whitespace()
            .find(|w| w.len() == 8 && w.chars().all(|c| c.is_ascii_hexdigit()))
            .map(str::to_string)
    })
}
