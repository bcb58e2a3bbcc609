//! End-to-end CLI behaviour against the in-memory stub provider.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use rstest::{fixture, rstest};
use tempfile::TempDir;

/// Isolated home directory holding an SSH key pair and a provider key file.
struct Workspace {
    home: TempDir,
}

impl Workspace {
    fn path(&self) -> &Path {
        self.home.path()
    }

    fn credential_file(&self) -> PathBuf {
        self.path().join("provider.pem")
    }

    fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, body).expect("write script");
        path
    }

    fn command(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("flotilla");
        cmd.current_dir(self.path())
            .env("HOME", self.path())
            .env("USER", "tester")
            .env("RUST_LOG", "off")
            .env_remove("FLOTILLA_CONFIG_PATH")
            .env_remove("FLOTILLA_LOGIN_USER")
            .env_remove("FLOTILLA_LOGIN_PASSWORD")
            .env_remove("FLOTILLA_PRIVATE_KEY_PATH")
            .env_remove("XDG_CONFIG_HOME");
        cmd
    }

    fn stub(&self, action: &str) -> Command {
        let mut cmd = self.command();
        cmd.arg("stub")
            .arg("tester")
            .arg(self.credential_file())
            .arg("web")
            .arg(action);
        cmd
    }
}

#[fixture]
fn workspace() -> Workspace {
    let home = TempDir::new().expect("tempdir");
    let ssh = home.path().join(".ssh");
    fs::create_dir_all(&ssh).expect("ssh dir");
    fs::write(ssh.join("id_rsa"), "-----BEGIN KEY-----\n").expect("private key");
    fs::write(ssh.join("id_rsa.pub"), "ssh-rsa AAAA tester\n").expect("public key");
    fs::write(home.path().join("provider.pem"), "provider-secret\n").expect("credential");
    Workspace { home }
}

#[rstest]
fn listnodes_on_an_empty_provider_reports_zero(workspace: Workspace) {
    workspace
        .stub("listnodes")
        .assert()
        .success()
        .stdout(">> No of nodes/instances 0\n");
}

#[rstest]
fn action_names_are_case_insensitive(workspace: Workspace) {
    workspace
        .stub("ListImages")
        .assert()
        .success()
        .stdout(
            predicate::str::starts_with(">> No of images 1\n")
                .and(predicate::str::contains(">>>>  ")),
        );
}

#[rstest]
fn unknown_provider_fails_before_anything_else(workspace: Workspace) {
    workspace
        .command()
        .args(["aws-ec2", "tester", "/does/not/exist", "web", "listnodes"])
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains(
            "provider aws-ec2 not in supported list",
        ));
}

#[rstest]
fn exec_without_a_command_fails(workspace: Workspace) {
    workspace
        .stub("exec")
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains(
            "please quote the command to exec as the last parameter",
        ));
}

#[rstest]
fn run_with_a_missing_script_fails(workspace: Workspace) {
    workspace
        .stub("run")
        .arg("missing.sh")
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains("file must exist!"));
}

#[rstest]
fn unknown_actions_fail(workspace: Workspace) {
    workspace
        .stub("reboot")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("reboot"));
}

#[rstest]
fn unreadable_provider_credential_fails(workspace: Workspace) {
    workspace
        .command()
        .args(["stub", "tester", "/does/not/exist.pem", "web", "listnodes"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error reading private key from"));
}

#[rstest]
fn add_creates_one_node_and_runs_the_install_script(workspace: Workspace) {
    workspace
        .stub("add")
        .assert()
        .success()
        .stdout(
            predicate::str::contains(">> adding node to group web")
                .and(predicate::str::contains(
                    "<< node stub-1: [10.0.0.1, 198.18.0.1]",
                ))
                .and(predicate::str::contains("exit status 0")),
        );
}

#[rstest]
fn add_without_a_login_key_fails(workspace: Workspace) {
    fs::remove_file(workspace.path().join(".ssh/id_rsa")).expect("remove key");
    workspace
        .stub("add")
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains("id_rsa"));
}

#[rstest]
fn exec_on_an_empty_group_succeeds(workspace: Workspace) {
    workspace
        .stub("exec")
        .arg("uptime")
        .assert()
        .success()
        .stdout(">> running [uptime] on group web as tester\n");
}

#[rstest]
fn run_announces_the_script_and_user(workspace: Workspace) {
    let script = workspace.script("deploy.sh", "echo deployed\n");
    workspace
        .stub("run")
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            ">> running [{}] on group web as tester",
            script.display()
        )));
}

#[rstest]
fn turnoff_alias_runs_power_off(workspace: Workspace) {
    let script = workspace.script("drain.sh", "echo draining\n");
    workspace
        .stub("turnoff")
        .arg(&script)
        .assert()
        .success()
        .stdout(
            predicate::str::contains(">> turn off nodes in group web")
                .and(predicate::str::contains("<< turnoff nodes []")),
        );
}

#[rstest]
fn destroy_on_an_empty_group_succeeds(workspace: Workspace) {
    workspace
        .stub("destroy")
        .assert()
        .success()
        .stdout(">> destroying nodes in group web\n<< destroyed nodes []\n");
}

#[rstest]
fn run_accepts_a_script_in_the_parent_directory(workspace: Workspace) {
    workspace.script("deploy.sh", "echo deployed\n");
    let jobs = workspace.path().join("jobs");
    fs::create_dir_all(&jobs).expect("jobs dir");
    workspace
        .stub("run")
        .arg("../deploy.sh")
        .current_dir(&jobs)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            ">> running [../deploy.sh] on group web as tester",
        ));
}

#[cfg(unix)]
#[rstest]
fn symlinked_keys_and_credentials_are_followed(workspace: Workspace) {
    let vault = workspace.path().join("vault");
    fs::create_dir_all(&vault).expect("vault dir");
    fs::write(vault.join("login_key"), "-----BEGIN KEY-----\n").expect("vault key");
    fs::write(vault.join("provider.pem"), "provider-secret\n").expect("vault credential");
    let key = workspace.path().join(".ssh/id_rsa");
    fs::remove_file(&key).expect("remove key");
    std::os::unix::fs::symlink("../vault/login_key", &key).expect("key symlink");
    let jobs = workspace.path().join("jobs");
    fs::create_dir_all(&jobs).expect("jobs dir");
    std::os::unix::fs::symlink("../vault/provider.pem", jobs.join("provider.pem"))
        .expect("credential symlink");

    workspace
        .command()
        .current_dir(&jobs)
        .args(["stub", "tester", "provider.pem", "web", "add"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<< node stub-1"));
}
