//! Remote script execution over the system `ssh` client.
//!
//! A [`SshSession`] stages the login secret in a private temporary file for
//! the lifetime of one dispatch and runs scripts on individual hosts, either
//! inline or as a detached background task whose status is polled by name.
//! Every failure to reach or finish on a node is returned as a per-node
//! [`NodeOutcome::Failed`], never raised.

use std::ffi::OsString;
use std::io::Write as _;
use std::net::IpAddr;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::credentials::{Credentials, Secret};
use crate::exec::TaskName;
use crate::gateway::{ExecResponse, ExecutionMode, NodeOutcome, RemoteScript};

mod config;
mod remote_script;
mod types;

pub use config::SshConfig;
pub use types::{CommandOutput, CommandRunner, ProcessCommandRunner, SshError};

use remote_script::{
    TASK_TIMED_OUT, TIMEOUT_EXIT_STATUS, inline_command, launch_task_command, split_exit_status,
    status_command, stream_command,
};

/// Exit status the `ssh` client reports for connection failures.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Builds `ssh` invocations from configuration and a command runner.
#[derive(Clone, Debug)]
pub struct SshTransport<R: CommandRunner> {
    config: SshConfig,
    runner: R,
}

impl SshTransport<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::InvalidConfig`] when validation fails.
    pub fn with_process_runner(config: SshConfig) -> Result<Self, SshError> {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> SshTransport<R> {
    /// Creates a transport using the provided runner and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::InvalidConfig`] when configuration validation
    /// fails.
    pub fn new(config: SshConfig, runner: R) -> Result<Self, SshError> {
        config.validate()?;
        Ok(Self { config, runner })
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Stages `credentials` for one dispatch. The session carries its own
    /// copy of the transport, so it can be shared with blocking tasks.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::SecretFile`] when the secret cannot be written.
    pub fn session(
        &self,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<SshSession<R>, SshError> {
        let secret = match credentials.secret() {
            Secret::PrivateKey(key) => key,
            Secret::Password(password) => password,
        };
        let secret_file = stage_secret(secret)?;
        Ok(SshSession {
            transport: self.clone(),
            username: credentials.username().to_owned(),
            password_auth: credentials.password().is_some(),
            secret_file,
            timeout,
        })
    }

    fn common_ssh_options(&self, identity: Option<&NamedTempFile>) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-p"),
            OsString::from(self.config.port.to_string()),
        ];

        if let Some(file) = identity {
            args.push(OsString::from("-i"));
            args.push(file.path().as_os_str().to_owned());
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.config.strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.known_hosts_file
            )));
        }

        args.push(OsString::from("-o"));
        args.push(OsString::from(format!(
            "ConnectTimeout={}",
            self.config.connect_timeout_secs
        )));
        args
    }
}

fn stage_secret(secret: &str) -> Result<NamedTempFile, SshError> {
    let to_error = |err: std::io::Error| SshError::SecretFile {
        message: err.to_string(),
    };
    let mut file = NamedTempFile::new().map_err(to_error)?;
    file.write_all(secret.as_bytes()).map_err(to_error)?;
    if !secret.ends_with('\n') {
        file.write_all(b"\n").map_err(to_error)?;
    }
    file.flush().map_err(to_error)?;
    Ok(file)
}

/// Login secret staged for one dispatch. The file is removed on drop.
#[derive(Debug)]
pub struct SshSession<R: CommandRunner> {
    transport: SshTransport<R>,
    username: String,
    password_auth: bool,
    secret_file: NamedTempFile,
    timeout: Duration,
}

impl<R: CommandRunner> SshSession<R> {
    /// Runs `script` on `host` and waits for it to finish or time out.
    #[must_use]
    pub fn run(&self, host: IpAddr, script: &RemoteScript) -> NodeOutcome {
        match script.mode() {
            ExecutionMode::Inline => self.run_inline(host, script.body()),
            ExecutionMode::BackgroundTask(task) => self.run_task(host, task, script.body()),
        }
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout.as_secs().max(1)
    }

    fn timed_out(&self) -> NodeOutcome {
        NodeOutcome::Failed {
            message: format!("script timed out after {} seconds", self.timeout_secs()),
        }
    }

    /// Runs `body` inline. The script's own status arrives on stderr, so a
    /// 124 or 255 from the wrapper or `ssh` is only read as a timeout or a
    /// connection failure when that status line is missing.
    fn run_inline(&self, host: IpAddr, body: &str) -> NodeOutcome {
        let output = match self.spawn(host, &inline_command(body, self.timeout_secs())) {
            Ok(output) => output,
            Err(outcome) => return outcome,
        };
        if let Some((status, error)) = split_exit_status(&output.stderr) {
            return NodeOutcome::Completed(ExecResponse {
                exit_status: Some(status),
                output: output.stdout,
                error,
            });
        }
        match output.code {
            Some(TIMEOUT_EXIT_STATUS) => self.timed_out(),
            Some(SSH_CONNECTION_FAILURE) => unreachable_node(host, &output.stderr),
            code => NodeOutcome::Completed(ExecResponse {
                exit_status: code,
                output: output.stdout,
                error: output.stderr,
            }),
        }
    }

    fn run_task(&self, host: IpAddr, task: &TaskName, body: &str) -> NodeOutcome {
        let launch = launch_task_command(task, body, self.timeout_secs());
        match self.execute(host, &launch) {
            Ok(output) if output.is_success() => {}
            Ok(output) => {
                return NodeOutcome::Failed {
                    message: format!("task {task} did not start: {}", output.stderr.trim()),
                };
            }
            Err(outcome) => return outcome,
        }
        debug!(%host, %task, "background task launched");

        let deadline = Instant::now() + self.timeout;
        let poll_interval = self.transport.config.poll_interval();
        let exit_status = loop {
            match self.execute(host, &status_command(task)) {
                Ok(output) if output.is_success() => {
                    let recorded = output.stdout.trim();
                    if recorded == TASK_TIMED_OUT {
                        return self.timed_out();
                    }
                    if let Ok(status) = recorded.parse::<i32>() {
                        break status;
                    }
                }
                Ok(_) => {}
                Err(outcome) => return outcome,
            }
            if Instant::now() >= deadline {
                return self.timed_out();
            }
            thread::sleep(poll_interval);
        };

        let stdout = self.collect(host, task, "stdout");
        let stderr = self.collect(host, task, "stderr");
        NodeOutcome::Completed(ExecResponse {
            exit_status: Some(exit_status),
            output: stdout,
            error: stderr,
        })
    }

    fn collect(&self, host: IpAddr, task: &TaskName, stream: &str) -> String {
        self.execute(host, &stream_command(task, stream))
            .ok()
            .filter(CommandOutput::is_success)
            .map(|output| output.stdout)
            .unwrap_or_default()
    }

    /// Runs one of our own remote commands, turning transport failures into
    /// per-node outcomes. None of these commands exits 255 by itself.
    fn execute(&self, host: IpAddr, command: &str) -> Result<CommandOutput, NodeOutcome> {
        let output = self.spawn(host, command)?;
        if output.code == Some(SSH_CONNECTION_FAILURE) {
            return Err(unreachable_node(host, &output.stderr));
        }
        Ok(output)
    }

    fn spawn(&self, host: IpAddr, command: &str) -> Result<CommandOutput, NodeOutcome> {
        let (program, args) = self.build_args(host, command);
        self.transport
            .runner
            .run(&program, &args)
            .map_err(|err| NodeOutcome::Failed {
                message: err.to_string(),
            })
    }

    fn build_args(&self, host: IpAddr, command: &str) -> (String, Vec<OsString>) {
        let config = &self.transport.config;
        let destination = OsString::from(format!("{}@{host}", self.username));
        if self.password_auth {
            let mut args = vec![
                OsString::from("-f"),
                self.secret_file.path().as_os_str().to_owned(),
                OsString::from(&config.ssh_bin),
            ];
            args.extend(self.transport.common_ssh_options(None));
            args.push(destination);
            args.push(OsString::from(command));
            return (config.sshpass_bin.clone(), args);
        }

        let mut args = self.transport.common_ssh_options(Some(&self.secret_file));
        args.push(destination);
        args.push(OsString::from(command));
        (config.ssh_bin.clone(), args)
    }
}

fn unreachable_node(host: IpAddr, stderr: &str) -> NodeOutcome {
    NodeOutcome::Failed {
        message: format!("ssh to {host} failed: {}", stderr.trim()),
    }
}
