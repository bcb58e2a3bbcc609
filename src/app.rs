//! End-to-end handling of one invocation.
//!
//! Arguments are validated first, then login and provider credentials are
//! resolved, then the gateway is opened inside a [`Connection`] and the
//! action runs. Every failure is rendered through the [`Reporter`], which
//! owns the exit code.

use std::io::Write;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, FlotillaConfig, ScalewayConfig, stub_template_defaults};
use crate::connection::Connection;
use crate::credentials::{CredentialError, CredentialResolver, Credentials};
use crate::gateway::Gateway;
use crate::invocation::{ArgumentError, Invocation, RawArguments};
use crate::lifecycle::{LifecycleError, LifecycleOrchestrator, OrchestratorSettings};
use crate::provider::ProviderId;
use crate::report::Reporter;
use crate::scaleway::ScalewayGateway;
use crate::ssh::{SshConfig, SshTransport};
use crate::stub::StubGateway;

/// Failures that end an invocation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum AppError {
    /// Invalid positional arguments.
    #[error("error: {0}")]
    Argument(#[from] ArgumentError),
    /// Configuration could not be loaded or failed validation.
    #[error("error: {0}")]
    Config(#[from] ConfigError),
    /// Login or provider credentials could not be resolved.
    #[error("error: {0}")]
    Credential(#[from] CredentialError),
    /// The provider connection could not be opened.
    #[error("error: failed to connect to {provider}: {message}")]
    Connect {
        /// Provider being opened.
        provider: ProviderId,
        /// Underlying failure.
        message: String,
    },
    /// The action itself failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Runs one invocation, reporting progress and failures through `reporter`,
/// and returns the exit code.
pub async fn run<O: Write, E: Write>(
    raw: RawArguments,
    config: &FlotillaConfig,
    reporter: &mut Reporter<O, E>,
) -> i32 {
    if let Err(err) = execute(raw, config, reporter).await {
        reporter.record_failure(&err);
    }
    reporter.exit_code()
}

/// Runs one invocation.
///
/// # Errors
///
/// Returns [`AppError`] for the first failure met; nothing after it runs.
pub async fn execute<O: Write, E: Write>(
    raw: RawArguments,
    config: &FlotillaConfig,
    reporter: &mut Reporter<O, E>,
) -> Result<(), AppError> {
    let invocation = Invocation::parse(raw)?;
    config.validate()?;
    let login = CredentialResolver::from_env(config.credential_overrides())
        .resolve(&invocation.action)?;
    let credential = invocation
        .provider
        .resolve_credential(&invocation.credential)?;
    info!(
        provider = %invocation.provider,
        group = %invocation.group,
        action = %invocation.action,
        "starting action"
    );

    let fixed_login = invocation.provider.has_fixed_login_user();
    match invocation.provider {
        ProviderId::Stub => {
            let gateway = StubGateway::connect(&invocation.identity, credential);
            let settings = config.orchestrator_settings(stub_template_defaults(), fixed_login);
            drive(gateway, settings, &invocation, login.as_ref(), reporter).await
        }
        ProviderId::Scaleway => {
            let connect_error = |message: String| AppError::Connect {
                provider: invocation.provider,
                message,
            };
            let scaleway = ScalewayConfig::load_without_cli_args()?;
            let template = scaleway.template_defaults();
            let transport = SshConfig::load_without_cli_args()
                .and_then(SshTransport::with_process_runner)
                .map_err(|err| connect_error(err.to_string()))?;
            let gateway = ScalewayGateway::connect(
                &invocation.identity,
                &credential,
                scaleway,
                transport,
            )
            .map_err(|err| connect_error(err.to_string()))?
            .with_script_timeout(Duration::from_secs(config.script_timeout_secs));
            let settings = config.orchestrator_settings(template, fixed_login);
            drive(gateway, settings, &invocation, login.as_ref(), reporter).await
        }
    }
}

async fn drive<G: Gateway, O: Write, E: Write>(
    gateway: G,
    settings: OrchestratorSettings,
    invocation: &Invocation,
    login: Option<&Credentials>,
    reporter: &mut Reporter<O, E>,
) -> Result<(), AppError> {
    let mut connection = Connection::open(gateway);
    let outcome = LifecycleOrchestrator::new(connection.gateway(), settings)
        .execute(&invocation.group, &invocation.action, login, reporter)
        .await;
    connection.release();
    outcome?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::config::DEFAULT_SCRIPT_TIMEOUT_SECS;
    use crate::lifecycle::DEFAULT_INSTALL_SCRIPT;

    type Buffered = Reporter<Vec<u8>, Vec<u8>>;

    #[fixture]
    fn config() -> FlotillaConfig {
        FlotillaConfig {
            min_ram: None,
            os_family: None,
            login_user: None,
            login_password: None,
            private_key_path: None,
            script_timeout_secs: DEFAULT_SCRIPT_TIMEOUT_SECS,
            install_script: DEFAULT_INSTALL_SCRIPT.to_owned(),
            log_format: String::from("human"),
        }
    }

    fn raw(provider: &str, action: &str, argument: Option<&str>) -> RawArguments {
        RawArguments {
            provider: provider.to_owned(),
            identity: String::from("tester"),
            credential: String::from("/nonexistent/credential"),
            group: String::from("web"),
            action: action.to_owned(),
            argument: argument.map(str::to_owned),
        }
    }

    fn streams(reporter: Buffered) -> (String, String) {
        let (out, err) = reporter.into_parts();
        (
            String::from_utf8(out).expect("utf8 stdout"),
            String::from_utf8(err).expect("utf8 stderr"),
        )
    }

    #[rstest]
    #[tokio::test]
    async fn unknown_providers_fail_before_credentials(config: FlotillaConfig) {
        let mut reporter = Reporter::new(Vec::new(), Vec::new());
        let err = execute(raw("aws-ec2", "listnodes", None), &config, &mut reporter)
            .await
            .expect_err("unknown provider");
        assert!(matches!(
            err,
            AppError::Argument(ArgumentError::UnknownProvider { .. })
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn exec_without_a_command_exits_one(config: FlotillaConfig) {
        let mut reporter = Reporter::new(Vec::new(), Vec::new());
        let code = run(raw("stub", "exec", None), &config, &mut reporter).await;
        assert_eq!(code, 1);
        let (out, err) = streams(reporter);
        assert!(out.is_empty());
        assert!(err.contains("please quote the command"), "{err}");
    }

    #[rstest]
    #[tokio::test]
    async fn unreadable_provider_credentials_are_reported(config: FlotillaConfig) {
        let mut reporter = Reporter::new(Vec::new(), Vec::new());
        let err = execute(raw("stub", "listnodes", None), &config, &mut reporter)
            .await
            .expect_err("missing key file");
        assert!(matches!(
            err,
            AppError::Credential(CredentialError::CredentialFile { .. })
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn invalid_configuration_stops_the_invocation(config: FlotillaConfig) {
        let cfg = FlotillaConfig {
            script_timeout_secs: 0,
            ..config
        };
        let mut reporter = Reporter::new(Vec::new(), Vec::new());
        let err = execute(raw("stub", "listnodes", None), &cfg, &mut reporter)
            .await
            .expect_err("invalid config");
        assert!(matches!(err, AppError::Config(ConfigError::Invalid(_))));
    }
}
