//! Binary entry point for the `flotilla` CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;

use flotilla::config::FlotillaConfig;
use flotilla::invocation::RawArguments;
use flotilla::report::Reporter;
use flotilla::{app, logging};

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            err.print().ok();
            process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    };

    let config = match FlotillaConfig::load_without_cli_args() {
        Ok(config) => config,
        Err(err) => {
            writeln!(io::stderr(), "error: {err}").ok();
            process::exit(1);
        }
    };
    logging::init(config.log_format().unwrap_or(logging::LogFormat::Human));

    let mut reporter = Reporter::stdio();
    let exit_code = app::run(into_raw(cli), &config, &mut reporter).await;
    process::exit(exit_code);
}

fn into_raw(cli: Cli) -> RawArguments {
    RawArguments {
        provider: cli.provider,
        identity: cli.identity,
        credential: cli.credential,
        group: cli.group,
        action: cli.action,
        argument: cli.argument,
    }
}
