//! Argument parsing and command dispatch.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use url::Url;
use uuid::Uuid;
use warden_telemetry::{
    GlobalContextGuard, LogFormat, LoggingConfig, build_sha, init_logging, log_format_from_env,
};

use crate::client::{AppContext, CliResult, parse_url};
use crate::commands::probe::handle_probe;
use crate::commands::session::{handle_bootstrap, handle_get, handle_logout, handle_metrics};
use crate::output::spawn_notification_printer;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CONSOLE_URL: &str = "http://127.0.0.1:8181/console/";
const PRINTER_DRAIN: Duration = Duration::from_millis(500);

/// Parses CLI arguments, executes the requested command, and reports any
/// notifications raised along the way. Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let format = log_format_from_env().unwrap_or_else(LogFormat::infer);
    if let Err(err) = init_logging(&LoggingConfig {
        level: &cli.log_level,
        format,
        build_sha: build_sha(),
    }) {
        eprintln!("warning: logging unavailable: {err}");
    }

    let command_name = command_label(&cli.command);
    let _context = GlobalContextGuard::new(command_name);
    let trace_id = Uuid::new_v4();
    tracing::debug!(command = command_name, %trace_id, "starting command");

    let ctx = match AppContext::from_cli(&cli) {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            return err.exit_code();
        }
    };

    let printer = spawn_notification_printer(&ctx.notifications);
    let result = dispatch(cli.command, &ctx, cli.output).await;
    drop(ctx);
    if tokio::time::timeout(PRINTER_DRAIN, printer).await.is_err() {
        tracing::debug!("notification printer still running at exit");
    }

    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

pub(crate) async fn dispatch(
    command: Command,
    ctx: &AppContext,
    format: OutputFormat,
) -> CliResult<()> {
    match command {
        Command::Probe => handle_probe(ctx, format).await,
        Command::Bootstrap => handle_bootstrap(ctx, format).await,
        Command::Get(args) => handle_get(ctx, args).await,
        Command::Logout => handle_logout(ctx).await,
        Command::Metrics => handle_metrics(ctx).await,
    }
}

const fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Probe => "probe",
        Command::Bootstrap => "bootstrap",
        Command::Get(_) => "get",
        Command::Logout => "logout",
        Command::Metrics => "metrics",
    }
}

#[derive(Parser)]
#[command(name = "warden", about = "Run the Warden console authentication pipeline")]
pub(crate) struct Cli {
    #[arg(
        long,
        global = true,
        env = "WARDEN_CONSOLE_URL",
        value_parser = parse_url,
        default_value = DEFAULT_CONSOLE_URL
    )]
    pub(crate) console_url: Url,
    #[arg(
        long,
        global = true,
        env = "WARDEN_INIT_TOKEN",
        help = "Token handed in out-of-band; replaces interactive login"
    )]
    pub(crate) init_token: Option<String>,
    #[arg(
        long,
        global = true,
        env = "WARDEN_SUBJECT",
        help = "Subject the preset token belongs to"
    )]
    pub(crate) subject: Option<String>,
    #[arg(
        long,
        global = true,
        env = "WARDEN_TOKEN_LIFETIME_SECS",
        help = "Seconds the preset token stays valid"
    )]
    pub(crate) token_lifetime: Option<u64>,
    #[arg(
        long,
        global = true,
        env = "WARDEN_HTTP_TIMEOUT_SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS
    )]
    pub(crate) timeout: u64,
    #[arg(long, global = true, env = "WARDEN_ADAPTER_TIMEOUT_SECS")]
    pub(crate) adapter_timeout: Option<u64>,
    #[arg(long, global = true, env = "WARDEN_ADAPTER_SCRIPT")]
    pub(crate) adapter_script: Option<String>,
    #[arg(
        long,
        global = true,
        env = "WARDEN_FALLBACK_DESCRIPTOR",
        help = "JSON file with the client descriptor used when the console cannot serve one"
    )]
    pub(crate) fallback_descriptor: Option<PathBuf>,
    #[arg(long, global = true, env = "WARDEN_LOG_LEVEL", default_value = "warn")]
    pub(crate) log_level: String,
    #[arg(
        long = "output",
        alias = "format",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for commands that render structured data"
    )]
    pub(crate) output: OutputFormat,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Check whether the console requires single sign-on.
    Probe,
    /// Run the full bootstrap and report the outcome.
    Bootstrap,
    /// Issue an authorized GET against a console path.
    Get(GetArgs),
    /// Bootstrap, then run the logout chain.
    Logout,
    /// Bootstrap, then print the pipeline's Prometheus counters.
    Metrics,
}

#[derive(Args)]
pub(crate) struct GetArgs {
    #[arg(help = "Path relative to the console URL, e.g. `user`")]
    pub(crate) path: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Table,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_subcommand() {
        let cli = Cli::try_parse_from([
            "warden",
            "--console-url",
            "https://console.example/app/",
            "--init-token",
            "abc",
            "--subject",
            "alice",
            "--output",
            "json",
            "get",
            "user",
        ])
        .expect("arguments parse");

        assert_eq!(cli.console_url.as_str(), "https://console.example/app/");
        assert_eq!(cli.init_token.as_deref(), Some("abc"));
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.timeout, DEFAULT_TIMEOUT_SECS);
        assert!(matches!(cli.command, Command::Get(ref args) if args.path == "user"));
        assert_eq!(command_label(&cli.command), "get");
    }

    #[test]
    fn rejects_invalid_console_url() {
        assert!(Cli::try_parse_from(["warden", "--console-url", "not a url", "probe"]).is_err());
    }
}
