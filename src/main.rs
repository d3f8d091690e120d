//! `elkvisor` binary: supervise one panel connection and record its traffic.
//!
//! Every flag falls back to the environment variable of the same meaning:
//!
//! ```text
//! ELK_HOST, ELK_PORT, ELK_SECURE=1, ELK_USERNAME, ELK_PASSWORD   panel
//! DB_URL, INCLUDE_HEARBEAT=1, FLUSH_INTERVAL_SECS                recorder
//! BACKOFF_INITIAL_MS, BACKOFF_MAX_MS, BACKOFF_MAX_ATTEMPTS       reconnect pacing
//! LOG_LEVEL, LOG_RAW=1, LOG_DISABLED=1, LOG_NAME                 logging
//! ```
//!
//! Exit status is 1 when startup fails or reconnecting gives up.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgAction, Args, Parser};
use tracing::{error, info, warn, Instrument};
use tracing_subscriber::EnvFilter;

use elkvisor::{
    wait_for_shutdown_signal, AppContext, BackoffPolicy, ClientConfig, Credentials, JitterPolicy,
    LogWriter, RecorderConfig, SupervisorConfig, TcpClient, TransportConfig,
};

#[derive(Parser, Debug)]
#[command(name = "elkvisor", version, about = "Supervised panel connection with buffered message recording")]
struct Cli {
    #[command(flatten)]
    panel: PanelArgs,
    #[command(flatten)]
    recorder: RecorderArgs,
    #[command(flatten)]
    backoff: BackoffArgs,
    #[command(flatten)]
    log: LogArgs,
}

#[derive(Args, Debug)]
struct PanelArgs {
    /// Panel host name or address.
    #[arg(long, env = "ELK_HOST")]
    host: Option<String>,
    /// Panel port (default 2101, or 2601 when secure).
    #[arg(long, env = "ELK_PORT")]
    port: Option<u16>,
    /// Request a secure transport ("1" enables).
    #[arg(long, env = "ELK_SECURE", default_value = "0", value_parser = parse_flag, action = ArgAction::Set)]
    secure: bool,
    #[arg(long, env = "ELK_USERNAME")]
    username: Option<String>,
    #[arg(long, env = "ELK_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Args, Debug)]
struct RecorderArgs {
    /// Store URL (sqlite:, file:, postgres:), `?table=` picks the table.
    #[arg(long, env = "DB_URL")]
    db_url: Option<String>,
    /// Persist heartbeat messages too ("1" enables).
    #[arg(long, env = "INCLUDE_HEARBEAT", default_value = "0", value_parser = parse_flag, action = ArgAction::Set)]
    include_heartbeat: bool,
    /// Seconds between periodic flushes.
    #[arg(long, env = "FLUSH_INTERVAL_SECS", default_value_t = 30)]
    flush_interval_secs: u64,
}

#[derive(Args, Debug)]
struct BackoffArgs {
    #[arg(long, env = "BACKOFF_INITIAL_MS", default_value_t = 1_000)]
    backoff_initial_ms: u64,
    #[arg(long, env = "BACKOFF_MAX_MS", default_value_t = 30_000)]
    backoff_max_ms: u64,
    /// Give up (exit 1) after this many reconnect attempts; unset retries forever.
    #[arg(long, env = "BACKOFF_MAX_ATTEMPTS")]
    backoff_max_attempts: Option<u32>,
}

#[derive(Args, Debug)]
struct LogArgs {
    /// Filter directive, e.g. `info` or `elkvisor=debug`.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
    /// Emit JSON lines instead of human-readable output ("1" enables).
    #[arg(long, env = "LOG_RAW", default_value = "0", value_parser = parse_flag, action = ArgAction::Set)]
    log_raw: bool,
    /// Disable logging entirely ("1" enables).
    #[arg(long, env = "LOG_DISABLED", default_value = "0", value_parser = parse_flag, action = ArgAction::Set)]
    log_disabled: bool,
    /// Name attached to every log line.
    #[arg(long, env = "LOG_NAME", default_value = "elk-logger")]
    log_name: String,
}

/// Accepts the `1`/`0` convention of the environment variables, plus `true`/`false`.
fn parse_flag(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected 1/0 or true/false, got {other:?}")),
    }
}

impl Cli {
    fn supervisor_config(&self) -> SupervisorConfig {
        let credentials = match (&self.panel.username, &self.panel.password) {
            (Some(user), password) => Some(Credentials {
                user: user.clone(),
                password: password.clone().unwrap_or_default(),
            }),
            (None, _) => None,
        };
        SupervisorConfig {
            client: ClientConfig {
                credentials,
                transport: TransportConfig {
                    secure: self.panel.secure,
                    host: self.panel.host.clone(),
                    port: self.panel.port,
                },
            },
            backoff: BackoffPolicy {
                initial: Duration::from_millis(self.backoff.backoff_initial_ms),
                max: Duration::from_millis(self.backoff.backoff_max_ms),
                jitter: JitterPolicy::None,
                max_attempts: self.backoff.backoff_max_attempts,
            },
            ..SupervisorConfig::default()
        }
    }

    fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            store_url: self.recorder.db_url.clone(),
            include_heartbeats: self.recorder.include_heartbeat,
            flush_interval: Duration::from_secs(self.recorder.flush_interval_secs.max(1)),
            ..RecorderConfig::default()
        }
    }
}

fn init_tracing(log: &LogArgs) -> anyhow::Result<()> {
    if log.log_disabled {
        return Ok(());
    }
    let filter = EnvFilter::try_new(&log.log_level)
        .with_context(|| format!("invalid LOG_LEVEL {:?}", log.log_level))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if log.log_raw {
        builder.json().flatten_event(true).init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let sup_cfg = cli.supervisor_config();
    let rec_cfg = cli.recorder_config();

    let client = Arc::new(TcpClient::new(sup_cfg.client.clone()));
    let mut app = AppContext::build(client, &sup_cfg, &rec_cfg, vec![Arc::new(LogWriter::new())])
        .await
        .context("opening message store")?;

    match app.startup().await {
        Ok(true) => info!("OK..."),
        Ok(false) => {
            error!("initial connection to the panel failed");
            if let Err(e) = app.shutdown().await {
                warn!(error = %e, "shutdown after failed start");
            }
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => {
            error!(error = %e, label = e.as_label(), "startup failed");
            if let Err(e) = app.shutdown().await {
                warn!(error = %e, "shutdown after failed start");
            }
            return Ok(ExitCode::FAILURE);
        }
    }

    let code = tokio::select! {
        sig = wait_for_shutdown_signal() => {
            match sig {
                Ok(sig) => info!(signal = %sig, "shutdown requested"),
                Err(e) => error!(error = %e, "signal handling unavailable; shutting down"),
            }
            ExitCode::SUCCESS
        }
        err = app.fatal() => {
            error!(error = %err, label = err.as_label(), "giving up");
            ExitCode::FAILURE
        }
    };

    app.shutdown().await.context("shutdown")?;
    Ok(code)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(&cli.log) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }
    let span = tracing::info_span!("app", name = %cli.log.log_name);

    match run(cli).instrument(span).await {
        Ok(code) => code,
        Err(e) => {
            error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_values() {
        assert_eq!(parse_flag("1"), Ok(true));
        assert_eq!(parse_flag("0"), Ok(false));
        assert_eq!(parse_flag("TRUE"), Ok(true));
        assert!(parse_flag("maybe").is_err());
    }

    #[test]
    fn test_configs_from_flags() {
        let cli = Cli::try_parse_from([
            "elkvisor",
            "--host",
            "panel.local",
            "--username",
            "installer",
            "--include-heartbeat",
            "1",
            "--backoff-max-attempts",
            "5",
            "--db-url",
            "sqlite:///tmp/elk.db",
        ])
        .unwrap();

        let sup = cli.supervisor_config();
        assert_eq!(sup.client.transport.host.as_deref(), Some("panel.local"));
        assert_eq!(sup.client.transport.effective_port(), 2101);
        assert_eq!(sup.backoff.max_attempts, Some(5));
        assert_eq!(sup.backoff.initial, Duration::from_secs(1));
        let creds = sup.client.credentials.unwrap();
        assert_eq!(creds.user, "installer");
        assert_eq!(creds.password, "");

        let rec = cli.recorder_config();
        assert!(rec.include_heartbeats);
        assert_eq!(rec.flush_interval, Duration::from_secs(30));
        assert_eq!(rec.store_url.as_deref(), Some("sqlite:///tmp/elk.db"));
    }
}
