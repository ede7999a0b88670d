//! notify-relay command line.
//!
//! `run` (the default) reads notification events from standard input and
//! forwards matching ones until interrupted. `test-webhook` sends the
//! diagnostic payload, and `settings` shows or edits the runtime settings
//! document.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use notify_relay::{Config, LogStatusHandler, Service};
use relay_core::{FilterConfig, FilterEngine, JsonFileSettings, RealClock};
use relay_delivery::{DeliveryClient, DeliveryOutcome, Forwarder};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "notify-relay", version, about)]
struct Cli {
    /// Configuration file.
    #[arg(long, env = "RELAY_CONFIG", default_value = notify_relay::config::CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Forward events read from standard input (default).
    Run,
    /// Send the diagnostic payload to the configured webhook.
    TestWebhook,
    /// Show or change the runtime forwarding settings.
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
}

#[derive(Debug, Subcommand)]
enum SettingsAction {
    /// Print the current settings as JSON (default).
    Show,
    /// Change one or more settings.
    Update(UpdateArgs),
}

#[derive(Debug, Args)]
struct UpdateArgs {
    /// Turn forwarding on or off.
    #[arg(long)]
    enabled: Option<bool>,
    /// Webhook URL; an empty value disables delivery.
    #[arg(long)]
    webhook_url: Option<String>,
    /// Value sent in the `X-Listener-Token` header.
    #[arg(long)]
    webhook_secret: Option<String>,
    /// Comma-separated source ids allowed to forward.
    #[arg(long, value_delimiter = ',', conflicts_with = "clear_allowed_packages")]
    allowed_packages: Option<Vec<String>>,
    /// Allow every source.
    #[arg(long)]
    clear_allowed_packages: bool,
}

impl UpdateArgs {
    fn apply(self, settings: &mut FilterConfig) {
        if let Some(enabled) = self.enabled {
            settings.enabled = enabled;
        }
        if let Some(url) = self.webhook_url {
            settings.destination_url = url.trim().to_string();
        }
        if let Some(secret) = self.webhook_secret {
            settings.shared_secret = secret;
        }
        if self.clear_allowed_packages {
            settings.allowed_source_ids.clear();
        }
        if let Some(packages) = self.allowed_packages {
            settings.allowed_source_ids = packages
                .into_iter()
                .map(|package| package.trim().to_string())
                .filter(|package| !package.is_empty())
                .collect();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_from(&cli.config)?;
    init_tracing(&config.rust_log)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => exit_after_run(run(config).await),
        Command::TestWebhook => test_webhook(config).await,
        Command::Settings { action } => settings(config, action.unwrap_or(SettingsAction::Show)).await,
    }
}

/// Initializes tracing. `RUST_LOG` wins over the configured filter.
fn init_tracing(default_filter: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .context("Invalid log filter")?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    info!(
        settings_path = %config.settings_path.display(),
        call_timeout_secs = config.call_timeout_secs,
        "Starting notify-relay"
    );

    let settings = Arc::new(JsonFileSettings::new(&config.settings_path));
    let open = Arc::new(|| Box::new(tokio::io::stdin()) as notify_relay::BoxedReader);
    let service = Service::start(config, settings, open).await?;

    wait_for_shutdown(&service).await;
    info!("Shutdown signal received, starting graceful shutdown");

    service.shutdown().await
}

/// Ends the process once the service has shut down.
///
/// A pending stdin read sits on a blocking thread that cannot be cancelled,
/// and dropping the runtime would wait for it until input arrives.
fn exit_after_run(result: Result<()>) -> ! {
    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            tracing::error!(error = %e, "notify-relay stopped with an error");
            eprintln!("Error: {e:?}");
            std::process::exit(1)
        },
    }
}

/// Waits for Ctrl+C or SIGTERM. SIGHUP triggers a manual reconnect.
async fn wait_for_shutdown(service: &Service) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (Ok(mut terminate), Ok(mut hangup)) =
            (signal(SignalKind::terminate()), signal(SignalKind::hangup()))
        else {
            tracing::warn!("failed to install unix signal handlers, only Ctrl+C is handled");
            ctrl_c.await;
            return;
        };

        tokio::pin!(ctrl_c);
        loop {
            tokio::select! {
                () = &mut ctrl_c => {
                    info!("Received CTRL+C signal");
                    return;
                },
                _ = terminate.recv() => {
                    info!("Received SIGTERM signal");
                    return;
                },
                _ = hangup.recv() => {
                    let outcome = service.supervisor().request_reconnect().await;
                    info!(%outcome, "Received SIGHUP, reconnect requested");
                },
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = service;
        ctrl_c.await;
        info!("Received CTRL+C signal");
    }
}

async fn test_webhook(config: Config) -> Result<()> {
    let settings = Arc::new(JsonFileSettings::new(&config.settings_path));
    let client = DeliveryClient::new(config.to_client_config())
        .context("Failed to build delivery client")?;
    let forwarder = Forwarder::new(
        settings,
        Arc::new(FilterEngine::new(config.rule_table()?)),
        client,
        Arc::new(LogStatusHandler),
        Arc::new(RealClock::new()),
    );

    match forwarder.send_test().await {
        DeliveryOutcome::Delivered { status_code } => {
            println!("TEST OK: HTTP {status_code}");
            Ok(())
        },
        DeliveryOutcome::Failed(error) => anyhow::bail!("TEST FAILED: {error}"),
        DeliveryOutcome::Skipped => anyhow::bail!("Test aborted: webhook URL is empty"),
    }
}

async fn settings(config: Config, action: SettingsAction) -> Result<()> {
    let store = JsonFileSettings::new(&config.settings_path);

    let current = match action {
        SettingsAction::Show => store.load().await,
        SettingsAction::Update(args) => {
            let updated = store.update(|settings| args.apply(settings)).await;
            if updated.is_ok() {
                info!(path = %store.path().display(), "Settings updated");
            }
            updated
        },
    }
    .with_context(|| format!("Settings file {}", store.path().display()))?;

    println!("{}", serde_json::to_string_pretty(&current)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_is_the_default_command() {
        let cli = Cli::try_parse_from(["notify-relay"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("relay.toml"));
    }

    #[test]
    fn update_args_apply_to_settings() {
        let cli = Cli::try_parse_from([
            "notify-relay",
            "settings",
            "update",
            "--enabled",
            "false",
            "--webhook-url",
            " https://example.test/hook ",
            "--allowed-packages",
            "id.dana, com.forum_asisten",
        ])
        .unwrap();
        let Some(Command::Settings { action: Some(SettingsAction::Update(args)) }) = cli.command
        else {
            panic!("expected settings update");
        };

        let mut settings = FilterConfig::new("", "s3cr3t");
        args.apply(&mut settings);

        assert!(!settings.enabled);
        assert_eq!(settings.destination_url, "https://example.test/hook");
        assert_eq!(settings.shared_secret, "s3cr3t");
        assert!(settings.allows_source("id.dana"));
        assert!(settings.allows_source("com.forum_asisten"));
        assert!(!settings.allows_source("com.other"));
    }

    #[test]
    fn allow_list_flags_conflict() {
        let result = Cli::try_parse_from([
            "notify-relay",
            "settings",
            "update",
            "--allowed-packages",
            "id.dana",
            "--clear-allowed-packages",
        ]);
        assert!(result.is_err());
    }
}
