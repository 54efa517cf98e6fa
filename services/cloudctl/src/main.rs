//! cloudctl
//!
//! Operator CLI over the cloud API client:
//! 1. Loads config and resolves the client secret
//! 2. Logs in through the credential cache
//! 3. Runs one command (token identity, PAT listing, or waiting on an
//!    activity / backup job) and prints the result as JSON on stdout
//!
//! Ctrl-C or SIGTERM cancels an in-progress wait.

mod config;
mod metrics;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use cloud_activity::{Operation, OperationKind, Outcome};
use cloud_auth::{CredentialCache, HttpAuthenticator};
use cloud_client::ResourceClient;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

const USAGE: &str = "usage: cloudctl [--config PATH] [--metrics] <token | tokens | wait <activity-id> | wait-job <job-id>>";

#[derive(Debug, PartialEq)]
enum Command {
    /// Identity carried by the current token
    Token,
    /// Personal access tokens of the current user
    Tokens,
    Wait(String),
    WaitJob(String),
}

#[derive(Debug, PartialEq)]
struct Cli {
    config_path: Option<String>,
    metrics: bool,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<Cli> {
    let mut config_path = None;
    let mut metrics = false;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config needs a path")?;
                config_path = Some(path.clone());
            }
            "--metrics" => metrics = true,
            flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{USAGE}"),
            _ => positional.push(arg.as_str()),
        }
    }

    let command = match positional.as_slice() {
        ["token"] => Command::Token,
        ["tokens"] => Command::Tokens,
        ["wait", id] => Command::Wait(id.to_string()),
        ["wait-job", id] => Command::WaitJob(id.to_string()),
        _ => bail!(USAGE),
    };

    Ok(Cli {
        config_path,
        metrics,
        command,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the command's JSON
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_args(&args)?;

    let prometheus = if cli.metrics {
        Some(metrics::install_recorder().context("failed to install metrics recorder")?)
    } else {
        None
    };

    let config_path = Config::resolve_path(cli.config_path.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let mut config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        api_root = %config.api_root(),
        client_id = %config.api.client_id,
        poll_interval_secs = config.polling.interval_secs,
        max_wait_secs = config.polling.max_wait_secs,
        "configuration loaded"
    );

    let client = build_client(&mut config)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    let outcome = run(&client, &cli.command, &cancel).await;

    if let Some(handle) = prometheus {
        eprint!("{}", handle.render());
    }

    let output = outcome?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn build_client(config: &mut Config) -> Result<ResourceClient> {
    let secret = config
        .api
        .client_secret
        .take()
        .context("client secret missing after config load")?;
    let api_root = config.api_root();
    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;

    let authenticator =
        HttpAuthenticator::new(http.clone(), &api_root, config.api.client_id.clone(), secret);
    let credentials = CredentialCache::new(Arc::new(authenticator))
        .with_refresh_margin(config.refresh_margin())
        .with_default_lifetime(config.default_lifetime());

    Ok(ResourceClient::new(http, &api_root, Arc::new(credentials))
        .with_polling(
            OperationKind::Activity,
            config.poll_config(OperationKind::Activity),
        )
        .with_polling(
            OperationKind::BackupJob,
            config.poll_config(OperationKind::BackupJob),
        ))
}

async fn run(client: &ResourceClient, command: &Command, cancel: &CancellationToken) -> Result<Value> {
    match command {
        Command::Token => {
            let token = client.token().await.context("login failed")?;
            Ok(json!({
                "userId": token.user_id(),
                "tenantId": token.tenant_id(),
                "issuedAtMillis": token.issued_at_millis(),
                "expiresAtMillis": token.expires_at_millis(),
            }))
        }
        Command::Tokens => {
            let tokens = client
                .personal_access_tokens()
                .await
                .context("failed to list personal access tokens")?;
            Ok(serde_json::to_value(tokens)?)
        }
        Command::Wait(id) => {
            let operation = client
                .wait_for_activity(id, cancel)
                .await
                .with_context(|| format!("waiting for activity {id}"))?;
            Ok(operation_json(&operation))
        }
        Command::WaitJob(id) => {
            let operation = client
                .wait_for_backup_job(id, cancel)
                .await
                .with_context(|| format!("waiting for backup job {id}"))?;
            Ok(operation_json(&operation))
        }
    }
}

fn operation_json(operation: &Operation) -> Value {
    let outcome = match operation.outcome {
        Some(Outcome::Skipped) => "skipped",
        _ => "succeeded",
    };
    json!({
        "id": operation.id,
        "outcome": outcome,
        "phases": operation.state.iter().map(|(name, _)| name).collect::<Vec<_>>(),
        "concernedItems": operation
            .concerned_items
            .iter()
            .map(|item| json!({ "id": item.id, "type": item.item_type }))
            .collect::<Vec<_>>(),
    })
}

/// Wait for SIGTERM or SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, cancelling"),
        _ = terminate => info!("received SIGTERM, cancelling"),
    }
}
