//! OTP pipeline - record store maintenance entry point.
//!
//! Workflows that talk to a provider or a registration target are driven
//! through the library with concrete gateway implementations. This binary
//! covers the store-only commands.

use anyhow::{bail, Context, Result};
use otp_pipeline::{parse_phone_list, Config};
use record_store::{Lifecycle, Store};
use secrecy::ExposeSecret;
use serde::Serialize;
use std::io::Read;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const RECENT_LIMIT: usize = 5;

const USAGE: &str = "usage: otp-pipeline <status|list|clear|normalize [PHONE...]>";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_logging(&config.log.level);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        bail!(USAGE);
    };

    log_gateway_config(&config);

    if command == "normalize" {
        return normalize(&args[1..]);
    }

    let store = if config.store.persist {
        let store = Store::open(&config.store.path)
            .await
            .with_context(|| format!("Failed to open store {}", config.store.path.display()))?;
        info!(path = %config.store.path.display(), "Record store ready");
        store
    } else {
        warn!("Persistence disabled - records are kept in memory only");
        Store::memory()
    };
    let lifecycle = Lifecycle::new(store, config.runtime.expire_after);

    match command.as_str() {
        "status" => {
            let counts = lifecycle.status_counts().await?;
            let recent = lifecycle.recent(RECENT_LIMIT).await?;
            print_json(&serde_json::json!({ "counts": counts, "recent": recent }))
        }
        "list" => {
            let records = lifecycle.list().await?;
            print_json(&records)
        }
        "clear" => {
            let backup = lifecycle.clear().await?;
            if let Some(path) = &backup {
                info!(backup = %path.display(), "Store archived");
            }
            print_json(&serde_json::json!({ "cleared": true, "backup": backup }))
        }
        other => bail!("Unknown command {other:?}\n{USAGE}"),
    }
}

/// Canonicalize phones from the arguments, or from stdin when none are given.
fn normalize(args: &[String]) -> Result<()> {
    let text = if args.is_empty() {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        args.join("\n")
    };

    let list = parse_phone_list(&text);
    print_json(&serde_json::json!({
        "accepted": list.accepted,
        "rejected": list.rejected,
    }))
}

/// Gateway settings are consumed by deployment-supplied gateways.
fn log_gateway_config(config: &Config) {
    let api_key_set = config
        .provider
        .api_key
        .as_ref()
        .is_some_and(|k| !k.expose_secret().is_empty());
    debug!(
        provider = %config.provider.base_url,
        country = %config.provider.country,
        service = %config.provider.service,
        operator = %config.provider.operator,
        api_key_set,
        "Provider configuration"
    );
    debug!(
        login_url = %config.target.login_url,
        password_set = config.target.password.is_some(),
        headless = config.runtime.headless,
        slow_mo = ?config.runtime.slow_mo,
        "Target configuration"
    );
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
