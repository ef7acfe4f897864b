use std::time::Duration;
use tracing::{error, info, warn};

use hitl_verify::{load_config, ChromiumSession, VerificationHandler};

const WATCH_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
struct CliArgs {
    cdp: Option<String>,
    destination: Option<String>,
    next_step: Option<String>,
    watch: bool,
}

fn parse_args() -> CliArgs {
    let mut parsed = CliArgs::default();
    let mut args = std::env::args().skip(1);
    while let Some(a) = args.next() {
        match a.as_str() {
            "--cdp" => parsed.cdp = args.next(),
            "--destination" => parsed.destination = args.next(),
            "--next-step" => parsed.next_step = args.next(),
            "--watch" => parsed.watch = true,
            other => {
                if let Some(rest) = other.strip_prefix("--cdp=") {
                    parsed.cdp = Some(rest.to_string());
                } else if let Some(rest) = other.strip_prefix("--destination=") {
                    parsed.destination = Some(rest.to_string());
                } else if let Some(rest) = other.strip_prefix("--next-step=") {
                    parsed.next_step = Some(rest.to_string());
                } else {
                    warn!("ignoring unknown argument: {}", other);
                }
            }
        }
    }
    parsed
}

fn usage() -> &'static str {
    "usage: hitl-verify --cdp <ws-url> --destination <pattern> [--next-step <label>] [--watch]"
}

/// One checkpoint, or a watch loop that keeps the attempt count across checks.
async fn run(
    handler: &mut VerificationHandler,
    destination: &str,
    next_step: &str,
    watch: bool,
) -> anyhow::Result<()> {
    let outcome = if watch {
        handler.watch(destination, next_step, WATCH_INTERVAL).await?
    } else {
        handler.begin_iteration();
        handler.checkpoint(destination, next_step).await?
    };
    info!("checkpoint outcome: {:?}", outcome);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = parse_args();
    let (Some(cdp), Some(destination)) = (args.cdp.as_deref(), args.destination.as_deref()) else {
        eprintln!("{}", usage());
        std::process::exit(2);
    };
    let next_step = args.next_step.as_deref().unwrap_or("continue");

    let settings = load_config().resolve();
    info!(
        "hitl-verify starting (timeout={}s, max_attempts={}, notifications={})",
        settings.timeout.as_secs(),
        settings.max_attempts,
        settings.notifications_enabled
    );

    let session = ChromiumSession::attach(cdp).await?;
    let mut handler = VerificationHandler::new(session.driver.clone(), settings);

    let result = tokio::select! {
        r = run(&mut handler, destination, next_step, args.watch) => r,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, stopping");
            Ok(())
        }
    };

    println!("{}", serde_json::to_string_pretty(&handler.event_summary())?);

    if let Err(e) = &result {
        error!("verification run failed: {}", e);
    }
    result
}
