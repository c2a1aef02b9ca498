//! Portfolio Engine
//!
//! Runs a live portfolio session for one user, or submits a single order and
//! exits.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use portfolio_service::{
    graceful_shutdown, initialize_logging_with_config, install_metrics_exporter, load_configuration,
    setup_signal_handlers, PortfolioSession, SessionStatus,
};
use portfolio_types::{Credentials, Decimal, OrderIntent, OrderMode, Side, TicketId};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "portfolio-engine", version, about = "Real-time portfolio valuation and order engine")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, env = "PORTFOLIO_CONFIG")]
    config: Option<PathBuf>,

    /// User whose portfolio is tracked
    #[arg(long, env = "PORTFOLIO_USER_ID")]
    user_id: String,

    /// Bearer token for the portfolio API
    #[arg(long, env = "PORTFOLIO_TOKEN", hide_env_values = true)]
    token: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Track the portfolio until interrupted
    Run,
    /// Submit a buy order
    Buy(OrderArgs),
    /// Submit a sell order
    Sell(OrderArgs),
}

#[derive(Args)]
struct OrderArgs {
    /// Instrument id or ticker
    #[arg(long)]
    instrument: String,

    #[arg(long)]
    quantity: u32,

    /// Arm a conditional order at this price instead of trading now
    #[arg(long)]
    limit: Option<Decimal>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = load_configuration(cli.config.as_deref())?;
    let _log_guard = initialize_logging_with_config(&config.logging)?;
    install_metrics_exporter(&config.metrics)?;

    info!("Starting Portfolio Engine v{}", env!("CARGO_PKG_VERSION"));

    let catalog = config.load_catalog()?;
    info!("Instrument catalog loaded ({} instruments)", catalog.len());

    let credentials = Credentials::new(cli.user_id, cli.token);
    let session = PortfolioSession::start(&config, credentials, catalog)
        .await
        .context("Failed to start portfolio session")?;

    match cli.command {
        Command::Run => run(session, config.service.shutdown_timeout()).await,
        Command::Buy(args) => place_order(session, Side::Buy, args, &config).await,
        Command::Sell(args) => place_order(session, Side::Sell, args, &config).await,
    }
}

async fn run(session: PortfolioSession, shutdown_timeout: std::time::Duration) -> Result<()> {
    let mut shutdown_signal = setup_signal_handlers()?;
    let mut views = session.subscribe();
    let mut notices = session.notices();
    let mut outcomes = session.order_outcomes();
    let mut status = session.status();
    let mut last_summary = session.view().summary.clone();

    info!("Portfolio Engine is running. Press Ctrl+C to shutdown gracefully.");
    loop {
        tokio::select! {
            _ = shutdown_signal.recv() => break,
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let summary = views.borrow_and_update().summary.clone();
                if summary != last_summary {
                    info!(
                        "Portfolio value {} invested {} gain/loss {} ({}%)",
                        summary.total_value,
                        summary.invested_capital,
                        summary.total_gain_loss,
                        summary.total_gain_loss_percent
                    );
                    last_summary = summary;
                }
            }
            notice = notices.recv() => match notice {
                Ok(notice) => info!(
                    "Order executed: {} {} x {} @ {}",
                    notice.side, notice.instrument_id, notice.quantity, notice.executed_price
                ),
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} execution notices", skipped),
                Err(RecvError::Closed) => break,
            },
            outcome = outcomes.recv() => match outcome {
                Ok(outcome) => info!("Order {} resolved: {:?}", outcome.key, outcome.state),
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} order outcomes", skipped),
                Err(RecvError::Closed) => break,
            },
            changed = status.changed() => {
                if changed.is_err() || *status.borrow_and_update() == SessionStatus::AuthRejected {
                    warn!("Session can no longer refresh; stopping");
                    break;
                }
            }
        }
    }

    graceful_shutdown(session, shutdown_timeout).await;
    info!("Portfolio Engine shutdown complete");
    Ok(())
}

async fn place_order(
    session: PortfolioSession,
    side: Side,
    args: OrderArgs,
    config: &portfolio_service::ServiceConfig,
) -> Result<()> {
    let instrument = session
        .catalog()
        .resolve(&args.instrument)
        .ok_or_else(|| anyhow!("Unknown instrument: {}", args.instrument))?;

    let intent = match args.limit {
        Some(limit) => OrderIntent::conditional(TicketId::new(), instrument, side, args.quantity, limit),
        None => {
            let tick = session
                .wait_for_price(instrument, config.service.price_wait())
                .await
                .with_context(|| format!("No price for {} yet", args.instrument))?;
            info!("Last price for {}: {}", args.instrument, tick.price);
            OrderIntent::instant(TicketId::new(), instrument, side, args.quantity)
        }
    };

    let result = session.submit(intent).await;
    let outcome = match result {
        Ok(receipt) => {
            let verb = match receipt.mode {
                OrderMode::Instant => "accepted",
                OrderMode::Conditional { .. } => "armed",
            };
            println!("Order {} {}", receipt.key, verb);
            println!("{}", serde_json::to_string_pretty(&receipt.acknowledgement)?);
            Ok(())
        }
        Err(e) => Err(anyhow!(e)).context("Order submission failed"),
    };

    graceful_shutdown(session, config.service.shutdown_timeout()).await;
    outcome
}
