// Runs one checkout end-to-end against the configured backend
//
// usage: checkout <context.json> <user-id> <user-email> <card-id> [trip-id | --new-trip NAME]

use anyhow::{bail, Context, Result};
use checkout_orchestrator::{
    BookingContext, BookingError, CheckoutConfig, CheckoutOrchestrator, HttpBackend,
    InMemoryClientMappings, TripMode, UserIdentity,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

enum TripArg {
    Default,
    Existing(String),
    New(String),
}

fn parse_trip(rest: &[String]) -> Result<TripArg> {
    match rest {
        [] => Ok(TripArg::Default),
        [flag, name] if flag == "--new-trip" => Ok(TripArg::New(name.clone())),
        [flag] if flag == "--new-trip" => Ok(TripArg::New(String::new())),
        [trip_id] => Ok(TripArg::Existing(trip_id.clone())),
        _ => bail!("unexpected trailing arguments: {:?}", rest),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "checkout_orchestrator=debug,checkout=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 4 {
        bail!("usage: checkout <context.json> <user-id> <user-email> <card-id> [trip-id | --new-trip NAME]");
    }
    let trip = parse_trip(&args[4..])?;

    let raw = std::fs::read_to_string(&args[0])
        .with_context(|| format!("reading booking context from {}", args[0]))?;
    let params: HashMap<String, String> =
        serde_json::from_str(&raw).context("booking context must be a flat JSON object of strings")?;
    let context = BookingContext::from_params(&params);

    let config = CheckoutConfig::from_env().context("loading configuration")?;
    info!(base_url = %config.base_url, "Starting checkout");

    let backend = Arc::new(HttpBackend::new(&config)?);
    let checkout = CheckoutOrchestrator::new(
        backend,
        Arc::new(InMemoryClientMappings::new()),
        UserIdentity::new(args[1].clone(), args[2].clone()),
        &config,
    );

    let snapshot = checkout.load().await.context("resolving client")?;
    info!(client_id = %snapshot.client_id, "Client resolved");
    if let Err(e) = &snapshot.cards {
        bail!("cards unavailable: {}", e);
    }

    checkout.select_card(&args[3])?;
    match trip {
        TripArg::Default => {}
        TripArg::Existing(trip_id) => {
            checkout.select_trip(&trip_id)?;
        }
        TripArg::New(name) => {
            checkout.set_trip_mode(TripMode::New);
            checkout.set_new_trip_name(&name);
        }
    }

    let result = checkout.submit(&context).await;
    checkout.leave_checkout();

    match result {
        Ok(confirmation) => {
            println!("{}", confirmation.id);
            Ok(())
        }
        Err(BookingError::Rejected(classification)) => {
            error!(kind = ?classification.kind, remedy = ?classification.remedy(), "Booking rejected");
            bail!("{}", classification.user_message)
        }
        Err(e) => Err(e.into()),
    }
}
