//! Developer CLI for `ConsentKit`.

mod simulation;

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use consentkit_core::pipeline::Pipeline;
use consentkit_core::rpc::InboundMessage;
use consentkit_core::{ConfigStore, ConsentGate, ConsentStore, GateConfig, LookupRegistry};
use eyre::{eyre, Result};
use serde_json::json;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

use simulation::{CmpMode, CmpScript};

#[derive(Parser)]
#[command(name = "consentkit", version)]
#[command(about = "Simulate consent-gated auctions and inspect CMP messages")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run gated auctions against a scripted CMP
    Simulate(SimulateArgs),

    /// Decode a window message as a `__cmpReturn` envelope
    Decode {
        /// Message payload as received by the window listener
        message: String,
    },
}

#[derive(Args)]
struct SimulateArgs {
    /// How the scripted CMP behaves
    #[arg(long, value_enum, default_value_t = CmpMode::Respond)]
    mode: CmpMode,

    /// Delay before the CMP answers, in milliseconds
    #[arg(long, default_value_t = 50)]
    delay_ms: u64,

    /// CMP framework to configure (`cmpApi`)
    #[arg(long, env = "CONSENTKIT_CMP_API", default_value = "iab")]
    cmp_api: String,

    /// Lookup timeout in milliseconds
    #[arg(long, env = "CONSENTKIT_TIMEOUT_MS", default_value_t = 10_000)]
    timeout_ms: u64,

    /// Cancel auctions when no consent data is available
    #[arg(long)]
    require_consent: bool,

    /// Consent string returned by the CMP
    #[arg(long, default_value = "BOEFEAyOEFEAyAHABDENAI4AAAB9vABAASA")]
    consent_string: String,

    /// Whether the CMP reports that GDPR applies
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    gdpr_applies: bool,

    /// Deliver CMP answers as JSON text instead of structured objects
    #[arg(long)]
    text: bool,

    /// Number of auctions to run; later ones reuse committed consent
    #[arg(long, default_value_t = 1)]
    auctions: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Simulate(args) => simulate(args).await,
        Command::Decode { message } => decode(message),
    }
}

async fn simulate(args: SimulateArgs) -> Result<()> {
    let iab = simulation::build_lookup(CmpScript {
        mode: args.mode,
        delay: Duration::from_millis(args.delay_ms),
        consent_string: args.consent_string,
        gdpr_applies: args.gdpr_applies,
        text_replies: args.text,
    });

    let store = Arc::new(ConsentStore::new());
    let gate = Arc::new(ConsentGate::new(
        Arc::new(LookupRegistry::with_defaults(iab)),
        Arc::clone(&store),
        GateConfig::default(),
    ));
    let pipeline = Arc::new(Pipeline::new(
        |(auction, proceed): (u32, oneshot::Sender<()>)| {
            tracing::info!(auction, "auction started");
            let _ = proceed.send(());
        },
    ));
    let config = ConfigStore::new();
    gate.attach(&pipeline, &config);
    config.set_config(json!({
        "consentManagement": {
            "cmpApi": args.cmp_api,
            "timeout": args.timeout_ms,
            "allowAuctionWithoutConsent": !args.require_consent,
        }
    }))?;

    let mut auctions = Vec::new();
    for auction in 1..=args.auctions {
        let (proceed, proceeded) = oneshot::channel();
        pipeline.invoke((auction, proceed)).await;
        let started = proceeded.await.is_ok();
        if !started {
            tracing::warn!(auction, "auction cancelled by the consent gate");
        }
        auctions.push(json!({ "auction": auction, "started": started }));
    }

    let report = json!({
        "auctions": auctions,
        "consentData": store.consent_data(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn decode(message: String) -> Result<()> {
    let ret = InboundMessage::from(message)
        .cmp_return()
        .ok_or_else(|| eyre!("message is not a __cmpReturn envelope"))?;
    println!("{}", serde_json::to_string_pretty(&ret)?);
    Ok(())
}
