use std::process::ExitCode;
use std::sync::Arc;

use alloy::signers::local::PrivateKeySigner;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smooth::{
    ApprovalCache, Credential, InMemoryApprovalCache, RelayClient, SmoothConfig,
    SqliteApprovalCache, TokenAmount, TransferOrchestrator, TransferState, TronAddress, TronApiClient,
};

const USAGE: &str = "usage: smooth-send <recipient> <amount> [--balance <amount>]";

struct Args {
    recipient: String,
    amount: String,
    balance: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut positional = Vec::new();
    let mut balance = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--balance" => balance = Some(args.next().ok_or(USAGE)?),
            "-h" | "--help" => return Err(USAGE.to_string()),
            _ => positional.push(arg),
        }
    }
    match <[String; 2]>::try_from(positional) {
        Ok([recipient, amount]) => Ok(Args {
            recipient,
            amount,
            balance,
        }),
        Err(_) => Err(USAGE.to_string()),
    }
}

fn describe(state: &TransferState) -> Option<String> {
    match state {
        TransferState::Idle => None,
        TransferState::ApprovalPending => Some("checking router approval...".into()),
        TransferState::NonceResolving => Some("reading router nonce...".into()),
        TransferState::Signing => Some("signing transfer...".into()),
        TransferState::Relaying => Some("submitting to relay...".into()),
        TransferState::Succeeded { tx_id } => Some(format!("relayed: {tx_id}")),
        TransferState::Failed { cause, reason } => Some(format!("failed ({cause:?}): {reason}")),
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args()?;
    let config = SmoothConfig::from_env()?;

    let key = std::env::var("SMOOTH_PRIVATE_KEY")
        .map_err(|_| "SMOOTH_PRIVATE_KEY environment variable is required")?;
    let signer: PrivateKeySigner = key
        .parse()
        .map_err(|_| "SMOOTH_PRIVATE_KEY is not a valid secp256k1 key")?;
    let sender = TronAddress::from(signer.address());


    // SQLite keeps the approval across runs; without a path it lasts this run only.
    let cache: Arc<dyn ApprovalCache> = match &config.approval_db_path {
        Some(path) => Arc::new(SqliteApprovalCache::open(path)?),
        None => Arc::new(InMemoryApprovalCache::new()),
    };
    let relay = RelayClient::from_config(&config)?;
    let credential: Arc<dyn Credential> = Arc::new(signer);
    let chain = Arc::new(TronApiClient::from_config(&config)?.with_signer(credential.clone()));

    let orchestrator = TransferOrchestrator::new(
        config.clone(),
        sender,
        Some(credential),
        chain,
        cache,
        relay,
    );

    let balance = match &args.balance {
        Some(raw) => TokenAmount::parse(raw, config.token_decimals)?,
        None => orchestrator.fetch_balance().await?,
    };

    println!("Sending via Smooth router...");
    println!("  From:    {sender}");
    println!("  To:      {}", args.recipient.trim());
    println!("  Amount:  {}", args.amount.trim());
    println!("  Fee:     {}", config.fee);
    println!("  Balance: {balance}");

    let mut events = orchestrator.subscribe();
    let progress = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(state) => {
                    if let Some(line) = describe(&state) {
                        println!("  ... {line}");
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = orchestrator
        .transfer(&args.recipient, &args.amount, &balance)
        .await;

    // Closing the channel ends the progress task once it has printed everything.
    drop(orchestrator);
    let _ = progress.await;

    let receipt = result?;
    println!("\nTransfer relayed (nonce {}).", receipt.nonce);
    println!("  tx: {}", receipt.tx_id);
    println!("  {}", config.explorer_link(receipt.tx_id.as_str()));
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
