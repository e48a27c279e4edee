use std::process::ExitCode;
use std::sync::Arc;

use alloy::signers::local::PrivateKeySigner;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smooth::{
    ApprovalCache, ApprovalGate, ApprovalOutcome, InMemoryApprovalCache, SmoothConfig,
    SqliteApprovalCache, TronAddress, TronApiClient,
};

const USAGE: &str = "usage: smooth-approve [--status | --clear-cache]";

enum Command {
    Approve,
    Status,
    ClearCache,
}

fn parse_args() -> Result<Command, String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] => Ok(Command::Approve),
        ["--status"] => Ok(Command::Status),
        ["--clear-cache"] => Ok(Command::ClearCache),
        _ => Err(USAGE.to_string()),
    }
}

fn open_cache(config: &SmoothConfig) -> Result<Arc<dyn ApprovalCache>, smooth::SmoothError> {
    Ok(match &config.approval_db_path {
        Some(path) => Arc::new(SqliteApprovalCache::open(path)?),
        None => Arc::new(InMemoryApprovalCache::new()),
    })
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let command = parse_args()?;
    let config = SmoothConfig::from_env()?;
    let cache = open_cache(&config)?;

    if let Command::ClearCache = command {
        if config.approval_db_path.is_none() {
            println!("SMOOTH_APPROVAL_DB is not set; there is no persisted approval to clear.");
            return Ok(());
        }
        let removed = cache.clear()?;
        println!("Cleared {removed} cached approval(s). The next send re-checks on chain.");
        return Ok(());
    }

    let key = std::env::var("SMOOTH_PRIVATE_KEY")
        .map_err(|_| "SMOOTH_PRIVATE_KEY environment variable is required")?;
    let signer: PrivateKeySigner = key
        .parse()
        .map_err(|_| "SMOOTH_PRIVATE_KEY is not a valid secp256k1 key")?;
    let owner = TronAddress::from(signer.address());

    if config.approve_amount == alloy::primitives::U256::MAX {
        tracing::warn!("granting the router unlimited allowance; set SMOOTH_APPROVE_AMOUNT to bound it");
    }

    println!("Approving Smooth router for TRC-20 token...");
    println!("  Owner:  {owner}");
    println!("  Router: {}", config.router);
    println!("  Token:  {}", config.token);
    println!("  Amount: {}", config.approve_amount);

    let chain = Arc::new(TronApiClient::from_config(&config)?.with_signer(Arc::new(signer)));
    let block = chain.health_check().await?;
    tracing::debug!(block, "tron node reachable");

    let gate = ApprovalGate::new(chain, cache, owner, &config);

    if let Command::Status = command {
        println!("\nCached:   {:?}", gate.cached_status());
        println!("On chain: {:?}", gate.on_chain_status().await?);
        return Ok(());
    }

    let check = gate.check_approval().await;
    match check.outcome {
        ApprovalOutcome::AlreadyGranted => {
            println!("\nRouter already has sufficient allowance -- nothing to do.")
        }
        ApprovalOutcome::GrantedNow => println!("\nApproval confirmed."),
        ApprovalOutcome::NotGrantedFailed { cause } => return Err(cause.into()),
    }
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
