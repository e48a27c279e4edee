use std::time::Duration;

/// Tron mainnet chain id (`0x2b6653dc`), as reported by `eth_chainId`.
pub const TRON_MAINNET_CHAIN_ID: u64 = 728_126_428;

/// Literal domain tag that opens every packed transfer message.
pub const DOMAIN_TAG: &str = "Smooth";

/// USDT (TRC-20) on Tron mainnet.
pub const USDT_ADDRESS: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

/// USDT has 6 decimal places.
pub const USDT_DECIMALS: u8 = 6;

/// Account that receives the protocol fee on every routed transfer.
pub const FEE_COLLECTOR: &str = "TPvSv9BofZrXP4NtkuSmY6X4qFt41yEF6x";

/// Fixed protocol fee, in USDT, paid by the sender on top of the amount.
pub const SMOOTH_FEE: &str = "1.5";

/// Ethereum-compatible JSON-RPC endpoint of a Tron full node.
pub const RPC_URL: &str = "https://api.trongrid.io/jsonrpc";

/// Tron full-node HTTP API, used to build, broadcast and confirm approvals.
pub const TRON_API_URL: &str = "https://api.trongrid.io";

/// Energy ceiling for the approve call, in sun (100 TRX).
pub const APPROVE_FEE_LIMIT_SUN: u64 = 100_000_000;

/// Interval between transaction-info polls while an approval confirms.
pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Block explorer base URL.
pub const EXPLORER_BASE: &str = "https://tronscan.org";

/// Namespace of the persisted approval flag.
pub const APPROVAL_KEY_PREFIX: &str = "smooth:approval";

/// Value stored under the approval key once the router is known to be approved.
pub const APPROVAL_GRANTED: &str = "granted";

pub const CHAIN_READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const APPROVAL_CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);
pub const RELAY_TIMEOUT: Duration = Duration::from_secs(60);
