#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{TxHash, U256};
use alloy::signers::local::PrivateKeySigner;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

use smooth::{
    ApprovalCache, ChainClient, Credential, Relay, SignedTransfer, SmoothConfig, SmoothError,
    TransactionId, TronAddress,
};

pub const RECIPIENT: &str = "TPvSv9BofZrXP4NtkuSmY6X4qFt41yEF6x";

pub fn router() -> TronAddress {
    TronAddress::new([0x5a; 20])
}

pub fn config() -> SmoothConfig {
    SmoothConfig::new(router(), "http://relay.invalid").unwrap()
}

pub fn signer() -> (TronAddress, Arc<dyn Credential>) {
    let signer = PrivateKeySigner::random();
    let sender = TronAddress::from(signer.address());
    let credential: Arc<dyn Credential> = Arc::new(signer);
    (sender, credential)
}

pub fn granted(cache: &dyn ApprovalCache, owner: TronAddress) {
    cache
        .mark_granted(&smooth::approval_key(owner, router()))
        .unwrap();
}

/// In-process chain with call counters.
#[derive(Default)]
pub struct FakeChain {
    pub nonce: Mutex<U256>,
    pub allowance: Mutex<U256>,
    pub balance: Mutex<U256>,
    pub nonce_reads: AtomicUsize,
    pub allowance_reads: AtomicUsize,
    pub balance_reads: AtomicUsize,
    pub approvals: AtomicUsize,
    pub fail_nonce: AtomicBool,
    pub deny_approve: AtomicBool,
    pub stall_balance: AtomicBool,
}

impl FakeChain {
    pub fn with_nonce(nonce: u64) -> Self {
        let chain = Self::default();
        *chain.nonce.lock().unwrap() = U256::from(nonce);
        chain
    }

    pub fn calls(&self) -> usize {
        self.nonce_reads.load(Ordering::SeqCst)
            + self.allowance_reads.load(Ordering::SeqCst)
            + self.balance_reads.load(Ordering::SeqCst)
            + self.approvals.load(Ordering::SeqCst)
    }

    /// What the router does after executing a transfer.
    pub fn advance_nonce(&self) {
        let mut nonce = self.nonce.lock().unwrap();
        *nonce += U256::from(1u8);
    }
}

impl ChainClient for FakeChain {
    async fn router_nonce(&self, _router: TronAddress, _owner: TronAddress) -> Result<U256, SmoothError> {
        self.nonce_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_nonce.load(Ordering::SeqCst) {
            return Err(SmoothError::ChainUnavailable("connection refused".into()));
        }
        Ok(*self.nonce.lock().unwrap())
    }

    async fn allowance(
        &self,
        _token: TronAddress,
        _owner: TronAddress,
        _spender: TronAddress,
    ) -> Result<U256, SmoothError> {
        self.allowance_reads.fetch_add(1, Ordering::SeqCst);
        Ok(*self.allowance.lock().unwrap())
    }

    async fn balance_of(&self, _token: TronAddress, _owner: TronAddress) -> Result<U256, SmoothError> {
        self.balance_reads.fetch_add(1, Ordering::SeqCst);
        if self.stall_balance.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(*self.balance.lock().unwrap())
    }

    async fn approve(
        &self,
        _token: TronAddress,
        _spender: TronAddress,
        amount: U256,
    ) -> Result<TxHash, SmoothError> {
        self.approvals.fetch_add(1, Ordering::SeqCst);
        if self.deny_approve.load(Ordering::SeqCst) {
            return Err(SmoothError::ApprovalDenied("approve reverted".into()));
        }
        *self.allowance.lock().unwrap() = amount;
        Ok(TxHash::repeat_byte(0xab))
    }
}

pub enum RelayBehavior {
    Accept,
    Reject { status: u16, reason: &'static str },
    Stall,
}

struct RelayInner {
    behavior: RelayBehavior,
    /// Chain whose nonce advances when a transfer is accepted.
    chain: Option<Arc<FakeChain>>,
    hold: bool,
    release: Notify,
    submitted: Mutex<Vec<SignedTransfer>>,
}

/// Relay double that records every submission.
#[derive(Clone)]
pub struct FakeRelay {
    inner: Arc<RelayInner>,
}

impl FakeRelay {
    pub fn new(behavior: RelayBehavior) -> Self {
        Self::build(behavior, None, false)
    }

    /// Accepts and advances `chain`'s nonce, like a mined transfer.
    pub fn executing(chain: Arc<FakeChain>) -> Self {
        Self::build(RelayBehavior::Accept, Some(chain), false)
    }

    /// Accepts, but only after [`FakeRelay::release`].
    pub fn held() -> Self {
        Self::build(RelayBehavior::Accept, None, true)
    }

    fn build(behavior: RelayBehavior, chain: Option<Arc<FakeChain>>, hold: bool) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                behavior,
                chain,
                hold,
                release: Notify::new(),
                submitted: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn release(&self) {
        self.inner.release.notify_one();
    }

    pub fn count(&self) -> usize {
        self.inner.submitted.lock().unwrap().len()
    }

    pub fn nonces(&self) -> Vec<U256> {
        self.inner
            .submitted
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.nonce)
            .collect()
    }

    pub fn take(&self) -> Vec<SignedTransfer> {
        std::mem::take(&mut *self.inner.submitted.lock().unwrap())
    }
}

impl Relay for FakeRelay {
    async fn submit_transfer(&self, transfer: SignedTransfer) -> Result<TransactionId, SmoothError> {
        let n = {
            let mut submitted = self.inner.submitted.lock().unwrap();
            submitted.push(transfer);
            submitted.len()
        };
        if self.inner.hold {
            self.inner.release.notified().await;
        }
        match &self.inner.behavior {
            RelayBehavior::Accept => {
                if let Some(chain) = &self.inner.chain {
                    chain.advance_nonce();
                }
                Ok(TransactionId(format!("tx{n}")))
            }
            RelayBehavior::Reject { status, reason } => Err(SmoothError::RelayRejected {
                status: Some(*status),
                reason: reason.to_string(),
                body: format!(r#"{{"error":"{reason}"}}"#),
            }),
            RelayBehavior::Stall => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(SmoothError::RelayRejected {
                    status: None,
                    reason: "stalled".into(),
                    body: String::new(),
                })
            }
        }
    }
}

/// One request as the stub server received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub head: String,
    pub body: String,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }

    pub fn path(&self) -> &str {
        self.head.split_whitespace().nth(1).unwrap_or("")
    }

    pub fn header(&self, name: &str) -> Option<String> {
        let prefix = format!("{}:", name.to_ascii_lowercase());
        self.head
            .lines()
            .find(|l| l.to_ascii_lowercase().starts_with(&prefix))
            .map(|l| l[prefix.len()..].trim().to_string())
    }
}

/// Minimal HTTP/1.1 server answering every request with a fixed response.
pub struct StubServer {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last(&self) -> RecordedRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }

    pub fn to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path() == path)
            .cloned()
            .collect()
    }
}

pub async fn spawn_stub(status: u16, body: &'static str) -> StubServer {
    spawn_stub_with(status, "", body, false).await
}

/// `extra_headers` are raw `Name: value\r\n` lines. A silent stub reads the
/// request and never answers.
pub async fn spawn_stub_with(
    status: u16,
    extra_headers: &'static str,
    body: &'static str,
    silent: bool,
) -> StubServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let recorded = recorded.clone();
            tokio::spawn(async move {
                let Some(request) = read_request(&mut socket).await else {
                    return;
                };
                recorded.lock().unwrap().push(request);
                if silent {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    return;
                }
                let response = format!(
                    "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\n{extra_headers}Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    StubServer {
        base_url: format!("http://{addr}"),
        requests,
    }
}

/// Answers each path with its scripted bodies in order, repeating the last
/// one. Unknown paths get a 404.
pub async fn spawn_routes(routes: Vec<(&'static str, Vec<String>)>) -> StubServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let recorded = requests.clone();
    let routes = Arc::new(routes);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let recorded = recorded.clone();
            let routes = routes.clone();
            tokio::spawn(async move {
                let Some(request) = read_request(&mut socket).await else {
                    return;
                };
                let path = request.path().to_string();
                let seen = {
                    let mut recorded = recorded.lock().unwrap();
                    recorded.push(request);
                    recorded.iter().filter(|r| r.path() == path).count()
                };
                let (status, body) = match routes.iter().find(|(p, _)| *p == path) {
                    Some((_, bodies)) if !bodies.is_empty() => {
                        (200, bodies[(seen - 1).min(bodies.len() - 1)].clone())
                    }
                    _ => (404, String::new()),
                };
                let response = format!(
                    "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    StubServer {
        base_url: format!("http://{addr}"),
        requests,
    }
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);

        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_string();
        let len = head
            .lines()
            .find_map(|l| {
                let lower = l.to_ascii_lowercase();
                lower
                    .strip_prefix("content-length:")
                    .and_then(|v| v.trim().parse::<usize>().ok())
            })
            .unwrap_or(0);
        let start = end + 4;
        while buf.len() < start + len {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let body = String::from_utf8_lossy(&buf[start..start + len]).to_string();
        return Some(RecordedRequest { head, body });
    }
}
