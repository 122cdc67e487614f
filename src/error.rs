use thiserror::Error;

/// Errors raised while setting up or tearing down the miner fleet.
///
/// Service-side failures never show up here; they are absorbed by each
/// account session and turned into state transitions.
#[derive(Error, Debug)]
pub enum MinerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No valid private keys found; nothing to run")]
    NothingToRun,

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Egress error: {0}")]
    Egress(#[from] EgressError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type MinerResult<T> = Result<T, MinerError>;

/// A key record that could not be turned into a signing identity.
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid private key at line {line}: not valid base58 ({source})")]
    InvalidBase58 {
        line: usize,
        #[source]
        source: bs58::decode::Error,
    },

    #[error("Invalid private key at line {line}: expected 32 or 64 bytes, got {len}")]
    InvalidLength { line: usize, len: usize },

    #[error("Invalid private key at line {line}: public half does not match secret")]
    InvalidKeypair { line: usize },
}

/// A proxy line that does not describe a usable egress path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EgressError {
    #[error(
        "Invalid proxy format: {line}. Expected 'socks5://[user:pass@]host:port' or 'http(s)://[user:pass@]host:port', skipping."
    )]
    InvalidFormat { line: String },

    #[error("Invalid proxy port in {line}: {port}")]
    InvalidPort { line: String, port: String },
}
