use thiserror::Error;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Roster error: {0}")]
    Roster(#[from] RosterError),

    #[error("Record store error: {0}")]
    Record(#[from] RecordError),

    #[error("{0}")]
    Retry(#[from] RetryError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("A distribution run is already active in this process")]
    AlreadyRunning,

    #[error("Restart limit reached after {restarts} restarts: {last_error}")]
    RestartsExhausted { restarts: u32, last_error: String },
}

impl AppError {
    /// Whether a whole-run restart can make progress past this error.
    ///
    /// Roster validation and configuration problems fail identically on every
    /// attempt, so the supervisor gives up on them immediately.
    pub fn is_restartable(&self) -> bool {
        !matches!(
            self,
            AppError::Roster(_)
                | AppError::Config(_)
                | AppError::InvalidInput(_)
                | AppError::AlreadyRunning
                | AppError::RestartsExhausted { .. }
        )
    }
}

/// Ledger gateway errors
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("RPC call failed: {0}")]
    Rpc(String),

    #[error("Contract call failed: {0}")]
    Contract(String),

    #[error("Signer error: {0}")]
    Signer(String),

    #[error("Submission requires a signer but none is configured")]
    ReadOnly,

    #[error("Value {value} does not fit a block height")]
    HeightOverflow { value: String },
}

/// Roster load and validation errors
#[derive(Error, Debug)]
pub enum RosterError {
    #[error("Failed to read roster {path}: {message}")]
    Io { path: String, message: String },

    #[error("Malformed roster row at line {line}: {message}")]
    Malformed { line: u64, message: String },

    #[error("Duplicate wallet {wallet} at line {line} (first seen at line {first_line})")]
    DuplicateWallet {
        wallet: String,
        first_line: u64,
        line: u64,
    },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount for {wallet}: {amount:?}")]
    InvalidAmount { wallet: String, amount: String },
}

/// Attempt record store errors
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Record store I/O on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Record store CSV on {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Raised by the retry executor once every attempt has failed
#[derive(Error, Debug)]
pub enum RetryError {
    #[error("RetryExhausted: {operation} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
