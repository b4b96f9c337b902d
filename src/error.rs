use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `patchwarden`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum WardenError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Sandbox ─────────────────────────────────────────────────────────
    #[error("sandbox: {0}")]
    Sandbox(#[from] AccessDenied),

    // ── Command gate ────────────────────────────────────────────────────
    #[error("command: {0}")]
    Command(#[from] CommandRejected),

    // ── Audit / checkpoint persistence ──────────────────────────────────
    #[error("store: {0}")]
    Store(#[from] StoreError),

    // ── Model collaborator ──────────────────────────────────────────────
    #[error("model: {0}")]
    Model(#[from] ModelError),

    // ── Version control collaborator ────────────────────────────────────
    #[error("vcs: {0}")]
    Vcs(String),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Sandbox errors ──────────────────────────────────────────────────────────

/// A path was refused by the sandbox resolver. Never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessDenied {
    #[error("empty path")]
    Empty,

    #[error("path contains a NUL byte")]
    NulByte,

    #[error("encoded traversal sequence in '{0}'")]
    EncodedTraversal(String),

    #[error("'{0}' resolves outside every sandbox root")]
    OutsideRoots(String),

    #[error("'{path}' touches restricted entry '{entry}'")]
    Restricted { path: String, entry: String },

    #[error("'{0}' escapes the sandbox through a symlink")]
    SymlinkEscape(String),
}

// ─── Command gate errors ─────────────────────────────────────────────────────

/// A shell command was refused before any subprocess was spawned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandRejected {
    #[error("empty command")]
    Empty,

    #[error("command contains disallowed character sequence '{0}'")]
    Metacharacter(String),

    #[error("command contains an unbalanced quote")]
    UnbalancedQuote,

    #[error("'{0}' does not match any allowed command prefix")]
    NotAllowlisted(String),
}

// ─── Store errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("open failed: {0}")]
    Open(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("unknown {kind} value '{value}' in stored row")]
    Decode { kind: &'static str, value: String },
}

// ─── Model errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("request to {endpoint} failed: {message}")]
    Request { endpoint: String, message: String },

    #[error("{endpoint} returned status {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("response contained no choices")]
    EmptyResponse,
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, WardenError>;
