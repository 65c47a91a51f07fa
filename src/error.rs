use thiserror::Error;

pub use color_eyre::eyre::eyre;

pub type Result<T> = core::result::Result<T, Error>;

/// The classification of a `-`/`!` reply, per the leading whitespace-delimited token.
///
/// `MOVED`/`ASK`/`CROSSSLOT` are cluster-routing kinds; the core surfaces them but never
/// follows a redirect itself (see the open question in SPEC_FULL.md §9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Generic,
    NoGroup,
    BusyGroup,
    Moved { slot: u16, endpoint: String },
    Ask { slot: u16, endpoint: String },
    CrossSlot,
}

impl ErrorKind {
    /// Classify a server error message by its leading token, e.g. `"WRONGTYPE Operation..."`.
    pub fn classify(message: &str) -> (Self, &str) {
        let Some((token, rest)) = message.split_once(' ') else {
            return (Self::from_token(message), "");
        };
        match token {
            "MOVED" | "ASK" => {
                // "<slot> <ip>:<port>"
                let mut parts = rest.split_whitespace();
                let slot = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
                let endpoint = parts.next().unwrap_or_default().to_string();
                let kind = if token == "MOVED" {
                    Self::Moved { slot, endpoint }
                } else {
                    Self::Ask { slot, endpoint }
                };
                (kind, rest)
            }
            _ => (Self::from_token(token), rest),
        }
    }

    fn from_token(token: &str) -> Self {
        match token {
            "NOGROUP" => Self::NoGroup,
            "BUSYGROUP" => Self::BusyGroup,
            "CROSSSLOT" => Self::CrossSlot,
            _ => Self::Generic,
        }
    }
}

/// A parsed `-`/`!` reply: the classified kind plus the full message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ServerError {
    pub fn parse(message: impl Into<String>) -> Self {
        let message = message.into();
        let (kind, _) = ErrorKind::classify(&message);
        Self { kind, message }
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ServerError {}

#[derive(Debug, Error)]
pub enum Error {
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("bad configuration: {0}")]
    Config(String),

    #[error("pool is closed")]
    PoolClosed,

    #[error("timed out waiting for a pooled connection")]
    CheckoutTimeout,

    #[error("pipeline future read before the drain loop resolved it")]
    FutureNotResolved,

    #[error("pipeline resolution failed at index {index}: {source}")]
    PipelineResolution {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("command has no routable key")]
    MissingKey,

    #[error("unsupported cluster topology: {0}")]
    UnsupportedTopology(String),

    #[error("unexpected reply shape for this command: {0:?}")]
    TypeMismatch(crate::value::Value),

    #[error("a bug in zero-redis: {0}")]
    Bug(color_eyre::Report),
}

impl Error {
    pub fn from_debug(err: impl std::fmt::Debug) -> Self {
        Self::Bug(color_eyre::eyre::eyre!(format!("{:#?}", err)))
    }
}

impl From<core::convert::Infallible> for Error {
    fn from(err: core::convert::Infallible) -> Self {
        match err {}
    }
}
