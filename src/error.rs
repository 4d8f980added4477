use thiserror::Error;

/// Result type for Yeelight operations
pub type Result<T> = std::result::Result<T, YeelightError>;

/// Errors that can occur when interacting with Yeelight bulbs
#[derive(Error, Debug)]
pub enum YeelightError {
    /// Could not open the TCP connection to the bulb
    #[error("cannot connect to {addr}: {source}")]
    Dial {
        /// Address of the command endpoint that refused us
        addr: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Connection was closed while a call was outstanding
    #[error("connection closed")]
    ConnectionClosed,

    /// Request timed out waiting for its result
    #[error("request timeout")]
    Timeout,

    /// The bulb rejected a command
    #[error("device error {code}: {message}")]
    Device {
        /// Error code reported by the bulb
        code: i64,
        /// Error message reported by the bulb
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Discovery produced no reply within its timeout
    #[error("no devices found")]
    NotFound,

    /// Discovery reply carried no usable Location header
    #[error("invalid discovery reply: {0}")]
    InvalidReply(String),

    /// Brightness outside the 1-100 range accepted by the bulb
    #[error("brightness {0} out of range (1-100)")]
    InvalidBrightness(u8),
}
