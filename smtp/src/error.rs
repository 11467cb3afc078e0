use thiserror::Error;

#[derive(Debug, Error)]
pub enum SmtpError {
    #[error("invalid mailbox: {0}")]
    Mailbox(#[from] lettre::address::AddressError),

    #[error("could not build message: {0}")]
    Build(#[from] lettre::error::Error),

    /// Handshake failed on both the primary and the alternate endpoint.
    /// Fatal for the account within the current campaign run.
    #[error("smtp connect to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("message rejected: {0}")]
    Send(#[from] lettre::transport::smtp::Error),

    #[error("attachment {name}: {source}")]
    Attachment {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported attachment content type: {0}")]
    ContentType(String),
}
