//! Mailer errors

use thiserror::Error;

/// Mailer errors
#[derive(Debug, Error)]
pub enum MailerError {
    /// An address in the envelope was rejected by the backend
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// The backend could not represent the envelope
    #[error("Unable to construct the email message")]
    InvalidMessage(#[source] anyhow::Error),

    /// The backend call failed
    #[error("An error occurred while sending the email")]
    SendError(#[source] anyhow::Error),
}
