//! Error types for the email service

use thiserror::Error;
use tracing::debug;

use super::{envelope::MimeError, mailer::MailerError, registry::RegistryError};

/// Errors that can occur when sending an e-mail
#[derive(Debug, Error)]
pub enum SendEmailError {
    /// No mail sender is configured for the municipality
    #[error("No mail sender exists for municipalityId {municipality_id}")]
    NoSenderConfigured {
        /// The municipality id that was looked up
        municipality_id: String,
    },

    /// The request could not be assembled into an e-mail
    #[error("Unable to send e-mail")]
    InvalidMessage(#[source] MimeError),

    /// The backend failed to send the e-mail
    #[error("Unable to send e-mail")]
    SendFailed(#[source] MailerError),
}

impl From<RegistryError> for SendEmailError {
    fn from(err: RegistryError) -> Self {
        debug!("RegistryError -> SendEmailError");

        match err {
            RegistryError::NoSenderConfigured(municipality_id) => {
                SendEmailError::NoSenderConfigured { municipality_id }
            }
        }
    }
}

impl From<MimeError> for SendEmailError {
    fn from(err: MimeError) -> Self {
        debug!("MimeError -> SendEmailError");

        SendEmailError::InvalidMessage(err)
    }
}

impl From<MailerError> for SendEmailError {
    fn from(err: MailerError) -> Self {
        debug!("MailerError -> SendEmailError");

        SendEmailError::SendFailed(err)
    }
}
