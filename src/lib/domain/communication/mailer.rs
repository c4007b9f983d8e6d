//! Mail sending capability

use async_trait::async_trait;

#[cfg(test)]
use mockall::mock;

use super::envelope::Envelope;

mod errors;

pub use errors::MailerError;

/// A backend able to deliver an assembled [`Envelope`]
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    /// Send an email
    ///
    /// # Arguments
    /// * `envelope` - The assembled [`Envelope`] to deliver.
    ///
    /// # Returns
    /// A [`Result`] indicating success or failure. No retries are attempted.
    async fn send_email(&self, envelope: &Envelope) -> Result<(), MailerError>;
}

#[cfg(test)]
mock! {
    pub Mailer {}

    #[async_trait]
    impl Mailer for Mailer {
        async fn send_email(&self, envelope: &Envelope) -> Result<(), MailerError>;
    }
}

#[cfg(test)]
pub mod tests {
    pub use super::MockMailer;
}
