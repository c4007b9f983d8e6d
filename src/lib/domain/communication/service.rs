//! Email service

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use tracing::info;

#[cfg(test)]
use mockall::mock;

use super::{
    envelope::Envelope,
    errors::SendEmailError,
    mailer::Mailer,
    registry::MailSenderRegistry,
    requests::SendEmailRequest,
};

/// Email service
#[async_trait]
pub trait EmailService: Clone + Send + Sync + 'static {
    /// Sends an e-mail on behalf of a municipality.
    ///
    /// # Arguments
    /// * `municipality_id` - The municipality whose configured sender is used.
    /// * `request` - The validated [`SendEmailRequest`].
    ///
    /// # Returns
    /// - [`Ok`] once the backend accepted the e-mail.
    /// - [`Err`] with [`SendEmailError::NoSenderConfigured`] if the municipality has no sender,
    ///   or another [`SendEmailError`] if assembling or sending failed.
    async fn send_mail(
        &self,
        municipality_id: &str,
        request: &SendEmailRequest,
    ) -> Result<(), SendEmailError>;
}

#[cfg(test)]
mock! {
    pub EmailService {}

    impl Clone for EmailService {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl EmailService for EmailService {
        async fn send_mail(
            &self,
            municipality_id: &str,
            request: &SendEmailRequest,
        ) -> Result<(), SendEmailError>;
    }
}

/// Email service implementation
pub struct EmailServiceImpl<M>
where
    M: Mailer,
{
    registry: Arc<MailSenderRegistry<M>>,
}

impl<M> EmailServiceImpl<M>
where
    M: Mailer,
{
    /// Creates a new email service over a mail sender registry.
    pub fn new(registry: Arc<MailSenderRegistry<M>>) -> Self {
        Self { registry }
    }
}

impl<M: Mailer> Clone for EmailServiceImpl<M> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<M: Mailer> fmt::Debug for EmailServiceImpl<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailServiceImpl")
            .field("registry", &self.registry)
            .finish()
    }
}

#[async_trait]
impl<M> EmailService for EmailServiceImpl<M>
where
    M: Mailer,
{
    async fn send_mail(
        &self,
        municipality_id: &str,
        request: &SendEmailRequest,
    ) -> Result<(), SendEmailError> {
        let mailer = self.registry.resolve(municipality_id)?;

        let envelope = Envelope::build(request)?;

        info!(municipality_id, "Sending email to {}", envelope.to);

        mailer.send_email(&envelope).await?;

        Ok(())
    }
}
