//! Mail sender backends

use async_trait::async_trait;

use crate::domain::communication::{
    envelope::Envelope,
    mailer::{Mailer, MailerError},
};

pub mod config;
pub mod graph;
pub mod registry;
pub mod smtp;

pub use registry::build_registry;

/// The backend serving one municipality
#[derive(Debug)]
pub enum MailSender {
    /// Direct SMTP
    Smtp(smtp::SmtpMailer),

    /// Microsoft Graph `sendMail`
    Graph(graph::GraphMailer),
}

impl MailSender {
    /// Short name of the backend kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            MailSender::Smtp(_) => "smtp",
            MailSender::Graph(_) => "graph",
        }
    }
}

#[async_trait]
impl Mailer for MailSender {
    async fn send_email(&self, envelope: &Envelope) -> Result<(), MailerError> {
        match self {
            MailSender::Smtp(mailer) => mailer.send_email(envelope).await,
            MailSender::Graph(mailer) => mailer.send_email(envelope).await,
        }
    }
}
