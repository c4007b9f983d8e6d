//! SMTP mail sender

use std::{collections::BTreeMap, fmt, str::FromStr, time::Duration};

use async_trait::async_trait;
use lettre::{
    message::{
        header::{ContentTransferEncoding, ContentType, HeaderName, HeaderValue},
        Attachment, Body, Mailbox, MultiPart, SinglePart,
    },
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, warn};

#[cfg(test)]
use mockall::mock;

use crate::domain::communication::{
    envelope::{BodyKind, Envelope},
    headers::Header,
    mailer::{Mailer, MailerError},
};

use super::config::{BasicProperties, ConfigurationError};

/// How the connection to the SMTP server is secured
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TlsMode {
    /// Plain text
    #[default]
    None,

    /// STARTTLS if the server offers it
    Opportunistic,

    /// STARTTLS, failing if the server does not offer it
    Required,

    /// TLS from the first byte
    Wrapper,
}

impl FromStr for TlsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "false" => Ok(Self::None),
            "opportunistic" | "starttls" => Ok(Self::Opportunistic),
            "required" => Ok(Self::Required),
            "wrapper" | "true" => Ok(Self::Wrapper),
            other => Err(other.to_string()),
        }
    }
}

/// SMTP connection settings for one municipality
#[derive(Clone, Default)]
pub struct SmtpConfig {
    /// The SMTP host
    pub host: String,

    /// The SMTP port
    pub port: u16,

    /// The SMTP username
    pub username: Option<String>,

    /// The SMTP password
    pub password: Option<String>,

    /// Connection security
    pub tls: TlsMode,

    /// Verify the TLS certificate
    pub verify_tls: bool,

    /// Network timeout
    pub timeout: Option<Duration>,
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("tls", &self.tls)
            .field("verify_tls", &self.verify_tls)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SmtpConfig {
    /// Builds the settings from the `basic` properties of a municipality,
    /// with its transport properties overlaid on `defaults`.
    pub fn from_properties(
        municipality_id: &str,
        basic: &BasicProperties,
        defaults: &BTreeMap<String, String>,
    ) -> Result<Self, ConfigurationError> {
        let mut config = Self {
            host: basic.host.clone(),
            port: basic.port,
            username: basic.username.clone().filter(|u| !u.is_empty()),
            password: basic.password.clone(),
            tls: TlsMode::None,
            verify_tls: true,
            timeout: None,
        };

        let mut tls: Option<TlsMode> = None;
        let mut timeout = None;
        let mut java_mail = JavaMailTls::default();

        for (key, value) in basic.merged_properties(defaults) {
            let invalid = || ConfigurationError::InvalidProperty {
                municipality_id: municipality_id.to_string(),
                key: key.clone(),
                value: value.clone(),
            };

            match key.as_str() {
                "tls" => tls = Some(value.parse().map_err(|_| invalid())?),
                "verify-tls" => config.verify_tls = parse_flag(&value).ok_or_else(invalid)?,
                "timeout" => {
                    let seconds: u64 = value.trim().parse().map_err(|_| invalid())?;
                    timeout = Some(Duration::from_secs(seconds));
                }
                "mail.smtp.ssl.enable" => java_mail.ssl = parse_flag(&value).ok_or_else(invalid)?,
                "mail.smtp.starttls.enable" => {
                    java_mail.starttls = parse_flag(&value).ok_or_else(invalid)?
                }
                "mail.smtp.starttls.required" => {
                    java_mail.starttls_required = parse_flag(&value).ok_or_else(invalid)?
                }
                "mail.smtp.ssl.trust" => {
                    if value.trim() == "*" {
                        config.verify_tls = false;
                    }
                }
                "mail.smtp.timeout" | "mail.smtp.connectiontimeout" | "mail.smtp.writetimeout" => {
                    let millis: u64 = value.trim().parse().map_err(|_| invalid())?;
                    let millis = Duration::from_millis(millis);
                    config.timeout = Some(config.timeout.map_or(millis, |t| t.max(millis)));
                }
                // credentials being present is what turns authentication on
                "mail.smtp.auth" | "mail.transport.protocol" => {}
                _ => warn!("Ignoring unknown SMTP property \"{key}\" for municipalityId {municipality_id}"),
            }
        }

        config.tls = tls.unwrap_or_else(|| java_mail.mode());
        config.timeout = timeout.or(config.timeout);

        Ok(config)
    }

    /// Creates the SMTP transport. No connection is made until the first send.
    pub fn transport(&self) -> anyhow::Result<AsyncSmtpTransport<Tokio1Executor>> {
        let parameters = || {
            TlsParameters::builder(self.host.clone())
                .dangerous_accept_invalid_certs(!self.verify_tls)
                .build()
        };

        let tls = match self.tls {
            TlsMode::None => Tls::None,
            TlsMode::Opportunistic => Tls::Opportunistic(parameters()?),
            TlsMode::Required => Tls::Required(parameters()?),
            TlsMode::Wrapper => Tls::Wrapper(parameters()?),
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host)
            .port(self.port)
            .timeout(self.timeout)
            .tls(tls);

        if let Some(username) = &self.username {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                self.password.clone().unwrap_or_default(),
            ));
        }

        Ok(builder.build())
    }
}

/// TLS switches as spelled in JavaMail `mail.smtp.*` properties
#[derive(Default)]
struct JavaMailTls {
    ssl: bool,
    starttls: bool,
    starttls_required: bool,
}

impl JavaMailTls {
    fn mode(&self) -> TlsMode {
        if self.ssl {
            TlsMode::Wrapper
        } else if self.starttls_required {
            TlsMode::Required
        } else if self.starttls {
            TlsMode::Opportunistic
        } else {
            TlsMode::None
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Something that can deliver a built [`Message`]
#[async_trait]
pub trait MailTransport: Send + Sync + 'static {
    /// Deliver the message
    async fn send(&self, message: Message) -> anyhow::Result<()>;
}

#[async_trait]
impl MailTransport for AsyncSmtpTransport<Tokio1Executor> {
    async fn send(&self, message: Message) -> anyhow::Result<()> {
        AsyncTransport::send(self, message).await?;

        Ok(())
    }
}

#[cfg(test)]
mock! {
    pub MailTransport {}

    #[async_trait]
    impl MailTransport for MailTransport {
        async fn send(&self, message: Message) -> anyhow::Result<()>;
    }
}

/// SMTP mailer
pub struct SmtpMailer<T: MailTransport = AsyncSmtpTransport<Tokio1Executor>> {
    transport: T,
    preserve_message_id: bool,
}

impl<T: MailTransport> fmt::Debug for SmtpMailer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("preserve_message_id", &self.preserve_message_id)
            .finish_non_exhaustive()
    }
}

impl SmtpMailer {
    /// Create a new SMTP mailer from its connection settings
    pub fn from_config(config: &SmtpConfig) -> anyhow::Result<Self> {
        Ok(Self::new(config.transport()?))
    }
}

impl<T: MailTransport> SmtpMailer<T> {
    /// Create a new SMTP mailer over `transport`
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            preserve_message_id: true,
        }
    }

    /// Whether a caller-supplied `Message-ID` is sent as-is (the default) or
    /// replaced by a generated one.
    pub fn preserve_message_id(mut self, preserve: bool) -> Self {
        self.preserve_message_id = preserve;
        self
    }

    /// Builds the wire message for `envelope`.
    pub fn message(&self, envelope: &Envelope) -> Result<Message, MailerError> {
        let from = Mailbox::new(Some(envelope.from.name.clone()), address(&envelope.from.address)?);

        let mut builder = Message::builder()
            .from(from)
            .reply_to(Mailbox::new(None, address(&envelope.reply_to)?))
            .to(Mailbox::new(None, address(&envelope.to)?))
            .subject(envelope.subject.clone());

        let message_id = envelope
            .header(Header::MessageId)
            .filter(|_| self.preserve_message_id)
            .map(str::to_string);
        builder = builder.message_id(message_id);

        for (header, value) in &envelope.headers {
            builder = match header {
                Header::MessageId => builder,
                Header::InReplyTo => builder.in_reply_to(value.clone()),
                Header::References => builder.references(value.clone()),
                Header::AutoSubmitted => builder.raw_header(HeaderValue::new(
                    HeaderName::new_from_ascii_str("Auto-Submitted"),
                    value.clone(),
                )),
            };
        }

        let mut parts = envelope.body.iter().map(|part| match part.kind {
            BodyKind::Plain => SinglePart::plain(part.content.clone()),
            BodyKind::Html => SinglePart::html(part.content.clone()),
        });
        let first = parts
            .next()
            .ok_or_else(|| MailerError::InvalidMessage(anyhow::anyhow!("message has no body")))?;
        let alternative = parts.fold(MultiPart::alternative().singlepart(first), |multipart, part| {
            multipart.singlepart(part)
        });

        let message = if envelope.attachments.is_empty() {
            builder.multipart(alternative)
        } else {
            let mut mixed = MultiPart::mixed().multipart(alternative);

            for attachment in &envelope.attachments {
                let content_type = ContentType::parse(&attachment.content_type)
                    .map_err(|e| MailerError::InvalidMessage(e.into()))?;
                let body = Body::new_with_encoding(
                    attachment.content.clone(),
                    ContentTransferEncoding::Base64,
                )
                .map_err(|_| {
                    MailerError::InvalidMessage(anyhow::anyhow!(
                        "attachment \"{}\" could not be encoded",
                        attachment.name
                    ))
                })?;

                mixed = mixed.singlepart(Attachment::new(attachment.name.clone()).body(body, content_type));
            }

            builder.multipart(mixed)
        };

        message.map_err(|e| MailerError::InvalidMessage(e.into()))
    }
}

fn address(value: &str) -> Result<Address, MailerError> {
    value
        .parse()
        .map_err(|e| MailerError::InvalidAddress(format!("{value}: {e}")))
}

#[async_trait]
impl<T: MailTransport> Mailer for SmtpMailer<T> {
    async fn send_email(&self, envelope: &Envelope) -> Result<(), MailerError> {
        let message = self.message(envelope)?;

        debug!("Sending email to {} over SMTP", envelope.to);

        self.transport
            .send(message)
            .await
            .map_err(MailerError::SendError)
    }
}
