//! Microsoft Graph mail sender

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

#[cfg(test)]
use mockall::mock;

use crate::domain::communication::{
    encoding::encode_base64,
    envelope::Envelope,
    mailer::{Mailer, MailerError},
};

use super::config::AzureProperties;

/// Tokens are refreshed this long before they expire
const TOKEN_EXPIRY_MARGIN_SECONDS: i64 = 60;

/// Upper bound on any single token or Graph request
const REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Body of a `sendMail` call
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMailRequest {
    /// The message to send
    pub message: GraphMessage,

    /// Whether Graph keeps a copy in the mailbox's sent items
    pub save_to_sent_items: bool,
}

/// A Graph `message` resource
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMessage {
    /// Subject line
    pub subject: String,

    /// Message body
    pub body: ItemBody,

    /// Originator
    pub from: Recipient,

    /// Sender
    pub sender: Recipient,

    /// Recipients
    pub to_recipients: Vec<Recipient>,

    /// Reply-to addresses
    pub reply_to: Vec<Recipient>,

    /// File attachments
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<FileAttachment>,

    /// Custom internet headers
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub internet_message_headers: Vec<InternetMessageHeader>,
}

/// Content type of an [`ItemBody`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BodyType {
    /// Plain text
    Text,

    /// HTML
    #[serde(rename = "HTML")]
    Html,
}

/// A message body
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBody {
    /// Content type
    pub content_type: BodyType,

    /// Content
    pub content: String,
}

/// A recipient or originator
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    /// The address
    pub email_address: GraphEmailAddress,
}

impl Recipient {
    fn new(name: Option<&str>, address: &str) -> Self {
        Self {
            email_address: GraphEmailAddress {
                name: name.map(str::to_string),
                address: address.to_string(),
            },
        }
    }
}

/// A named e-mail address
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GraphEmailAddress {
    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Address
    pub address: String,
}

/// An attachment sent inline as BASE64
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    /// Always `#microsoft.graph.fileAttachment`
    #[serde(rename = "@odata.type")]
    pub odata_type: String,

    /// File name
    pub name: String,

    /// MIME type
    pub content_type: String,

    /// BASE64-encoded content
    pub content_bytes: String,
}

/// A custom internet message header
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InternetMessageHeader {
    /// Header name, `X-` prefixed
    pub name: String,

    /// Header value
    pub value: String,
}

/// The Graph API operations used to send mail
#[async_trait]
pub trait GraphClient: Send + Sync + 'static {
    /// Posts `request` to `/users/{user_id}/sendMail`
    async fn send_mail(&self, user_id: &str, request: &SendMailRequest) -> anyhow::Result<()>;
}

#[cfg(test)]
mock! {
    pub GraphClient {}

    #[async_trait]
    impl GraphClient for GraphClient {
        async fn send_mail(&self, user_id: &str, request: &SendMailRequest) -> anyhow::Result<()>;
    }
}

#[derive(Clone, Debug)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(TOKEN_EXPIRY_MARGIN_SECONDS) < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Graph client authenticating with the OAuth2 client-credentials grant
pub struct HttpGraphClient {
    http: reqwest::Client,
    token_url: String,
    graph_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    token: Mutex<Option<AccessToken>>,
}

impl fmt::Debug for HttpGraphClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpGraphClient")
            .field("token_url", &self.token_url)
            .field("graph_url", &self.graph_url)
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl HttpGraphClient {
    /// Create a new client for the application described by `properties`
    pub fn new(properties: &AzureProperties) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()?;

        Ok(Self {
            http,
            token_url: format!(
                "{}/{}/oauth2/v2.0/token",
                properties.authority.trim_end_matches('/'),
                properties.tenant_id
            ),
            graph_url: properties.graph_url.trim_end_matches('/').to_string(),
            client_id: properties.client_id.clone(),
            client_secret: properties.client_secret.clone(),
            scope: properties.scope.clone(),
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> anyhow::Result<String> {
        let mut token = self.token.lock().await;

        if let Some(token) = token.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }

        debug!("Requesting a new Graph access token");

        let response: TokenResponse = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let fresh = AccessToken {
            value: response.access_token,
            expires_at: Utc::now() + Duration::seconds(response.expires_in),
        };
        let value = fresh.value.clone();
        *token = Some(fresh);

        Ok(value)
    }
}

#[async_trait]
impl GraphClient for HttpGraphClient {
    async fn send_mail(&self, user_id: &str, request: &SendMailRequest) -> anyhow::Result<()> {
        let token = self.access_token().await?;

        self.http
            .post(format!("{}/users/{}/sendMail", self.graph_url, user_id))
            .bearer_auth(token)
            .json(request)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

/// Mailer sending through the Graph API as a configured mailbox
pub struct GraphMailer<C: GraphClient = HttpGraphClient> {
    client: C,
    send_as_id: String,
}

impl<C: GraphClient> fmt::Debug for GraphMailer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphMailer")
            .field("send_as_id", &self.send_as_id)
            .finish_non_exhaustive()
    }
}

impl GraphMailer {
    /// Create a new Graph mailer from its application credentials
    pub fn from_properties(properties: &AzureProperties) -> anyhow::Result<Self> {
        Ok(Self::new(
            HttpGraphClient::new(properties)?,
            &properties.send_as_id,
        ))
    }
}

impl<C: GraphClient> GraphMailer<C> {
    /// Create a new Graph mailer sending as `send_as_id`
    pub fn new(client: C, send_as_id: &str) -> Self {
        Self {
            client,
            send_as_id: send_as_id.to_string(),
        }
    }

    /// Builds the `sendMail` payload for `envelope`.
    pub fn message(&self, envelope: &Envelope) -> SendMailRequest {
        let body = match envelope.html() {
            Some(html) => ItemBody {
                content_type: BodyType::Html,
                content: html.to_string(),
            },
            None => ItemBody {
                content_type: BodyType::Text,
                content: envelope.plain_text().unwrap_or_default().to_string(),
            },
        };

        let from = Recipient::new(Some(&envelope.from.name), &envelope.from.address);

        let attachments = envelope
            .attachments
            .iter()
            .map(|attachment| FileAttachment {
                odata_type: "#microsoft.graph.fileAttachment".to_string(),
                name: attachment.name.clone(),
                content_type: attachment.content_type.clone(),
                content_bytes: encode_base64(&attachment.content),
            })
            .collect();

        let internet_message_headers = envelope
            .headers
            .iter()
            .map(|(header, value)| InternetMessageHeader {
                name: format!("X-{}", header.wire_name()),
                value: value.clone(),
            })
            .collect();

        SendMailRequest {
            message: GraphMessage {
                subject: envelope.subject.clone(),
                body,
                sender: from.clone(),
                from,
                to_recipients: vec![Recipient::new(None, &envelope.to)],
                reply_to: vec![Recipient::new(None, &envelope.reply_to)],
                attachments,
                internet_message_headers,
            },
            save_to_sent_items: false,
        }
    }
}

#[async_trait]
impl<C: GraphClient> Mailer for GraphMailer<C> {
    async fn send_email(&self, envelope: &Envelope) -> Result<(), MailerError> {
        let request = self.message(envelope);

        debug!(
            "Sending email to {} through Microsoft Graph as {}",
            envelope.to, self.send_as_id
        );

        self.client
            .send_mail(&self.send_as_id, &request)
            .await
            .map_err(MailerError::SendError)
    }
}
