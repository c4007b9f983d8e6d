//! Backend-agnostic e-mail envelope and its assembly from a request

use std::{fmt, string::FromUtf8Error};

use base64::DecodeError;
use thiserror::Error;
use tracing::warn;

use super::{
    encoding::{decode_base64, encode_word, is_valid_base64},
    headers::{join_values, Header, HeaderError},
    requests::SendEmailRequest,
};

/// Errors that abort envelope assembly
#[derive(Debug, Error)]
pub enum MimeError {
    /// The HTML body is not valid BASE64
    #[error("Unable to decode BASE64")]
    HtmlNotBase64(#[source] DecodeError),

    /// The decoded HTML body is not UTF-8 text
    #[error("Decoded HTML body is not valid UTF-8")]
    HtmlNotUtf8(#[source] FromUtf8Error),

    /// A header key could not be resolved
    #[error("Invalid header \"{key}\": {source}")]
    InvalidHeader {
        /// The header key as given in the request
        key: String,

        /// Why the key was rejected
        source: HeaderError,
    },
}

/// The `From` originator.
///
/// Backends receive the raw `name`: lettre encodes it when writing the SMTP
/// `From` header and Graph carries it as JSON. `encoded_name`, and the
/// `Display` form built from it, is the equivalent header text used in logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Originator {
    /// Display name as given in the request
    pub name: String,

    /// Display name as RFC 2047 encoded-words
    pub encoded_name: String,

    /// Sender address
    pub address: String,
}

impl fmt::Display for Originator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.encoded_name, self.address)
    }
}

/// The media type of a body part
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    /// `text/plain; charset=utf-8`
    Plain,

    /// `text/html; charset=utf-8`
    Html,
}

/// One alternative of the message body
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BodyPart {
    /// Media type
    pub kind: BodyKind,

    /// Decoded text
    pub content: String,
}

/// A decoded attachment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvelopeAttachment {
    /// File name
    pub name: String,

    /// MIME type
    pub content_type: String,

    /// Raw content
    pub content: Vec<u8>,
}

/// A fully assembled outbound e-mail
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Originator
    pub from: Originator,

    /// Reply-to address
    pub reply_to: String,

    /// Recipient address
    pub to: String,

    /// Subject, sent as UTF-8
    pub subject: String,

    /// Body alternatives, plain text before HTML
    pub body: Vec<BodyPart>,

    /// Attachments that decoded successfully, in request order
    pub attachments: Vec<EnvelopeAttachment>,

    /// Custom headers with their joined values
    pub headers: Vec<(Header, String)>,
}

impl Envelope {
    /// Assembles an envelope from a request.
    ///
    /// Attachments whose content is not valid BASE64 are dropped. An HTML body
    /// that does not decode, or an unsupported header key, fails the whole build.
    pub fn build(request: &SendEmailRequest) -> Result<Self, MimeError> {
        let sender = &request.sender;

        let from = Originator {
            name: sender.name.clone(),
            encoded_name: encode_word(&sender.name),
            address: sender.address.to_string(),
        };

        Ok(Self {
            from,
            reply_to: sender.reply_to_or_address().to_string(),
            to: request.email_address.to_string(),
            subject: request.subject.clone(),
            body: build_body(request)?,
            attachments: build_attachments(request),
            headers: build_headers(request)?,
        })
    }

    /// The plain-text alternative, if any
    pub fn plain_text(&self) -> Option<&str> {
        self.part(BodyKind::Plain)
    }

    /// The HTML alternative, if any
    pub fn html(&self) -> Option<&str> {
        self.part(BodyKind::Html)
    }

    /// The joined value of a custom header, if present
    pub fn header(&self, header: Header) -> Option<&str> {
        self.headers
            .iter()
            .find(|(h, _)| *h == header)
            .map(|(_, value)| value.as_str())
    }

    fn part(&self, kind: BodyKind) -> Option<&str> {
        self.body
            .iter()
            .find(|part| part.kind == kind)
            .map(|part| part.content.as_str())
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn build_body(request: &SendEmailRequest) -> Result<Vec<BodyPart>, MimeError> {
    let mut body = Vec::with_capacity(2);

    if let Some(message) = non_blank(&request.message) {
        body.push(BodyPart {
            kind: BodyKind::Plain,
            content: message.to_string(),
        });
    }

    if let Some(html) = non_blank(&request.html_message) {
        let decoded = decode_base64(html).map_err(MimeError::HtmlNotBase64)?;

        body.push(BodyPart {
            kind: BodyKind::Html,
            content: String::from_utf8(decoded).map_err(MimeError::HtmlNotUtf8)?,
        });
    }

    if body.is_empty() {
        body.push(BodyPart {
            kind: BodyKind::Plain,
            content: String::new(),
        });
    }

    Ok(body)
}

fn build_attachments(request: &SendEmailRequest) -> Vec<EnvelopeAttachment> {
    request
        .attachments
        .iter()
        .filter_map(|attachment| {
            if !is_valid_base64(&attachment.content) {
                warn!(
                    "Dropping attachment \"{}\": content is not valid BASE64",
                    attachment.name
                );
                return None;
            }

            decode_base64(&attachment.content)
                .ok()
                .map(|content| EnvelopeAttachment {
                    name: attachment.name.clone(),
                    content_type: attachment.content_type.clone(),
                    content,
                })
        })
        .collect()
}

fn build_headers(request: &SendEmailRequest) -> Result<Vec<(Header, String)>, MimeError> {
    // wire and symbolic keys for the same header share one entry
    let mut resolved: Vec<(Header, Vec<String>)> = Vec::new();

    for (key, values) in request.headers.iter().filter(|(_, values)| !values.is_empty()) {
        let header = key
            .parse::<Header>()
            .map_err(|source| MimeError::InvalidHeader {
                key: key.clone(),
                source,
            })?;

        match resolved.iter_mut().find(|(h, _)| *h == header) {
            Some((_, existing)) => existing.extend(values.iter().cloned()),
            None => resolved.push((header, values.clone())),
        }
    }

    Ok(resolved
        .into_iter()
        .map(|(header, values)| (header, join_values(&values)))
        .collect())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use testresult::TestResult;

    use crate::domain::communication::{
        email_addresses::EmailAddress,
        requests::{tests::valid_request, Attachment, SendEmailRequest, Sender},
    };

    use super::*;

    fn scenario_request() -> SendEmailRequest {
        SendEmailRequest {
            email_address: EmailAddress::new_unchecked("r@r.se"),
            subject: "s".to_string(),
            message: Some("m".to_string()),
            html_message: Some("PHA+aHRtbDwvcD4=".to_string()),
            sender: Sender {
                name: "N".to_string(),
                address: EmailAddress::new_unchecked("n@n.se"),
                reply_to: None,
            },
            attachments: vec![],
            headers: BTreeMap::from([("Message-ID".to_string(), vec!["<a@b>".to_string()])]),
        }
    }

    #[test]
    fn test_build_scenario() -> TestResult {
        let envelope = Envelope::build(&scenario_request())?;

        assert_eq!(envelope.from.to_string(), "N <n@n.se>");
        assert_eq!(envelope.reply_to, "n@n.se");
        assert_eq!(envelope.to, "r@r.se");
        assert_eq!(envelope.subject, "s");
        assert_eq!(envelope.plain_text(), Some("m"));
        assert_eq!(envelope.html(), Some("<p>html</p>"));
        assert_eq!(envelope.header(Header::MessageId), Some("<a@b>"));
        assert!(envelope.attachments.is_empty());

        Ok(())
    }

    #[test]
    fn test_plain_text_precedes_html() -> TestResult {
        let envelope = Envelope::build(&scenario_request())?;

        let kinds: Vec<BodyKind> = envelope.body.iter().map(|part| part.kind).collect();
        assert_eq!(kinds, vec![BodyKind::Plain, BodyKind::Html]);

        Ok(())
    }

    #[test]
    fn test_reply_to_uses_explicit_value() -> TestResult {
        let envelope = Envelope::build(&valid_request())?;

        assert_eq!(envelope.reply_to, "replyTo@sender.com");

        Ok(())
    }

    #[test]
    fn test_non_ascii_display_name_is_encoded() -> TestResult {
        let mut request = scenario_request();
        request.sender.name = "Sundsvalls Kommun – Växel".to_string();

        let envelope = Envelope::build(&request)?;

        assert_eq!(envelope.from.name, "Sundsvalls Kommun – Växel");
        assert!(envelope.from.encoded_name.starts_with("=?UTF-8?B?"));
        assert!(envelope.from.to_string().ends_with(" <n@n.se>"));

        Ok(())
    }

    #[test]
    fn test_invalid_attachments_are_dropped() -> TestResult {
        let mut request = scenario_request();
        request.attachments = vec![
            Attachment {
                content: "aGVsbG8gd29ybGQK".to_string(),
                name: "hello.txt".to_string(),
                content_type: "text/plain".to_string(),
            },
            Attachment {
                content: "not BASE64!".to_string(),
                name: "broken.txt".to_string(),
                content_type: "text/plain".to_string(),
            },
            Attachment {
                content: "".to_string(),
                name: "empty.txt".to_string(),
                content_type: "text/plain".to_string(),
            },
            Attachment {
                content: "JVBERi0xLjQ=".to_string(),
                name: "doc.pdf".to_string(),
                content_type: "application/pdf".to_string(),
            },
        ];

        let envelope = Envelope::build(&request)?;

        assert_eq!(envelope.attachments.len(), 2);
        assert_eq!(envelope.attachments[0].name, "hello.txt");
        assert_eq!(envelope.attachments[0].content, b"hello world\n");
        assert_eq!(envelope.attachments[1].name, "doc.pdf");
        assert_eq!(envelope.attachments[1].content_type, "application/pdf");
        assert_eq!(envelope.attachments[1].content, b"%PDF-1.4");

        Ok(())
    }

    #[test]
    fn test_invalid_html_fails_build() {
        let mut request = scenario_request();
        request.html_message = Some("Not base64".to_string());

        let result = Envelope::build(&request);

        assert!(matches!(result, Err(MimeError::HtmlNotBase64(_))));
        assert_eq!(
            result.unwrap_err().to_string(),
            "Unable to decode BASE64"
        );
    }

    #[test]
    fn test_html_only() -> TestResult {
        let mut request = scenario_request();
        request.message = Some("  ".to_string());

        let envelope = Envelope::build(&request)?;

        assert_eq!(envelope.body.len(), 1);
        assert_eq!(envelope.plain_text(), None);
        assert_eq!(envelope.html(), Some("<p>html</p>"));

        Ok(())
    }

    #[test]
    fn test_missing_bodies_send_empty_plain_text() -> TestResult {
        let mut request = scenario_request();
        request.message = None;
        request.html_message = None;

        let envelope = Envelope::build(&request)?;

        assert_eq!(envelope.plain_text(), Some(""));
        assert_eq!(envelope.html(), None);

        Ok(())
    }

    #[test]
    fn test_headers_are_resolved_and_joined() -> TestResult {
        let mut request = valid_request();
        request.headers.insert(
            "REFERENCES".to_string(),
            vec!["<one@sundsvall.se>".to_string(), "<two@sundsvall.se>".to_string()],
        );
        request.headers.remove("References");

        let envelope = Envelope::build(&request)?;

        assert_eq!(
            envelope.header(Header::References),
            Some("<one@sundsvall.se> <two@sundsvall.se>")
        );
        assert_eq!(envelope.header(Header::AutoSubmitted), Some("auto-generated"));
        assert_eq!(envelope.headers.len(), 4);

        Ok(())
    }

    #[test]
    fn test_wire_and_symbolic_keys_are_merged() -> TestResult {
        let mut request = scenario_request();
        request.headers = BTreeMap::from([
            ("In-Reply-To".to_string(), vec!["<one@sundsvall.se>".to_string()]),
            ("IN_REPLY_TO".to_string(), vec!["<two@sundsvall.se>".to_string()]),
        ]);

        let envelope = Envelope::build(&request)?;

        assert_eq!(envelope.headers.len(), 1);
        assert_eq!(
            envelope.header(Header::InReplyTo),
            Some("<two@sundsvall.se> <one@sundsvall.se>")
        );

        Ok(())
    }

    #[test]
    fn test_unknown_header_fails_build() {
        let mut request = scenario_request();
        request
            .headers
            .insert("X-Mailer".to_string(), vec!["something".to_string()]);

        let result = Envelope::build(&request);

        assert!(matches!(
            result,
            Err(MimeError::InvalidHeader { ref key, .. }) if key == "X-Mailer"
        ));
    }

    #[test]
    fn test_build_is_repeatable() -> TestResult {
        let request = valid_request();

        assert_eq!(Envelope::build(&request)?, Envelope::build(&request)?);

        Ok(())
    }
}
