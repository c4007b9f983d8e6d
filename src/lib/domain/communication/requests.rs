//! Validated send-email requests

use std::collections::BTreeMap;

use super::email_addresses::EmailAddress;

/// The sender of an e-mail
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sender {
    /// Display name
    pub name: String,

    /// Sender address
    pub address: EmailAddress,

    /// Optional reply-to address
    pub reply_to: Option<EmailAddress>,
}

impl Sender {
    /// The reply-to address, falling back to the sender address.
    pub fn reply_to_or_address(&self) -> &EmailAddress {
        self.reply_to.as_ref().unwrap_or(&self.address)
    }
}

/// A file attached to an e-mail
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    /// BASE64-encoded file content
    pub content: String,

    /// File name
    pub name: String,

    /// MIME type of the content
    pub content_type: String,
}

/// A request to send a single e-mail
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendEmailRequest {
    /// Recipient
    pub email_address: EmailAddress,

    /// Subject line
    pub subject: String,

    /// Plain-text body
    pub message: Option<String>,

    /// BASE64-encoded HTML body
    pub html_message: Option<String>,

    /// Sender
    pub sender: Sender,

    /// Attachments, in order
    pub attachments: Vec<Attachment>,

    /// Custom headers, keyed by header name
    pub headers: BTreeMap<String, Vec<String>>,
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// A request carrying every supported field.
    pub fn valid_request() -> SendEmailRequest {
        SendEmailRequest {
            email_address: EmailAddress::new_unchecked("receiver@receiver.com"),
            subject: "subject".to_string(),
            message: Some("message".to_string()),
            html_message: Some("PHA+aHRtbDwvcD4=".to_string()),
            sender: Sender {
                name: "someName".to_string(),
                address: EmailAddress::new_unchecked("sender@sender.com"),
                reply_to: Some(EmailAddress::new_unchecked("replyTo@sender.com")),
            },
            attachments: vec![Attachment {
                content: "c29tZUNvbnRlbnQ=".to_string(),
                name: "someName.txt".to_string(),
                content_type: "text/plain".to_string(),
            }],
            headers: BTreeMap::from([
                (
                    "Message-ID".to_string(),
                    vec!["<318d3a5c-cd45-45ef-94a0-0e3a88e47bf6@sundsvall.se>".to_string()],
                ),
                (
                    "In-Reply-To".to_string(),
                    vec!["<5e0b2ce9-9b0c-4f8b-aa62-ebac666c5b64@sundsvall.se>".to_string()],
                ),
                (
                    "References".to_string(),
                    vec!["<5e0b2ce9-9b0c-4f8b-aa62-ebac666c5b64@sundsvall.se>".to_string()],
                ),
                ("Auto-Submitted".to_string(), vec!["auto-generated".to_string()]),
            ]),
        }
    }

    #[test]
    fn test_reply_to_falls_back_to_address() {
        let mut request = valid_request();
        request.sender.reply_to = None;

        assert_eq!(
            request.sender.reply_to_or_address().as_str(),
            "sender@sender.com"
        );
    }

    #[test]
    fn test_reply_to_is_used_when_set() {
        let request = valid_request();

        assert_eq!(
            request.sender.reply_to_or_address().as_str(),
            "replyTo@sender.com"
        );
    }
}
