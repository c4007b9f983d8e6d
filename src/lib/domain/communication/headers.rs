//! Custom e-mail headers accepted on a send request

use std::{fmt, str::FromStr};

use thiserror::Error;

/// A header that callers may set on an outgoing e-mail
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Header {
    /// `Message-ID`
    MessageId,

    /// `In-Reply-To`
    InReplyTo,

    /// `References`
    References,

    /// `Auto-Submitted`
    AutoSubmitted,
}

/// Errors raised when resolving or validating a header
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    /// The header key is not one of the supported headers
    #[error("not a supported header")]
    UnknownHeader(String),

    /// No values were given for the header
    #[error("must not be empty")]
    NoValues,

    /// The value is not in message-id format
    #[error("must start with '<', contain '@' and end with '>'")]
    InvalidMessageId,

    /// The value is blank
    #[error("must not be blank")]
    BlankValue,
}

impl Header {
    /// Every supported header
    pub const ALL: [Header; 4] = [
        Header::MessageId,
        Header::InReplyTo,
        Header::References,
        Header::AutoSubmitted,
    ];

    /// The header name as written on the wire
    pub fn wire_name(&self) -> &'static str {
        match self {
            Header::MessageId => "Message-ID",
            Header::InReplyTo => "In-Reply-To",
            Header::References => "References",
            Header::AutoSubmitted => "Auto-Submitted",
        }
    }

    /// The symbolic name, e.g. `IN_REPLY_TO`
    pub fn symbolic_name(&self) -> &'static str {
        match self {
            Header::MessageId => "MESSAGE_ID",
            Header::InReplyTo => "IN_REPLY_TO",
            Header::References => "REFERENCES",
            Header::AutoSubmitted => "AUTO_SUBMITTED",
        }
    }

    /// Whether values of this header must be in message-id format
    pub fn carries_message_ids(&self) -> bool {
        !matches!(self, Header::AutoSubmitted)
    }

    /// Validates a single header value
    pub fn validate_value(&self, value: &str) -> Result<(), HeaderError> {
        if self.carries_message_ids() {
            if !is_valid_message_id(value) {
                return Err(HeaderError::InvalidMessageId);
            }
        } else if value.trim().is_empty() {
            return Err(HeaderError::BlankValue);
        }

        Ok(())
    }

    /// Validates the full list of values given for this header
    pub fn validate_values(&self, values: &[String]) -> Result<(), HeaderError> {
        if values.is_empty() {
            return Err(HeaderError::NoValues);
        }

        values
            .iter()
            .try_for_each(|value| self.validate_value(value))
    }
}

impl FromStr for Header {
    type Err = HeaderError;

    /// Accepts the wire name (case-insensitive) or the symbolic name.
    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let key = key.trim();

        Header::ALL
            .into_iter()
            .find(|header| {
                header.wire_name().eq_ignore_ascii_case(key) || header.symbolic_name() == key
            })
            .ok_or_else(|| HeaderError::UnknownHeader(key.to_string()))
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

/// Checks the `<local@domain>` shape required for message ids.
pub fn is_valid_message_id(value: &str) -> bool {
    value.len() > 2 && value.starts_with('<') && value.ends_with('>') && value.contains('@')
}

/// Joins multiple header values into a single header line value.
pub fn join_values(values: &[String]) -> String {
    values.join(" ")
}
