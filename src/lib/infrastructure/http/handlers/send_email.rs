//! Send e-mail handler

use std::collections::BTreeMap;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    domain::communication::{
        email_addresses::EmailAddress,
        encoding::decode_base64,
        headers::Header,
        requests::{Attachment, SendEmailRequest, Sender},
        service::EmailService,
    },
    infrastructure::http::{
        errors::{ApiError, Violation},
        state::AppState,
    },
};

lazy_static! {
    static ref MUNICIPALITY_ID_REGEX: Regex = Regex::new(r"^[0-9]{4}$").unwrap();
}

/// The sender of the e-mail
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SenderBody {
    /// Display name
    #[schema(example = "Sundsvalls kommun")]
    name: Option<String>,

    /// Sender address
    #[schema(example = "noreply@sundsvall.se")]
    address: Option<String>,

    /// Reply-to address, defaults to the sender address
    #[schema(example = "support@sundsvall.se")]
    reply_to: Option<String>,
}

/// A file attached to the e-mail
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentBody {
    /// BASE64-encoded content; attachments that do not decode are left out
    #[schema(example = "aGVsbG8gd29ybGQK")]
    #[serde(default)]
    content: String,

    /// File name
    #[schema(example = "hello.txt")]
    name: Option<String>,

    /// MIME type
    #[schema(example = "text/plain")]
    content_type: Option<String>,
}

/// Send e-mail request body
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailBody {
    /// Recipient address
    #[schema(example = "recipient@example.com")]
    email_address: Option<String>,

    /// Subject line
    #[schema(example = "Welcome")]
    subject: Option<String>,

    /// Plain-text body
    #[schema(example = "Hello")]
    message: Option<String>,

    /// BASE64-encoded HTML body
    #[schema(example = "PHA+SGVsbG88L3A+")]
    html_message: Option<String>,

    /// Sender
    sender: Option<SenderBody>,

    /// Attachments
    #[serde(default)]
    attachments: Vec<AttachmentBody>,

    /// Custom headers: `Message-ID`, `In-Reply-To`, `References` or `Auto-Submitted`
    #[serde(default)]
    #[schema(example = json!({"Message-ID": ["<1234@sundsvall.se>"]}))]
    headers: BTreeMap<String, Vec<String>>,
}

fn non_blank(field: &str, value: Option<String>, violations: &mut Vec<Violation>) -> Option<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Some(value),
        _ => {
            violations.push(Violation::new(field, "must not be blank"));
            None
        }
    }
}

fn email_address(field: &str, value: Option<&str>, violations: &mut Vec<Violation>) -> Option<EmailAddress> {
    EmailAddress::new(value.unwrap_or_default())
        .map_err(|err| violations.push(Violation::new(field, err)))
        .ok()
}

fn sender(body: Option<SenderBody>, violations: &mut Vec<Violation>) -> Option<Sender> {
    let Some(body) = body else {
        violations.push(Violation::new("sender", "must not be null"));
        return None;
    };

    let name = non_blank("sender.name", body.name, violations);
    let address = email_address("sender.address", body.address.as_deref(), violations);
    let reply_to = match body.reply_to.as_deref().map(str::trim) {
        Some(reply_to) if !reply_to.is_empty() => {
            Some(email_address("sender.replyTo", Some(reply_to), violations)?)
        }
        _ => None,
    };

    Some(Sender {
        name: name?,
        address: address?,
        reply_to,
    })
}

fn attachments(bodies: Vec<AttachmentBody>, violations: &mut Vec<Violation>) -> Vec<Attachment> {
    bodies
        .into_iter()
        .enumerate()
        .filter_map(|(i, body)| {
            let name = non_blank(&format!("attachments[{i}].name"), body.name, violations);
            let content_type = non_blank(
                &format!("attachments[{i}].contentType"),
                body.content_type,
                violations,
            );

            Some(Attachment {
                content: body.content,
                name: name?,
                content_type: content_type?,
            })
        })
        .collect()
}

fn validate_headers(headers: &BTreeMap<String, Vec<String>>, violations: &mut Vec<Violation>) {
    for (key, values) in headers {
        let result = key
            .parse::<Header>()
            .and_then(|header| header.validate_values(values));

        if let Err(err) = result {
            violations.push(Violation::new(format!("headers.{key}"), err));
        }
    }
}

impl TryFrom<SendEmailBody> for SendEmailRequest {
    type Error = ApiError;

    fn try_from(body: SendEmailBody) -> Result<Self, Self::Error> {
        let mut violations = Vec::new();

        let email_address = email_address("emailAddress", body.email_address.as_deref(), &mut violations);
        let subject = non_blank("subject", body.subject, &mut violations);

        let html_message = body.html_message.filter(|html| !html.trim().is_empty());
        if let Some(html) = html_message.as_deref() {
            match decode_base64(html) {
                Err(_) => violations.push(Violation::new(
                    "htmlMessage",
                    "not a valid BASE64-encoded string",
                )),
                Ok(decoded) if std::str::from_utf8(&decoded).is_err() => violations.push(
                    Violation::new("htmlMessage", "must decode to UTF-8 text"),
                ),
                Ok(_) => {}
            }
        }

        let sender = sender(body.sender, &mut violations);
        let attachments = attachments(body.attachments, &mut violations);
        validate_headers(&body.headers, &mut violations);

        match (email_address, subject, sender) {
            (Some(email_address), Some(subject), Some(sender)) if violations.is_empty() => {
                Ok(Self {
                    email_address,
                    subject,
                    message: body.message,
                    html_message,
                    sender,
                    attachments,
                    headers: body.headers,
                })
            }
            _ => Err(ApiError::new_400(violations)),
        }
    }
}

/// Returns `true` for a four-digit municipality code.
pub fn is_valid_municipality_id(municipality_id: &str) -> bool {
    MUNICIPALITY_ID_REGEX.is_match(municipality_id)
}

/// Send an e-mail
#[utoipa::path(
    post,
    operation_id = "send_email",
    tag = "E-mail",
    path = "/{municipality_id}/send/email",
    params(
        ("municipality_id" = String, Path, description = "The municipality sending the e-mail", example = "2281"),
    ),
    request_body = SendEmailBody,
    responses(
        (status = StatusCode::OK, description = "E-mail sent"),
        (status = StatusCode::BAD_REQUEST, description = "Constraint violation", body = ErrorResponse),
        (status = StatusCode::BAD_GATEWAY, description = "No mail sender configured for the municipality", body = ErrorResponse, example = json!({"error": "No mail sender exists for municipalityId 2281"})),
        (status = StatusCode::INTERNAL_SERVER_ERROR, description = "Unable to send e-mail", body = ErrorResponse),
    )
)]
pub async fn handler<E: EmailService>(
    State(state): State<AppState<E>>,
    Path(municipality_id): Path<String>,
    request: Result<Json<SendEmailBody>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(body) = request?;

    let request: Result<SendEmailRequest, ApiError> = body.try_into();

    if !is_valid_municipality_id(&municipality_id) {
        let violation = Violation::new("municipalityId", "not a valid municipality ID");

        return Err(match request {
            Ok(_) => ApiError::new_400(vec![violation]),
            Err(mut err) => {
                err.violations.insert(0, violation);
                err
            }
        });
    }

    state.emails.send_mail(&municipality_id, &request?).await?;

    Ok(StatusCode::OK)
}
