//! OpenAPI module

use utoipa::OpenApi;

use crate::infrastructure::http::{
    errors::{ErrorResponse, Violation},
    handlers::*,
};

#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "Email Sender"),
    paths(send_email::handler, uptime::handler),
    components(schemas(
        send_email::SendEmailBody,
        send_email::SenderBody,
        send_email::AttachmentBody,
        uptime::UptimeResponse,
        ErrorResponse,
        Violation,
    ))
)]
pub struct ApiDocs;
