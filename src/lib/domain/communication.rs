//! E-mail assembly and dispatch

pub mod email_addresses;
pub mod encoding;
pub mod envelope;
pub mod errors;
pub mod headers;
pub mod mailer;
pub mod registry;
pub mod requests;
pub mod service;
