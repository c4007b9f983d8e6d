#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! E-mail sending on behalf of municipalities, over SMTP or Microsoft Graph

pub mod domain;
pub mod infrastructure;
