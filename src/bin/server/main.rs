#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! REST API sending e-mail on behalf of municipalities

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use email_sender::{
    domain::communication::service::EmailServiceImpl,
    infrastructure::{
        email::{
            build_registry,
            config::{EmailConfig, MailConfigArgs},
        },
        http::{HttpServer, HttpServerConfig},
    },
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line arguments / environment variables
#[derive(Debug, Parser)]
pub struct Args {
    /// The HTTP server configuration
    #[clap(flatten)]
    pub server: HttpServerConfig,

    /// The mail sender configuration
    #[clap(flatten)]
    pub mail: MailConfigArgs,
}

#[mutants::skip]
#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = EmailConfig::load(&args.mail.path)
        .with_context(|| format!("failed to load mail configuration from {}", args.mail.path))?;
    let registry = build_registry(&config).context("invalid mail configuration")?;

    info!(
        "Configured mail senders for municipalities {:?}",
        registry.municipality_ids()
    );

    let emails = EmailServiceImpl::new(Arc::new(registry));

    HttpServer::new(emails, args.server).await?.run().await
}
