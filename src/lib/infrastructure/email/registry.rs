//! Builds the mail sender registry from configuration

use tracing::info;

use crate::domain::communication::registry::MailSenderRegistry;

use super::{
    config::{ConfigurationError, EmailConfig, SenderSettings},
    graph::GraphMailer,
    smtp::{SmtpConfig, SmtpMailer},
    MailSender,
};

/// Creates one mail sender per configured municipality.
///
/// Fails on the first invalid instance, or if no instance is configured.
pub fn build_registry(
    config: &EmailConfig,
) -> Result<MailSenderRegistry<MailSender>, ConfigurationError> {
    if config.instances.is_empty() {
        return Err(ConfigurationError::NoSenders);
    }

    let registry: MailSenderRegistry<MailSender> = config
        .instances
        .iter()
        .map(|(municipality_id, properties)| -> Result<_, ConfigurationError> {
            let backend = |source: anyhow::Error| ConfigurationError::Backend {
                municipality_id: municipality_id.clone(),
                source,
            };

            let sender = match properties.settings(municipality_id)? {
                SenderSettings::Basic(basic) => {
                    let smtp = SmtpConfig::from_properties(
                        municipality_id,
                        basic,
                        &config.default_properties,
                    )?;
                    MailSender::Smtp(SmtpMailer::from_config(&smtp).map_err(backend)?)
                }
                SenderSettings::Azure(azure) => {
                    MailSender::Graph(GraphMailer::from_properties(azure).map_err(backend)?)
                }
            };

            info!(
                municipality_id = municipality_id.as_str(),
                "Configured {} mail sender",
                sender.kind()
            );

            Ok((municipality_id.clone(), sender))
        })
        .collect::<Result<_, ConfigurationError>>()?;

    Ok(registry)
}
