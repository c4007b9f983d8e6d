//! Mail sender configuration

use std::collections::{BTreeMap, HashMap};

use clap::Parser;
use config::{Case, Config, ConfigError, Environment, File};
use serde::Deserialize;
use thiserror::Error;

/// Default OAuth scope for the Graph API
pub const DEFAULT_GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Default Azure AD authority
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Default Graph API base URL
pub const DEFAULT_GRAPH_URL: &str = "https://graph.microsoft.com/v1.0";

/// Command-line arguments / environment variables for the mail configuration
#[derive(Clone, Debug, Parser)]
pub struct MailConfigArgs {
    /// Path of the mail sender configuration file, without extension
    #[arg(long = "mail-config", env = "MAIL_CONFIG", default_value = "config/email")]
    pub path: String,
}

/// Errors raised while loading or validating the mail sender configuration
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The configuration could not be read or deserialized
    #[error("could not load mail sender configuration: {0}")]
    Load(#[from] ConfigError),

    /// No municipality has a mail sender
    #[error("no mail senders are configured")]
    NoSenders,

    /// Both or neither of `basic` and `azure` are set
    #[error("exactly one of SMTP 'basic' or 'azure' properties must be set for municipalityId {0}")]
    AmbiguousSender(String),

    /// A required property is blank
    #[error("'{field}' must not be blank for municipalityId {municipality_id}")]
    BlankProperty {
        /// The municipality being configured
        municipality_id: String,

        /// The blank property
        field: &'static str,
    },

    /// A transport property has a malformed value
    #[error("invalid value \"{value}\" for property '{key}' for municipalityId {municipality_id}")]
    InvalidProperty {
        /// The municipality being configured
        municipality_id: String,

        /// Property key
        key: String,

        /// Property value
        value: String,
    },

    /// The backend client could not be created
    #[error("could not create mail sender for municipalityId {municipality_id}")]
    Backend {
        /// The municipality being configured
        municipality_id: String,

        /// Underlying cause
        #[source]
        source: anyhow::Error,
    },
}

/// Mail sender configuration for all municipalities
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EmailConfig {
    /// Transport properties applied to every SMTP sender
    #[serde(default)]
    pub default_properties: BTreeMap<String, String>,

    /// Sender settings keyed by municipality id
    #[serde(default)]
    pub instances: HashMap<String, MailSenderProperties>,
}

#[derive(Deserialize)]
struct Root {
    integration: Integration,
}

#[derive(Deserialize)]
struct Integration {
    email: EmailConfig,
}

impl EmailConfig {
    /// Loads the configuration from `path` (any supported format), overlaid
    /// with `EMAIL_SENDER__`-prefixed environment variables.
    ///
    /// Each `__`-separated segment of a variable name maps to a kebab-case key,
    /// so `EMAIL_SENDER__INTEGRATION__EMAIL__INSTANCES__2260__AZURE__CLIENT_SECRET`
    /// overrides `integration.email.instances.2260.azure.client-secret`.
    pub fn load(path: &str) -> Result<Self, ConfigurationError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("EMAIL_SENDER")
                    .separator("__")
                    .convert_case(Case::Kebab),
            )
            .build()?;

        Self::from_config(config)
    }

    /// Extracts the `integration.email` section of an already built [`Config`].
    pub fn from_config(config: Config) -> Result<Self, ConfigurationError> {
        let root: Root = config.try_deserialize()?;

        Ok(root.integration.email)
    }
}

/// Settings for one municipality; exactly one of the fields must be set
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MailSenderProperties {
    /// SMTP settings
    pub basic: Option<BasicProperties>,

    /// Azure AD / Graph settings
    pub azure: Option<AzureProperties>,
}

/// The backend selected for a municipality
#[derive(Clone, Copy, Debug)]
pub enum SenderSettings<'a> {
    /// Send over SMTP
    Basic(&'a BasicProperties),

    /// Send through the Graph API
    Azure(&'a AzureProperties),
}

impl MailSenderProperties {
    /// Selects and validates the configured backend.
    pub fn settings(&self, municipality_id: &str) -> Result<SenderSettings<'_>, ConfigurationError> {
        match (&self.basic, &self.azure) {
            (Some(basic), None) => {
                basic.validate(municipality_id)?;
                Ok(SenderSettings::Basic(basic))
            }
            (None, Some(azure)) => {
                azure.validate(municipality_id)?;
                Ok(SenderSettings::Azure(azure))
            }
            _ => Err(ConfigurationError::AmbiguousSender(
                municipality_id.to_string(),
            )),
        }
    }
}

fn default_port() -> u16 {
    25
}

/// SMTP server settings
#[derive(Clone, Debug, Default, Deserialize)]
pub struct BasicProperties {
    /// SMTP host
    #[serde(default)]
    pub host: String,

    /// SMTP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Optional user name
    pub username: Option<String>,

    /// Optional password
    pub password: Option<String>,

    /// Transport properties, overriding the defaults
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl BasicProperties {
    fn validate(&self, municipality_id: &str) -> Result<(), ConfigurationError> {
        require(municipality_id, "host", &self.host)
    }

    /// The default properties overlaid with this instance's properties.
    pub fn merged_properties(&self, defaults: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut merged = defaults.clone();
        merged.extend(self.properties.clone());
        merged
    }
}

fn default_scope() -> String {
    DEFAULT_GRAPH_SCOPE.to_string()
}

fn default_authority() -> String {
    DEFAULT_AUTHORITY.to_string()
}

fn default_graph_url() -> String {
    DEFAULT_GRAPH_URL.to_string()
}

/// Azure AD application credentials for the Graph API
#[derive(Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AzureProperties {
    /// Mailbox the application sends as
    #[serde(default)]
    pub send_as_id: String,

    /// Azure AD tenant
    #[serde(default)]
    pub tenant_id: String,

    /// Application (client) id
    #[serde(default)]
    pub client_id: String,

    /// Application secret
    #[serde(default)]
    pub client_secret: String,

    /// OAuth scope
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Token authority base URL
    #[serde(default = "default_authority")]
    pub authority: String,

    /// Graph API base URL
    #[serde(default = "default_graph_url")]
    pub graph_url: String,
}

impl AzureProperties {
    fn validate(&self, municipality_id: &str) -> Result<(), ConfigurationError> {
        require(municipality_id, "send-as-id", &self.send_as_id)?;
        require(municipality_id, "tenant-id", &self.tenant_id)?;
        require(municipality_id, "client-id", &self.client_id)?;
        require(municipality_id, "client-secret", &self.client_secret)
    }
}

impl std::fmt::Debug for AzureProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureProperties")
            .field("send_as_id", &self.send_as_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"********")
            .field("scope", &self.scope)
            .field("authority", &self.authority)
            .field("graph_url", &self.graph_url)
            .finish()
    }
}

fn require(municipality_id: &str, field: &'static str, value: &str) -> Result<(), ConfigurationError> {
    if value.trim().is_empty() {
        return Err(ConfigurationError::BlankProperty {
            municipality_id: municipality_id.to_string(),
            field,
        });
    }

    Ok(())
}

#[cfg(test)]
pub mod tests {
    use config::FileFormat;
    use testresult::TestResult;

    use super::*;

    pub const SAMPLE: &str = r#"
integration:
  email:
    default-properties:
      tls: opportunistic
      timeout: "10"
    instances:
      "2281":
        basic:
          host: smtp.sundsvall.se
          username: someUsername
          password: somePassword
          properties:
            timeout: "30"
            verify-tls: "false"
      "2260":
        azure:
          send-as-id: noreply@ange.se
          tenant-id: someTenantId
          client-id: someClientId
          client-secret: someClientSecret
"#;

    pub fn parse(yaml: &str) -> Result<EmailConfig, ConfigurationError> {
        let config = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?;

        EmailConfig::from_config(config)
    }

    #[test]
    fn test_parse_sample() -> TestResult {
        let config = parse(SAMPLE)?;

        assert_eq!(config.instances.len(), 2);
        assert_eq!(config.default_properties["tls"], "opportunistic");

        let basic = config.instances["2281"].basic.as_ref().expect("basic");
        assert_eq!(basic.host, "smtp.sundsvall.se");
        assert_eq!(basic.port, 25);
        assert_eq!(basic.username.as_deref(), Some("someUsername"));

        let azure = config.instances["2260"].azure.as_ref().expect("azure");
        assert_eq!(azure.send_as_id, "noreply@ange.se");
        assert_eq!(azure.scope, DEFAULT_GRAPH_SCOPE);
        assert_eq!(azure.authority, DEFAULT_AUTHORITY);
        assert_eq!(azure.graph_url, DEFAULT_GRAPH_URL);

        Ok(())
    }

    #[test]
    fn test_instance_properties_override_defaults() -> TestResult {
        let config = parse(SAMPLE)?;
        let basic = config.instances["2281"].basic.as_ref().expect("basic");

        let merged = basic.merged_properties(&config.default_properties);

        assert_eq!(merged["tls"], "opportunistic");
        assert_eq!(merged["timeout"], "30");
        assert_eq!(merged["verify-tls"], "false");

        Ok(())
    }

    #[test]
    fn test_settings_selects_backend() -> TestResult {
        let config = parse(SAMPLE)?;

        assert!(matches!(
            config.instances["2281"].settings("2281")?,
            SenderSettings::Basic(_)
        ));
        assert!(matches!(
            config.instances["2260"].settings("2260")?,
            SenderSettings::Azure(_)
        ));

        Ok(())
    }

    #[test]
    fn test_both_backends_is_an_error() {
        let properties = MailSenderProperties {
            basic: Some(BasicProperties {
                host: "smtp.sundsvall.se".to_string(),
                ..Default::default()
            }),
            azure: config_azure(),
        };

        assert!(matches!(
            properties.settings("2281"),
            Err(ConfigurationError::AmbiguousSender(ref id)) if id == "2281"
        ));
    }

    #[test]
    fn test_neither_backend_is_an_error() {
        let properties = MailSenderProperties::default();

        assert!(matches!(
            properties.settings("2281"),
            Err(ConfigurationError::AmbiguousSender(_))
        ));
    }

    #[test]
    fn test_blank_host_is_an_error() {
        let properties = MailSenderProperties {
            basic: Some(BasicProperties::default()),
            azure: None,
        };

        assert!(matches!(
            properties.settings("2281"),
            Err(ConfigurationError::BlankProperty { field: "host", .. })
        ));
    }

    #[test]
    fn test_blank_azure_secret_is_an_error() {
        let mut azure = config_azure().expect("azure");
        azure.client_secret = " ".to_string();

        let properties = MailSenderProperties {
            basic: None,
            azure: Some(azure),
        };

        assert!(matches!(
            properties.settings("2260"),
            Err(ConfigurationError::BlankProperty {
                field: "client-secret",
                ..
            })
        ));
    }

    #[test]
    fn test_load_overlays_environment() -> TestResult {
        let path = std::env::temp_dir().join(format!("email-sender-{}.yaml", std::process::id()));
        std::fs::write(&path, SAMPLE)?;

        std::env::set_var(
            "EMAIL_SENDER__INTEGRATION__EMAIL__INSTANCES__2260__AZURE__CLIENT_SECRET",
            "secretFromEnv",
        );
        std::env::set_var(
            "EMAIL_SENDER__INTEGRATION__EMAIL__INSTANCES__2281__BASIC__PASSWORD",
            "passwordFromEnv",
        );

        let loaded = EmailConfig::load(&path.to_string_lossy());

        std::env::remove_var("EMAIL_SENDER__INTEGRATION__EMAIL__INSTANCES__2260__AZURE__CLIENT_SECRET");
        std::env::remove_var("EMAIL_SENDER__INTEGRATION__EMAIL__INSTANCES__2281__BASIC__PASSWORD");
        std::fs::remove_file(&path)?;

        let config = loaded?;

        let azure = config.instances["2260"].azure.as_ref().expect("azure");
        assert_eq!(azure.client_secret, "secretFromEnv");
        assert_eq!(azure.tenant_id, "someTenantId");

        let basic = config.instances["2281"].basic.as_ref().expect("basic");
        assert_eq!(basic.password.as_deref(), Some("passwordFromEnv"));
        assert_eq!(basic.host, "smtp.sundsvall.se");

        Ok(())
    }

    #[test]
    fn test_load_missing_file_is_an_error() {
        assert!(matches!(
            EmailConfig::load("/nonexistent/email-sender"),
            Err(ConfigurationError::Load(_))
        ));
    }

    #[test]
    fn test_azure_debug_hides_secret() {
        let azure = config_azure().expect("azure");

        let debug = format!("{azure:?}");

        assert!(!debug.contains("someClientSecret"));
        assert!(debug.contains("someTenantId"));
    }

    fn config_azure() -> Option<AzureProperties> {
        Some(AzureProperties {
            send_as_id: "noreply@ange.se".to_string(),
            tenant_id: "someTenantId".to_string(),
            client_id: "someClientId".to_string(),
            client_secret: "someClientSecret".to_string(),
            scope: default_scope(),
            authority: default_authority(),
            graph_url: default_graph_url(),
        })
    }
}
