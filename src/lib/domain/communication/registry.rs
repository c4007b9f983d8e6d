//! Municipality to mail sender lookup

use std::{collections::HashMap, fmt};

use thiserror::Error;

use super::mailer::Mailer;

/// Errors raised when resolving a mail sender
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No sender is configured for the municipality
    #[error("No mail sender exists for municipalityId {0}")]
    NoSenderConfigured(String),
}

/// Immutable map from municipality id to the mail sender serving it.
///
/// Built once at startup and only read afterwards.
pub struct MailSenderRegistry<M: Mailer> {
    senders: HashMap<String, M>,
}

impl<M: Mailer> MailSenderRegistry<M> {
    /// Create a registry from an id to sender map
    pub fn new(senders: HashMap<String, M>) -> Self {
        Self { senders }
    }

    /// Returns the sender configured for `municipality_id`.
    pub fn resolve(&self, municipality_id: &str) -> Result<&M, RegistryError> {
        self.senders
            .get(municipality_id)
            .ok_or_else(|| RegistryError::NoSenderConfigured(municipality_id.to_string()))
    }

    /// The configured municipality ids, sorted
    pub fn municipality_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.senders.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of configured senders
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    /// Whether no senders are configured
    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

impl<M: Mailer> FromIterator<(String, M)> for MailSenderRegistry<M> {
    fn from_iter<I: IntoIterator<Item = (String, M)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<M: Mailer> fmt::Debug for MailSenderRegistry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailSenderRegistry")
            .field("municipality_ids", &self.municipality_ids())
            .finish()
    }
}
