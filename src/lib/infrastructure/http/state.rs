//! Application state module

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};

use crate::domain::communication::service::EmailService;

/// Global application state
#[derive(Clone)]
pub struct AppState<E: EmailService> {
    /// The time the server started
    pub start_time: DateTime<Utc>,

    /// Email service
    pub emails: Arc<E>,
}

impl<E: EmailService> AppState<E> {
    /// Create a new application state
    pub fn new(emails: E) -> Self {
        Self {
            start_time: Utc::now(),
            emails: Arc::new(emails),
        }
    }
}

impl<E: EmailService> fmt::Debug for AppState<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("start_time", &self.start_time)
            .field("emails", &"EmailService")
            .finish()
    }
}
