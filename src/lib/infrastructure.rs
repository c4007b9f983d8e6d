//! Adapters connecting the domain to the outside world

pub mod email;
pub mod http;
