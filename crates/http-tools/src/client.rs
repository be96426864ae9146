//! Outbound HTTP client policy.
//!
//! Target APIs are declared by users and frequently sit behind self-signed certificates, so the
//! default policy accepts invalid certificates. Operators can opt into verification.

use crate::error::Result;
use reqwest::Client;
use std::time::Duration;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Upper bound for one outbound call (connect + send + body read).
    pub timeout: Duration,
    /// Skip TLS certificate verification.
    pub accept_invalid_certs: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CALL_TIMEOUT,
            accept_invalid_certs: true,
        }
    }
}

impl ClientSettings {
    /// Build the shared `reqwest` client for tool calls.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn build_client(&self) -> Result<Client> {
        if self.accept_invalid_certs {
            tracing::debug!("outbound tool calls accept invalid TLS certificates");
        }
        let client = Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()?;
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_call_policy() {
        let settings = ClientSettings::default();
        assert_eq!(settings.timeout, Duration::from_secs(60));
        assert!(settings.accept_invalid_certs);
        settings.build_client().expect("client");
    }
}
