//! Bot/abuse verification consulted once before a booking starts.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

pub const TURNSTILE_VERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";

/// Pass/fail gate. Any error inside an implementation counts as a fail.
#[async_trait]
pub trait AbuseGate: Send + Sync {
    async fn verify(&self, token: Option<&str>) -> bool;
}

/// Used when no verification secret is configured.
#[derive(Debug, Default)]
pub struct AllowAll;

#[async_trait]
impl AbuseGate for AllowAll {
    async fn verify(&self, _token: Option<&str>) -> bool {
        true
    }
}

#[derive(Debug, Deserialize)]
struct SiteVerifyReply {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

/// Cloudflare Turnstile siteverify check.
pub struct TurnstileGate {
    client: reqwest::Client,
    secret: String,
    endpoint: String,
}

impl TurnstileGate {
    pub fn new(secret: String) -> Result<Self, reqwest::Error> {
        Self::with_endpoint(secret, TURNSTILE_VERIFY_URL.to_string())
    }

    pub fn with_endpoint(secret: String, endpoint: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            secret,
            endpoint,
        })
    }

    async fn siteverify(&self, token: &str) -> Result<SiteVerifyReply, reqwest::Error> {
        self.client
            .post(&self.endpoint)
            .form(&[("secret", self.secret.as_str()), ("response", token)])
            .send()
            .await?
            .error_for_status()?
            .json::<SiteVerifyReply>()
            .await
    }
}

#[async_trait]
impl AbuseGate for TurnstileGate {
    async fn verify(&self, token: Option<&str>) -> bool {
        let Some(token) = token.filter(|t| !t.trim().is_empty()) else {
            warn!("verification token missing");
            return false;
        };
        match self.siteverify(token).await {
            Ok(reply) if reply.success => true,
            Ok(reply) => {
                warn!(codes = %reply.error_codes.join(","), "verification rejected");
                false
            }
            Err(e) => {
                warn!("verification request failed: {e}");
                false
            }
        }
    }
}
