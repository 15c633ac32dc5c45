//! Configuration loading from environment.

use std::env;

/// Application configuration.
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    /// Webhook signing secrets; a gateway without a secret has its
    /// callbacks rejected.
    pub razorpay_webhook_secret: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub commission_rate_bps: u32,
    pub commission_delay_secs: u64,
    pub worker_poll_interval_ms: u64,
    pub kyc_provider_url: Option<String>,
    pub refund_gateway_url: Option<String>,
    pub kyc_return_url: String,
    pub rate_limit_per_minute: u32,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()?;

        let commission_rate_bps = env::var("COMMISSION_RATE_BPS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()?;

        let commission_delay_secs = env::var("COMMISSION_DELAY_SECS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()?;

        let worker_poll_interval_ms = env::var("WORKER_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "500".to_string())
            .parse()?;

        let rate_limit_per_minute = env::var("RATE_LIMIT_PER_MINUTE")
            .unwrap_or_else(|_| "100".to_string())
            .parse()?;

        let kyc_return_url = env::var("KYC_RETURN_URL")
            .unwrap_or_else(|_| "https://app.example.com/kyc/return".to_string());

        Ok(Self {
            port,
            database_url: env::var("DATABASE_URL").ok(),
            razorpay_webhook_secret: env::var("RAZORPAY_WEBHOOK_SECRET").ok(),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").ok(),
            commission_rate_bps,
            commission_delay_secs,
            worker_poll_interval_ms,
            kyc_provider_url: env::var("KYC_PROVIDER_URL").ok(),
            refund_gateway_url: env::var("REFUND_GATEWAY_URL").ok(),
            kyc_return_url,
            rate_limit_per_minute,
        })
    }
}
