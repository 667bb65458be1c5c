// config.rs
use std::env;

use crate::errors::{AppError, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mpesa_consumer_key: String,
    pub mpesa_consumer_secret: String,
    pub mpesa_short_code: String,
    pub mpesa_passkey: String,
    pub mpesa_callback_url: String,
    pub mpesa_environment: String,
    pub mpesa_timeout_secs: u64,
}

fn required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| AppError::configuration(format!("{} must be set", key)))
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let mpesa_environment =
            env::var("MPESA_ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string());

        Ok(AppConfig {
            mpesa_consumer_key: required("MPESA_CONSUMER_KEY")?,
            mpesa_consumer_secret: required("MPESA_CONSUMER_SECRET")?,
            mpesa_short_code: required("MPESA_SHORT_CODE")?,
            mpesa_passkey: required("MPESA_PASSKEY")?,
            mpesa_callback_url: required("MPESA_CALLBACK_URL")?,
            mpesa_environment,
            mpesa_timeout_secs: env::var("MPESA_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        })
    }

    pub fn is_production(&self) -> bool {
        self.mpesa_environment == "production"
    }

    pub fn get_mpesa_urls(&self) -> (String, String) {
        let base_url = if self.is_production() {
            "https://api.safaricom.co.ke"
        } else {
            "https://sandbox.safaricom.co.ke"
        };

        let auth_url = format!("{}/oauth/v1/generate?grant_type=client_credentials", base_url);
        let stk_url = format!("{}/mpesa/stkpush/v1/processrequest", base_url);

        (auth_url, stk_url)
    }
}
