// services/mpesa_service.rs
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use chrono::Utc;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::AppConfig;
use crate::errors::{AppError, Result};

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub expires_in: String,
}

#[derive(Debug, Serialize)]
pub struct StkPushRequest {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "TransactionType")]
    pub transaction_type: String,
    #[serde(rename = "Amount")]
    pub amount: String,
    #[serde(rename = "PartyA")]
    pub party_a: String,
    #[serde(rename = "PartyB")]
    pub party_b: String,
    #[serde(rename = "PhoneNumber")]
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    #[serde(rename = "AccountReference")]
    pub account_reference: String,
    #[serde(rename = "TransactionDesc")]
    pub transaction_desc: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription")]
    pub response_description: String,
    #[serde(rename = "CustomerMessage")]
    pub customer_message: String,
}

// ===== Callback payload (delivered by the gateway, at least once) =====

#[derive(Debug, Deserialize)]
pub struct MpesaCallback {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,

    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,

    #[serde(rename = "ResultCode")]
    pub result_code: i32,

    #[serde(rename = "ResultDesc")]
    pub result_desc: String,

    #[serde(rename = "CallbackMetadata")]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item")]
    pub items: Vec<CallbackItem>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Value", default)]
    pub value: Option<serde_json::Value>,
}

impl StkCallback {
    fn metadata_value(&self, name: &str) -> Option<&serde_json::Value> {
        self.callback_metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.name == name)?
            .value
            .as_ref()
    }

    /// MpesaReceiptNumber from the callback metadata, present on success.
    pub fn receipt(&self) -> Option<String> {
        self.metadata_value("MpesaReceiptNumber")
            .and_then(|v| v.as_str().map(|s| s.to_string()))
    }

    pub fn amount(&self) -> Option<f64> {
        self.metadata_value("Amount").and_then(|v| v.as_f64())
    }
}

/// Outbound half of the gateway contract: fire an STK push, get back the
/// correlation token for the attempt. The inbound half is the callback.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn stk_push(
        &self,
        phone_number: &str,
        amount: f64,
        account_reference: &str,
        transaction_desc: &str,
    ) -> Result<StkPushResponse>;
}

#[derive(Debug, Clone)]
pub struct MpesaService {
    config: AppConfig,
    client: Client,
    cached_token: Arc<RwLock<Option<(String, chrono::DateTime<Utc>)>>>,
}

impl MpesaService {
    pub fn new(config: AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.mpesa_timeout_secs))
            .build()
            .map_err(|e| AppError::configuration(format!("HTTP client: {}", e)))?;

        Ok(MpesaService {
            config,
            client,
            cached_token: Arc::new(RwLock::new(None)),
        })
    }

    fn format_phone_number(&self, phone: &str) -> String {
        let phone = phone.trim();
        if phone.starts_with("254") && phone.len() == 12 {
            return phone.to_string();
        }
        if phone.starts_with("07") && phone.len() == 10 {
            return format!("254{}", &phone[1..]);
        }
        if phone.starts_with('7') && phone.len() == 9 {
            return format!("254{}", phone);
        }
        phone.to_string()
    }

    fn generate_password(&self, timestamp: &str) -> String {
        let password_string = format!(
            "{}{}{}",
            self.config.mpesa_short_code, self.config.mpesa_passkey, timestamp
        );
        base64.encode(password_string)
    }

    pub async fn get_access_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().expect("lock poisoned");
            if let Some((token, expiry)) = cached.as_ref() {
                if *expiry > Utc::now() + chrono::Duration::minutes(5) {
                    return Ok(token.clone());
                }
            }
        }

        info!("Requesting new M-Pesa access token");
        let auth_string = format!(
            "{}:{}",
            self.config.mpesa_consumer_key, self.config.mpesa_consumer_secret
        );
        let encoded_auth = base64.encode(auth_string);

        let (auth_url, _) = self.config.get_mpesa_urls();

        let response = self
            .client
            .get(&auth_url)
            .header(header::AUTHORIZATION, format!("Basic {}", encoded_auth))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Failed to get access token: {} - {}", status, body);
            return Err(AppError::mpesa(format!("auth failed: {}", status)));
        }

        let auth_response: AuthResponse = response.json().await?;

        {
            let expiry_time = Utc::now() + chrono::Duration::hours(1);
            let mut cached = self.cached_token.write().expect("lock poisoned");
            *cached = Some((auth_response.access_token.clone(), expiry_time));
        }

        Ok(auth_response.access_token)
    }
}

#[async_trait]
impl PaymentGateway for MpesaService {
    async fn stk_push(
        &self,
        phone_number: &str,
        amount: f64,
        account_reference: &str,
        transaction_desc: &str,
    ) -> Result<StkPushResponse> {
        info!("STK push for {} - KSh {}", phone_number, amount);

        if amount <= 0.0 {
            return Err(AppError::invalid_input("Amount must be greater than 0"));
        }

        let access_token = self.get_access_token().await?;
        let formatted_phone = self.format_phone_number(phone_number);
        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let password = self.generate_password(&timestamp);

        let (_, stk_url) = self.config.get_mpesa_urls();

        // Daraja takes whole-shilling amounts.
        let stk_request = StkPushRequest {
            business_short_code: self.config.mpesa_short_code.clone(),
            password,
            timestamp,
            transaction_type: "CustomerPayBillOnline".to_string(),
            amount: format!("{}", amount.round() as i64),
            party_a: formatted_phone.clone(),
            party_b: self.config.mpesa_short_code.clone(),
            phone_number: formatted_phone,
            callback_url: self.config.mpesa_callback_url.clone(),
            account_reference: account_reference.to_string(),
            transaction_desc: transaction_desc.to_string(),
        };

        let response = self
            .client
            .post(&stk_url)
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .header(header::CONTENT_TYPE, "application/json")
            .json(&stk_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("STK push failed: {} - {}", status, body);
            return Err(AppError::mpesa(format!("STK push failed: {}", status)));
        }

        let stk_response: StkPushResponse = response.json().await?;
        info!(
            "STK push initiated: {} / {}",
            stk_response.merchant_request_id, stk_response.checkout_request_id
        );
        Ok(stk_response)
    }
}
