pub mod fcm;
pub mod local;
pub mod sms;
pub mod smtp;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::Config;
use crate::db::models::{Notification, ProviderType};

pub use fcm::FcmAdapter;
pub use local::LocalAdapter;
pub use sms::{ConsoleSmsAdapter, TextbeltAdapter};
pub use smtp::SmtpAdapter;

/// Structured outcome of one adapter call.
///
/// Adapters never return `Err` and never panic outward; every failure mode
/// is folded into an outcome. `retryable` defaults to true; adapters mark
/// an outcome non-retryable when another attempt cannot succeed (missing
/// payload fields, malformed addresses).
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub success: bool,
    pub message: String,
    pub response: Option<serde_json::Value>,
    pub retryable: bool,
}

impl SendOutcome {
    pub fn success(message: impl Into<String>, response: Option<serde_json::Value>) -> Self {
        SendOutcome {
            success: true,
            message: message.into(),
            response,
            retryable: true,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        SendOutcome {
            success: false,
            message: message.into(),
            response: None,
            retryable: true,
        }
    }

    pub fn failure_with_response(
        message: impl Into<String>,
        response: serde_json::Value,
    ) -> Self {
        SendOutcome {
            success: false,
            message: message.into(),
            response: Some(response),
            retryable: true,
        }
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        SendOutcome {
            success: false,
            message: message.into(),
            response: None,
            retryable: false,
        }
    }
}

/// Contract every delivery transport implements. Adapters are stateless
/// with respect to notifications and safe for concurrent calls; per-call
/// network timeouts are the adapter's own responsibility.
#[async_trait]
pub trait ProviderAdapter: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn send(&self, notification: &Notification) -> SendOutcome;
}

/// Email payload: `{to, subject?, body, from?}`.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailPayload {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
}

/// SMS payload: `{to, body}`.
#[derive(Debug, Clone, Deserialize)]
pub struct SmsPayload {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

/// Push payload: `{token? | topic?, title?, body?, data?}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PushPayload {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Mapping from provider enum to adapter instance, built once at startup
/// from configuration. Lookup failure is treated by the worker as a
/// non-retryable `provider_unconfigured` failure.
pub struct ProviderRegistry {
    adapters: HashMap<ProviderType, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        ProviderRegistry {
            adapters: HashMap::new(),
        }
    }

    pub fn insert(&mut self, provider: ProviderType, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(provider, adapter);
    }

    pub fn get(&self, provider: ProviderType) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    pub fn contains(&self, provider: ProviderType) -> bool {
        self.adapters.contains_key(&provider)
    }

    /// Build the adapter map from configuration. For each channel a real
    /// provider is registered when credentials are present; otherwise the
    /// channel falls back to a logging adapter (LOCAL for email and push,
    /// CONSOLE_SMS for SMS) so the pipeline always has somewhere to send.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::empty();

        match config.smtp.provider.as_str() {
            "gmail" => match (&config.smtp.gmail_email, &config.smtp.gmail_app_password) {
                (Some(email), Some(password)) => {
                    match SmtpAdapter::gmail(email.clone(), password.clone()) {
                        Ok(adapter) => {
                            tracing::info!("Using Gmail SMTP for email notifications");
                            registry.insert(ProviderType::Gmail, Arc::new(adapter));
                        }
                        Err(e) => tracing::warn!("Failed to build Gmail SMTP adapter: {}", e),
                    }
                }
                _ => tracing::warn!("Gmail credentials not found"),
            },
            "outlook" => match (&config.smtp.outlook_email, &config.smtp.outlook_password) {
                (Some(email), Some(password)) => {
                    match SmtpAdapter::outlook(email.clone(), password.clone()) {
                        Ok(adapter) => {
                            tracing::info!("Using Outlook SMTP for email notifications");
                            registry.insert(ProviderType::Outlook, Arc::new(adapter));
                        }
                        Err(e) => tracing::warn!("Failed to build Outlook SMTP adapter: {}", e),
                    }
                }
                _ => tracing::warn!("Outlook credentials not found"),
            },
            "custom" => {
                match (
                    &config.smtp.host,
                    &config.smtp.username,
                    &config.smtp.password,
                ) {
                    (Some(host), Some(username), Some(password)) => {
                        let from = config
                            .smtp
                            .from_email
                            .clone()
                            .unwrap_or_else(|| username.clone());
                        match SmtpAdapter::custom(
                            host.clone(),
                            config.smtp.port,
                            username.clone(),
                            password.clone(),
                            from,
                            config.smtp.use_tls,
                        ) {
                            Ok(adapter) => {
                                tracing::info!(
                                    "Using custom SMTP ({}:{}) for email notifications",
                                    host,
                                    config.smtp.port
                                );
                                registry.insert(ProviderType::CustomSmtp, Arc::new(adapter));
                            }
                            Err(e) => {
                                tracing::warn!("Failed to build custom SMTP adapter: {}", e)
                            }
                        }
                    }
                    _ => tracing::warn!("Custom SMTP credentials not found"),
                }
            }
            _ => {}
        }

        match config.sms.provider.as_str() {
            "textbelt" => {
                tracing::info!("Using Textbelt for SMS notifications");
                registry.insert(
                    ProviderType::Textbelt,
                    Arc::new(TextbeltAdapter::new(config.sms.textbelt_api_key.clone())),
                );
            }
            _ => {
                tracing::info!("Using console SMS provider (logs to stdout)");
                registry.insert(ProviderType::ConsoleSms, Arc::new(ConsoleSmsAdapter));
            }
        }

        if let Some(ref key) = config.push.fcm_server_key {
            tracing::info!("Using Firebase FCM for push notifications");
            registry.insert(ProviderType::Fcm, Arc::new(FcmAdapter::new(key.clone())));
        }

        // Channel fallbacks: email and push fall back to LOCAL, SMS to the
        // console adapter, so a lookup for an unconfigured channel still
        // resolves somewhere visible.
        let has_email = registry.contains(ProviderType::Gmail)
            || registry.contains(ProviderType::Outlook)
            || registry.contains(ProviderType::CustomSmtp);
        if !has_email {
            tracing::info!("No SMTP provider configured; email falls back to LOCAL");
            registry.insert(ProviderType::Local, Arc::new(LocalAdapter));
        }

        let has_sms = registry.contains(ProviderType::ConsoleSms)
            || registry.contains(ProviderType::Textbelt);
        if !has_sms {
            registry.insert(ProviderType::ConsoleSms, Arc::new(ConsoleSmsAdapter));
        }

        if !registry.contains(ProviderType::Fcm) && !registry.contains(ProviderType::Local) {
            tracing::info!("FCM not configured; push falls back to LOCAL");
            registry.insert(ProviderType::Local, Arc::new(LocalAdapter));
        }

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_registers_fallbacks() {
        let registry = ProviderRegistry::from_config(&Config::default());

        assert!(registry.contains(ProviderType::Local));
        assert!(registry.contains(ProviderType::ConsoleSms));
        assert!(!registry.contains(ProviderType::Gmail));
        assert!(!registry.contains(ProviderType::Fcm));
    }

    #[test]
    fn textbelt_config_registers_textbelt() {
        let mut config = Config::default();
        config.sms.provider = "textbelt".to_string();
        let registry = ProviderRegistry::from_config(&config);

        assert!(registry.contains(ProviderType::Textbelt));
        assert!(!registry.contains(ProviderType::ConsoleSms));
    }

    #[test]
    fn fcm_key_registers_fcm() {
        let mut config = Config::default();
        config.push.fcm_server_key = Some("server-key".to_string());
        let registry = ProviderRegistry::from_config(&config);

        assert!(registry.contains(ProviderType::Fcm));
        // Email still unconfigured, so LOCAL remains registered.
        assert!(registry.contains(ProviderType::Local));
    }

    #[test]
    fn lookup_miss_returns_none() {
        let registry = ProviderRegistry::from_config(&Config::default());
        assert!(registry.get(ProviderType::Gmail).is_none());
    }
}
