use std::time::Duration;

use async_trait::async_trait;

use crate::db::models::Notification;
use crate::providers::{ProviderAdapter, SendOutcome, SmsPayload};

const TEXTBELT_API_URL: &str = "https://textbelt.com/text";

fn parse_sms_payload(raw: &str) -> Result<(String, String), SendOutcome> {
    let payload: SmsPayload = match serde_json::from_str(raw) {
        Ok(p) => p,
        Err(e) => return Err(SendOutcome::non_retryable(format!("invalid SMS payload: {}", e))),
    };

    let to = match payload.to.filter(|s| !s.is_empty()) {
        Some(to) => to,
        None => return Err(SendOutcome::non_retryable("Missing \"to\" field in payload")),
    };
    let body = match payload.body.filter(|s| !s.is_empty()) {
        Some(body) => body,
        None => return Err(SendOutcome::non_retryable("Missing \"body\" field in payload")),
    };

    Ok((to, body))
}

/// SMS "delivery" that writes a fixed-width banner to stdout. Used as the
/// default SMS transport and as the fallback when none is configured.
pub struct ConsoleSmsAdapter;

#[async_trait]
impl ProviderAdapter for ConsoleSmsAdapter {
    fn name(&self) -> &'static str {
        "console_sms"
    }

    async fn send(&self, notification: &Notification) -> SendOutcome {
        let (to, body) = match parse_sms_payload(&notification.payload) {
            Ok(fields) => fields,
            Err(outcome) => return outcome,
        };

        let line = "-".repeat(55);
        println!("\n{}", line);
        println!("SMS NOTIFICATION");
        println!("{}", line);
        println!("To:      {}", to);
        println!("Message: {}", body);
        println!(
            "Time:    {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
        );
        println!("{}\n", line);

        SendOutcome::success(
            format!("SMS logged to console for {}", to),
            Some(serde_json::json!({ "to": to, "body": body })),
        )
    }
}

/// SMS delivery through the Textbelt HTTP API.
pub struct TextbeltAdapter {
    api_key: String,
    api_url: String,
    client: reqwest::Client,
}

impl TextbeltAdapter {
    pub fn new(api_key: String) -> Self {
        Self::with_api_url(api_key, TEXTBELT_API_URL.to_string())
    }

    pub fn with_api_url(api_key: String, api_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        TextbeltAdapter {
            api_key,
            api_url,
            client,
        }
    }
}

#[async_trait]
impl ProviderAdapter for TextbeltAdapter {
    fn name(&self) -> &'static str {
        "textbelt"
    }

    async fn send(&self, notification: &Notification) -> SendOutcome {
        let (to, body) = match parse_sms_payload(&notification.payload) {
            Ok(fields) => fields,
            Err(outcome) => return outcome,
        };

        let request = serde_json::json!({
            "phone": to,
            "message": body,
            "key": self.api_key,
        });

        let response = match self.client.post(&self.api_url).json(&request).send().await {
            Ok(r) => r,
            Err(e) => return SendOutcome::failure(format!("Textbelt request failed: {}", e)),
        };

        let result: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => return SendOutcome::failure(format!("Textbelt response parse failed: {}", e)),
        };

        if result.get("success").and_then(|v| v.as_bool()).unwrap_or(false) {
            SendOutcome::success(format!("SMS sent via Textbelt to {}", to), Some(result))
        } else {
            let error = result
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown error")
                .to_string();
            SendOutcome::failure_with_response(format!("Textbelt error: {}", error), result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{MessageType, NotificationStatus, ProviderType};
    use crate::db::now_ms;

    fn notification(payload: &str) -> Notification {
        Notification {
            id: "n-1".to_string(),
            user_id: "user-1".to_string(),
            idempotency_key: "k-1".to_string(),
            message_type: MessageType::Sms,
            provider: ProviderType::ConsoleSms,
            status: NotificationStatus::Pending,
            payload: payload.to_string(),
            attempt_count: 1,
            max_retries: 5,
            created_at: now_ms(),
            updated_at: now_ms(),
            send_at: None,
            last_attempted_at: None,
            sent_at: None,
            failed_at: None,
            error_message: None,
            provider_response: None,
        }
    }

    #[tokio::test]
    async fn console_sms_succeeds_with_complete_payload() {
        let outcome = ConsoleSmsAdapter
            .send(&notification(r#"{"to":"+15550100","body":"hello"}"#))
            .await;
        assert!(outcome.success);
        assert!(outcome.response.is_some());
    }

    #[tokio::test]
    async fn console_sms_rejects_missing_to_as_non_retryable() {
        let outcome = ConsoleSmsAdapter
            .send(&notification(r#"{"body":"hello"}"#))
            .await;
        assert!(!outcome.success);
        assert!(!outcome.retryable);
        assert!(outcome.message.contains("\"to\""));
    }

    #[tokio::test]
    async fn console_sms_rejects_missing_body_as_non_retryable() {
        let outcome = ConsoleSmsAdapter
            .send(&notification(r#"{"to":"+15550100"}"#))
            .await;
        assert!(!outcome.success);
        assert!(!outcome.retryable);
        assert!(outcome.message.contains("\"body\""));
    }

    #[tokio::test]
    async fn malformed_json_payload_is_non_retryable() {
        let outcome = ConsoleSmsAdapter.send(&notification("not json")).await;
        assert!(!outcome.success);
        assert!(!outcome.retryable);
    }
}
