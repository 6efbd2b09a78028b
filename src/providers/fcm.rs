use std::time::Duration;

use async_trait::async_trait;

use crate::db::models::Notification;
use crate::providers::{ProviderAdapter, PushPayload, SendOutcome};

const FCM_API_URL: &str = "https://fcm.googleapis.com/fcm/send";

/// Push delivery through Firebase Cloud Messaging (legacy HTTP API).
pub struct FcmAdapter {
    server_key: String,
    api_url: String,
    client: reqwest::Client,
}

impl FcmAdapter {
    pub fn new(server_key: String) -> Self {
        Self::with_api_url(server_key, FCM_API_URL.to_string())
    }

    pub fn with_api_url(server_key: String, api_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        FcmAdapter {
            server_key,
            api_url,
            client,
        }
    }

    /// Build the FCM request body from a push payload. The target is either
    /// a device token or `/topics/<topic>`.
    fn build_message(payload: &PushPayload) -> Option<serde_json::Value> {
        let to = match (&payload.token, &payload.topic) {
            (Some(token), _) if !token.is_empty() => token.clone(),
            (_, Some(topic)) if !topic.is_empty() => format!("/topics/{}", topic),
            _ => return None,
        };

        let mut message = serde_json::json!({
            "notification": {
                "title": payload.title.as_deref().unwrap_or("Notification"),
                "body": payload.body.as_deref().unwrap_or(""),
            },
            "to": to,
        });
        if let Some(ref data) = payload.data {
            message["data"] = data.clone();
        }

        Some(message)
    }
}

#[async_trait]
impl ProviderAdapter for FcmAdapter {
    fn name(&self) -> &'static str {
        "fcm"
    }

    async fn send(&self, notification: &Notification) -> SendOutcome {
        let payload: PushPayload = match serde_json::from_str(&notification.payload) {
            Ok(p) => p,
            Err(e) => return SendOutcome::non_retryable(format!("invalid push payload: {}", e)),
        };

        let message = match Self::build_message(&payload) {
            Some(m) => m,
            None => {
                return SendOutcome::non_retryable(
                    "Missing \"token\" or \"topic\" field in payload",
                )
            }
        };

        let response = match self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&message)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return SendOutcome::failure(format!("FCM request failed: {}", e)),
        };

        let status = response.status();
        if status.as_u16() >= 400 {
            let text = response.text().await.unwrap_or_default();
            return SendOutcome::failure(format!(
                "FCM returned error status {}: {}",
                status.as_u16(),
                text
            ));
        }

        let result: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => return SendOutcome::failure(format!("FCM response parse failed: {}", e)),
        };

        let success_count = result.get("success").and_then(|v| v.as_i64()).unwrap_or(0);
        if success_count > 0 {
            return SendOutcome::success("Push notification sent via FCM", Some(result));
        }

        let error = result
            .get("results")
            .and_then(|r| r.get(0))
            .and_then(|r| r.get("error"))
            .and_then(|e| e.as_str())
            .unwrap_or("Unknown error")
            .to_string();

        SendOutcome::failure_with_response(format!("FCM error: {}", error), result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_targets_token_over_topic() {
        let payload = PushPayload {
            token: Some("device-token".to_string()),
            topic: Some("news".to_string()),
            title: Some("Hi".to_string()),
            body: Some("there".to_string()),
            data: None,
        };

        let message = FcmAdapter::build_message(&payload).unwrap();
        assert_eq!(message["to"], "device-token");
        assert_eq!(message["notification"]["title"], "Hi");
        assert_eq!(message["notification"]["body"], "there");
    }

    #[test]
    fn message_targets_topic_path_when_no_token() {
        let payload = PushPayload {
            token: None,
            topic: Some("news".to_string()),
            title: None,
            body: None,
            data: None,
        };

        let message = FcmAdapter::build_message(&payload).unwrap();
        assert_eq!(message["to"], "/topics/news");
        assert_eq!(message["notification"]["title"], "Notification");
    }

    #[test]
    fn message_carries_data_when_present() {
        let payload = PushPayload {
            token: Some("t".to_string()),
            topic: None,
            title: None,
            body: None,
            data: Some(serde_json::json!({"k": "v"})),
        };

        let message = FcmAdapter::build_message(&payload).unwrap();
        assert_eq!(message["data"]["k"], "v");
    }

    #[test]
    fn message_requires_token_or_topic() {
        let payload = PushPayload {
            token: None,
            topic: None,
            title: Some("x".to_string()),
            body: None,
            data: None,
        };
        assert!(FcmAdapter::build_message(&payload).is_none());
    }
}
