use async_trait::async_trait;

use crate::db::models::Notification;
use crate::providers::{ProviderAdapter, SendOutcome};

/// Fallback adapter that "delivers" by writing a banner to stdout. Always
/// succeeds; payloads that are not valid JSON are printed raw.
pub struct LocalAdapter;

#[async_trait]
impl ProviderAdapter for LocalAdapter {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn send(&self, notification: &Notification) -> SendOutcome {
        let line = "-".repeat(55);
        println!("\n{}", line);
        println!(
            "LOCAL NOTIFICATION - {}",
            notification.message_type.as_str()
        );
        println!("{}", line);
        println!("Notification ID: {}", notification.id);
        println!("User ID:         {}", notification.user_id);
        println!("Type:            {}", notification.message_type.as_str());
        println!("Provider:        {}", notification.provider.as_str());
        println!(
            "Time:            {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
        );
        println!("{}", line);

        match serde_json::from_str::<serde_json::Value>(&notification.payload) {
            Ok(serde_json::Value::Object(fields)) => {
                for (key, value) in fields {
                    let rendered = match value {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    if key == "body" && rendered.chars().count() > 100 {
                        let truncated: String = rendered.chars().take(100).collect();
                        println!("{}: {}...", key, truncated);
                    } else {
                        println!("{}: {}", key, rendered);
                    }
                }
            }
            _ => println!("Payload: {}", notification.payload),
        }
        println!("{}\n", line);

        SendOutcome::success(
            "Notification logged locally",
            Some(serde_json::json!({ "notification_id": notification.id })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{MessageType, NotificationStatus, ProviderType};
    use crate::db::now_ms;

    fn notification(payload: &str) -> Notification {
        Notification {
            id: "n-local".to_string(),
            user_id: "user-1".to_string(),
            idempotency_key: "k-local".to_string(),
            message_type: MessageType::Email,
            provider: ProviderType::Local,
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
    async fn always_succeeds_on_json_payload() {
        let outcome = LocalAdapter
            .send(&notification(r#"{"to":"a@x","subject":"s","body":"b"}"#))
            .await;
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn always_succeeds_on_raw_payload() {
        let outcome = LocalAdapter.send(&notification("not json at all")).await;
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn long_multibyte_body_is_truncated_without_panicking() {
        // 99 ASCII chars followed by multibyte chars; a byte-indexed slice
        // at 100 would land mid-codepoint.
        let body = format!("{}ééééé", "a".repeat(99));
        let payload = serde_json::json!({ "to": "a@x", "body": body }).to_string();

        let outcome = LocalAdapter.send(&notification(&payload)).await;
        assert!(outcome.success);
    }
}
