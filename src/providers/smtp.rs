use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::db::models::Notification;
use crate::error::{AppError, AppResult};
use crate::providers::{EmailPayload, ProviderAdapter, SendOutcome};

const GMAIL_HOST: &str = "smtp.gmail.com";
const OUTLOOK_HOST: &str = "smtp-mail.outlook.com";
const SUBMISSION_PORT: u16 = 587;

/// Email delivery over SMTP. `use_tls = true` builds a STARTTLS relay
/// (submission port 587); `use_tls = false` builds an implicit-TLS relay on
/// the configured port. Messages go out as multipart/alternative with an
/// HTML part.
pub struct SmtpAdapter {
    name: &'static str,
    from_email: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpAdapter {
    fn build(
        name: &'static str,
        host: String,
        port: u16,
        username: String,
        password: String,
        from_email: String,
        use_tls: bool,
    ) -> AppResult<Self> {
        let credentials = Credentials::new(username, password);

        let transport = if use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)
                .map_err(|e| AppError::Config(format!("SMTP relay {}: {}", host, e)))?
                .port(port)
                .credentials(credentials)
                .build()
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
                .map_err(|e| AppError::Config(format!("SMTP relay {}: {}", host, e)))?
                .port(port)
                .credentials(credentials)
                .build()
        };

        Ok(SmtpAdapter {
            name,
            from_email,
            transport,
        })
    }

    pub fn gmail(email: String, app_password: String) -> AppResult<Self> {
        Self::build(
            "gmail",
            GMAIL_HOST.to_string(),
            SUBMISSION_PORT,
            email.clone(),
            app_password,
            email,
            true,
        )
    }

    pub fn outlook(email: String, password: String) -> AppResult<Self> {
        Self::build(
            "outlook",
            OUTLOOK_HOST.to_string(),
            SUBMISSION_PORT,
            email.clone(),
            password,
            email,
            true,
        )
    }

    pub fn custom(
        host: String,
        port: u16,
        username: String,
        password: String,
        from_email: String,
        use_tls: bool,
    ) -> AppResult<Self> {
        Self::build("smtp", host, port, username, password, from_email, use_tls)
    }
}

#[async_trait]
impl ProviderAdapter for SmtpAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send(&self, notification: &Notification) -> SendOutcome {
        let payload: EmailPayload = match serde_json::from_str(&notification.payload) {
            Ok(p) => p,
            Err(e) => return SendOutcome::non_retryable(format!("invalid email payload: {}", e)),
        };

        let to = match payload.to.as_deref().filter(|s| !s.is_empty()) {
            Some(to) => to,
            None => return SendOutcome::non_retryable("Missing \"to\" field in payload"),
        };
        let body = match payload.body.as_deref().filter(|s| !s.is_empty()) {
            Some(body) => body,
            None => return SendOutcome::non_retryable("Missing \"body\" field in payload"),
        };
        let subject = payload.subject.as_deref().unwrap_or("Notification");
        let from = payload.from.as_deref().unwrap_or(&self.from_email);

        let from_mailbox: Mailbox = match from.parse() {
            Ok(m) => m,
            Err(e) => {
                return SendOutcome::non_retryable(format!("invalid from address {}: {}", from, e))
            }
        };
        let to_mailbox: Mailbox = match to.parse() {
            Ok(m) => m,
            Err(e) => {
                return SendOutcome::non_retryable(format!("invalid to address {}: {}", to, e))
            }
        };

        let html_part = SinglePart::builder()
            .header(ContentType::TEXT_HTML)
            .body(body.to_string());

        let message = match Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .multipart(MultiPart::alternative().singlepart(html_part))
        {
            Ok(m) => m,
            Err(e) => return SendOutcome::non_retryable(format!("failed to build email: {}", e)),
        };

        match self.transport.send(message).await {
            Ok(_) => SendOutcome::success(
                format!("Email sent via SMTP to {}", to),
                Some(serde_json::json!({ "to": to, "subject": subject })),
            ),
            Err(e) => SendOutcome::failure(format!("SMTP send failed: {}", e)),
        }
    }
}
