use crate::error::AppError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, instrument};

pub const REPORT_SUBJECT: &str = "Threat Report Triggered";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
}

impl EmailMessage {
    pub fn threat_report(from: &str, to: &str, threat_info: &Value) -> Self {
        Self {
            from: from.to_string(),
            to: vec![to.to_string()],
            subject: REPORT_SUBJECT.to_string(),
            text: format!("Threat detected on page:\n\n{}", describe(threat_info)),
        }
    }
}

fn describe(threat_info: &Value) -> String {
    match threat_info {
        Value::Null => "No details provided.".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Outbound mail transport.
#[async_trait]
pub trait EmailRelay: Send + Sync {
    async fn send(&self, user: &str, password: &str, message: &EmailMessage) -> Result<(), AppError>;
}

/// Posts messages as JSON to an HTTP mail relay using basic auth.
pub struct HttpEmailRelay {
    client: reqwest::Client,
    api_url: String,
}

impl HttpEmailRelay {
    pub fn new(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }
}

#[async_trait]
impl EmailRelay for HttpEmailRelay {
    #[instrument(skip(self, password, message), fields(to = ?message.to, subject = %message.subject))]
    async fn send(&self, user: &str, password: &str, message: &EmailMessage) -> Result<(), AppError> {
        let response = self
            .client
            .post(&self.api_url)
            .basic_auth(user, Some(password))
            .json(message)
            .send()
            .await;

        match response {
            Ok(res) if res.status().is_success() => {
                info!("Threat report email sent");
                Ok(())
            }
            Ok(res) => {
                let status = res.status();
                let error_text = res
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                error!("Failed to send email. Status: {}, Error: {}", status, error_text);
                Err(AppError::Notification(format!(
                    "Email send failed with status {}: {}",
                    status, error_text
                )))
            }
            Err(e) => {
                error!("Network error while sending email: {:?}", e);
                Err(AppError::Notification(format!("Network error: {}", e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_message() {
        let message = EmailMessage::threat_report(
            "me@example.com",
            "alerts@example.com",
            &json!("Phishing form on https://bad.test"),
        );
        assert_eq!(message.subject, REPORT_SUBJECT);
        assert_eq!(message.to, vec!["alerts@example.com".to_string()]);
        assert_eq!(
            message.text,
            "Threat detected on page:\n\nPhishing form on https://bad.test"
        );
    }

    #[test]
    fn test_structured_and_missing_details() {
        let message = EmailMessage::threat_report("a", "b", &json!({"site": "x"}));
        assert!(message.text.ends_with("{\"site\":\"x\"}"));

        let message = EmailMessage::threat_report("a", "b", &Value::Null);
        assert!(message.text.ends_with("No details provided."));
    }
}
