//! Receipt delivery by email.
//!
//! Which [`Notifier`] runs is decided once at startup: SMTP when the transport
//! is configured, a simulation otherwise. The two never mix within a process.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;

use crate::config::{Config, MailConfig};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid address `{0}`")]
    Address(String),
    #[error("could not build message: {0}")]
    Message(String),
    #[error("delivery failed: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub delivered: bool,
    pub simulated: bool,
}

/// A receipt document addressed to one recipient.
#[derive(Debug, Clone)]
pub struct ReceiptMail {
    pub receipt_id: String,
    pub recipient_email: String,
    pub recipient_name: String,
    pub file_name: String,
    pub document: Vec<u8>,
    pub sender_name: String,
}

impl ReceiptMail {
    pub fn subject(&self) -> String {
        format!("Payment Receipt - {}", self.receipt_id)
    }

    pub fn html_body(&self) -> String {
        format!(
            "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
             <h2 style=\"color: #2c3e50;\">Payment Receipt</h2>\
             <p>Dear {name},</p>\
             <p>Thank you for your payment. Please find attached your payment receipt.</p>\
             <p><strong>Receipt ID:</strong> {id}</p>\
             <p>If you have any questions, please contact us.</p>\
             <br><p>Best regards,<br>{sender} Team</p></div>",
            name = escape(&self.recipient_name),
            id = escape(&self.receipt_id),
            sender = escape(&self.sender_name),
        )
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, mail: ReceiptMail) -> Result<Delivery, NotifyError>;
}

pub fn from_config(config: &Config) -> Result<Box<dyn Notifier>, NotifyError> {
    match &config.mail {
        Some(mail) => {
            log::info!("Receipt emails go through SMTP relay {}", mail.host);
            Ok(Box::new(SmtpNotifier::new(mail)?))
        }
        None => Ok(Box::new(SimulatedNotifier::new(config.mail_simulation_delay))),
    }
}

/// Pretends to deliver after a short pause. Nothing leaves the process.
pub struct SimulatedNotifier {
    delay: Duration,
}

impl SimulatedNotifier {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Notifier for SimulatedNotifier {
    async fn send(&self, mail: ReceiptMail) -> Result<Delivery, NotifyError> {
        log::info!(
            "Simulating delivery of receipt {} to {}",
            mail.receipt_id,
            mail.recipient_email
        );
        tokio::time::sleep(self.delay).await;
        Ok(Delivery {
            delivered: true,
            simulated: true,
        })
    }
}

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(mail: &MailConfig) -> Result<Self, NotifyError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&mail.host)
            .map_err(|err| NotifyError::Transport(err.to_string()))?
            .credentials(Credentials::new(
                mail.username.clone(),
                mail.password.clone(),
            ));
        if let Some(port) = mail.port {
            builder = builder.port(port);
        }
        let from = mail
            .from
            .parse::<Mailbox>()
            .map_err(|_| NotifyError::Address(mail.from.clone()))?;
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn message(&self, mail: &ReceiptMail) -> Result<Message, NotifyError> {
        let address = mail
            .recipient_email
            .parse::<Address>()
            .map_err(|_| NotifyError::Address(mail.recipient_email.clone()))?;
        let name = Some(mail.recipient_name.clone()).filter(|name| !name.trim().is_empty());
        let pdf = ContentType::parse("application/pdf")
            .map_err(|err| NotifyError::Message(err.to_string()))?;

        Message::builder()
            .from(self.from.clone())
            .to(Mailbox::new(name, address))
            .subject(mail.subject())
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::html(mail.html_body()))
                    .singlepart(Attachment::new(mail.file_name.clone()).body(mail.document.clone(), pdf)),
            )
            .map_err(|err| NotifyError::Message(err.to_string()))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, mail: ReceiptMail) -> Result<Delivery, NotifyError> {
        let message = self.message(&mail)?;
        self.transport
            .send(message)
            .await
            .map_err(|err| NotifyError::Transport(err.to_string()))?;
        log::info!(
            "Receipt {} sent to {}",
            mail.receipt_id,
            mail.recipient_email
        );
        Ok(Delivery {
            delivered: true,
            simulated: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail() -> ReceiptMail {
        ReceiptMail {
            receipt_id: "REC1_a".to_string(),
            recipient_email: "jane@x.com".to_string(),
            recipient_name: "Jane <script>".to_string(),
            file_name: "receipt_REC1_a.pdf".to_string(),
            document: b"%PDF-1.3".to_vec(),
            sender_name: "Auralith Bit".to_string(),
        }
    }

    #[tokio::test]
    async fn simulation_reports_simulated_delivery() {
        let delivery = SimulatedNotifier::new(Duration::ZERO)
            .send(mail())
            .await
            .unwrap();
        assert_eq!(
            delivery,
            Delivery {
                delivered: true,
                simulated: true
            }
        );
    }

    #[test]
    fn body_escapes_recipient_name() {
        let body = mail().html_body();
        assert!(body.contains("Dear Jane &lt;script&gt;"));
        assert!(body.contains("REC1_a"));
        assert_eq!(mail().subject(), "Payment Receipt - REC1_a");
    }

    #[tokio::test]
    async fn smtp_message_rejects_bad_recipient() {
        let notifier = SmtpNotifier::new(&MailConfig {
            host: "smtp.example.com".to_string(),
            port: Some(2525),
            username: "mailer@example.com".to_string(),
            password: "secret".to_string(),
            from: "Auralith Bit <mailer@example.com>".to_string(),
        })
        .unwrap();
        let err = notifier
            .message(&ReceiptMail {
                recipient_email: "not-an-address".to_string(),
                ..mail()
            })
            .unwrap_err();
        assert!(matches!(err, NotifyError::Address(_)));
        assert!(notifier.message(&mail()).is_ok());
    }
}
