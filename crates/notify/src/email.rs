//! SMTP email notifier via `lettre` with TLS support.
//!
//! Delivers rendered reports as HTML emails through an SMTP server.
//! Supports STARTTLS and implicit TLS connections.

use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use vibesense_core::config::SmtpConfig;

use crate::traits::{Notification, Notifier, NotifyError, Recipient};

/// Sends notifications as emails via SMTP.
#[derive(Debug)]
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailNotifier {
    /// Build an `EmailNotifier`.
    ///
    /// Port 465 always uses implicit TLS; other ports use STARTTLS when `tls`
    /// is set and plain SMTP otherwise. Credentials are attached only when
    /// both username and password are given.
    pub fn new(
        smtp_host: &str,
        smtp_port: u16,
        tls: bool,
        from: &str,
        credentials: Option<(String, String)>,
    ) -> Result<Self, NotifyError> {
        let from_mailbox: Mailbox = from
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        let mut builder = if smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(smtp_port)
        } else if tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(smtp_port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host).port(smtp_port)
        };

        if let Some((username, password)) = credentials {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from: from_mailbox,
        })
    }

    /// Build from the `SMTP_*` settings. Host and sender are required.
    pub fn from_config(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let host = config
            .host
            .as_deref()
            .ok_or_else(|| NotifyError::Config("SMTP_HOST is not set".to_string()))?;
        let from = config
            .from
            .as_deref()
            .or(config.username.as_deref())
            .ok_or_else(|| NotifyError::Config("SMTP_FROM is not set".to_string()))?;
        let credentials = config.username.clone().zip(config.password.clone());
        Self::new(host, config.port, config.tls, from, credentials)
    }

    fn mailbox(recipient: &Recipient) -> Result<Mailbox, NotifyError> {
        let address: Address = recipient
            .address
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;
        Ok(Mailbox::new(recipient.name.clone(), address))
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn send(
        &self,
        recipient: &Recipient,
        notification: &Notification,
    ) -> Result<(), NotifyError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(Self::mailbox(recipient)?)
            .subject(&notification.subject)
            .header(ContentType::TEXT_HTML)
            .body(notification.body.clone())
            .map_err(|e| NotifyError::Config(e.to_string()))?;

        self.transport.send(email).await.map_err(|e| {
            if e.is_permanent() {
                NotifyError::Rejected(e.to_string())
            } else {
                NotifyError::Smtp(e.to_string())
            }
        })?;

        tracing::info!(
            channel = "email",
            subject = %notification.subject,
            "notification delivered"
        );

        Ok(())
    }

    /// Returns `"email"`.
    fn channel_name(&self) -> &str {
        "email"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier(port: u16, tls: bool) -> Result<EmailNotifier, NotifyError> {
        EmailNotifier::new("smtp.example.com", port, tls, "alerts@example.com", None)
    }

    #[test]
    fn builds_for_each_tls_mode() {
        assert!(notifier(587, true).is_ok());
        assert!(notifier(465, false).is_ok());
        assert!(notifier(25, false).is_ok());
    }

    #[test]
    fn invalid_from_address() {
        let err = EmailNotifier::new("smtp.example.com", 587, true, "bad-address", None)
            .unwrap_err()
            .to_string();
        assert!(err.contains("Configuration error"), "got: {err}");
    }

    #[test]
    fn recipient_mailbox_keeps_display_name() {
        let mb = EmailNotifier::mailbox(&Recipient {
            address: "alice@example.com".into(),
            name: Some("Alice".into()),
        })
        .unwrap();
        assert_eq!(mb.email.to_string(), "alice@example.com");
        assert_eq!(mb.name.as_deref(), Some("Alice"));

        let bad = EmailNotifier::mailbox(&Recipient {
            address: "not-an-email".into(),
            name: None,
        });
        assert!(matches!(bad, Err(NotifyError::Config(_))));
    }

    #[test]
    fn config_requires_host() {
        let config = SmtpConfig {
            host: None,
            port: 587,
            tls: true,
            from: Some("alerts@example.com".into()),
            username: None,
            password: None,
        };
        assert!(matches!(
            EmailNotifier::from_config(&config),
            Err(NotifyError::Config(_))
        ));
    }

    #[test]
    fn channel_name_is_email() {
        assert_eq!(notifier(587, true).unwrap().channel_name(), "email");
    }
}
