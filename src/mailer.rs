use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, info};

use crate::config::SmtpConfig;

/// Email delivery channel. PINs only ever leave the process through here,
/// in plaintext, addressed to the account owner.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification_pin(&self, to: &str, name: &str, pin: &str) -> anyhow::Result<()>;
    async fn send_password_reset_pin(&self, to: &str, name: &str, pin: &str)
        -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
            .context("build smtp transport")?
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .port(cfg.port)
            .build();
        Ok(Self {
            transport,
            from: cfg.from.clone(),
        })
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> anyhow::Result<()> {
        let email = Message::builder()
            .from(self.from.parse().context("invalid from address")?)
            .to(to.parse().context("invalid to address")?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .context("build email message")?;

        self.transport.send(email).await.context("send email")?;
        info!(to = %to, subject = %subject, "email sent");
        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_verification_pin(&self, to: &str, name: &str, pin: &str) -> anyhow::Result<()> {
        debug!(to = %to, "sending verification pin");
        self.send(
            to,
            "Your Verification PIN",
            format!(
                "Hi {name},\n\n\
                 Your email verification PIN is:\n\n\
                 {pin}\n\n\
                 It expires in a few minutes. If you did not request this, you can ignore this email.\n\n\
                 Libris"
            ),
        )
        .await
    }

    async fn send_password_reset_pin(
        &self,
        to: &str,
        name: &str,
        pin: &str,
    ) -> anyhow::Result<()> {
        debug!(to = %to, "sending password reset pin");
        self.send(
            to,
            "Your Forget Password PIN",
            format!(
                "Hi {name},\n\n\
                 Your password reset PIN is:\n\n\
                 {pin}\n\n\
                 It expires in a few minutes. If you did not request a reset, you can ignore this email.\n\n\
                 Libris"
            ),
        )
        .await
    }
}
