//! Outbound mail transport.

use lettre::address::{Address, Envelope};
use lettre::transport::smtp::PoolConfig;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use crate::config::{Config, SmtpSecurity};
use crate::error::{Error, ProcessError, Result};

/// Submits a rendered message for one recipient.
#[async_trait::async_trait]
pub trait MailTransport: Send + Sync {
    /// Declare sender and recipient, then stream the message bytes
    async fn send(&self, from: &str, to: &str, message: &[u8])
    -> std::result::Result<(), ProcessError>;
}

/// SMTP transport holding one persistent session.
///
/// The underlying lettre pool is capped at a single connection, so an
/// executor that owns this transport reuses the same session for every
/// message and reconnects only after the server drops it.
pub struct SmtpMailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    endpoint: String,
}

impl SmtpMailTransport {
    /// Build the transport without connecting
    pub fn build(config: &Config) -> Result<Self> {
        let (host, port) = config.smtp_endpoint()?;
        let builder = match config.smtp.security {
            SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&host),
            SmtpSecurity::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)
                .map_err(|e| Error::Smtp(e.to_string()))?,
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
                .map_err(|e| Error::Smtp(e.to_string()))?,
        };

        let transport = builder
            .port(port)
            .timeout(Some(config.smtp.timeout()))
            .pool_config(PoolConfig::new().max_size(1))
            .build();

        Ok(Self {
            transport,
            endpoint: format!("{}:{}", host, port),
        })
    }

    /// Build the transport and check that the server accepts a session
    pub async fn connect(config: &Config) -> Result<Self> {
        let transport = Self::build(config)?;
        match transport.transport.test_connection().await {
            Ok(true) => Ok(transport),
            Ok(false) => Err(Error::Smtp(format!(
                "{} did not accept the session",
                transport.endpoint
            ))),
            Err(e) => Err(Error::Smtp(format!(
                "unable to connect to {}: {}",
                transport.endpoint, e
            ))),
        }
    }
}

#[async_trait::async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(
        &self,
        from: &str,
        to: &str,
        message: &[u8],
    ) -> std::result::Result<(), ProcessError> {
        let envelope = envelope(from, to)?;
        self.transport
            .send_raw(&envelope, message)
            .await
            .map(|_| ())
            .map_err(|e| ProcessError::Transport(format!("{}: {}", self.endpoint, e)))
    }
}

/// Build an SMTP envelope for a single recipient
pub(crate) fn envelope(from: &str, to: &str) -> std::result::Result<Envelope, ProcessError> {
    let from: Address = from
        .parse()
        .map_err(|e| ProcessError::Transport(format!("invalid sender {}: {}", from, e)))?;
    let to: Address = to
        .parse()
        .map_err(|e| ProcessError::Transport(format!("invalid recipient {}: {}", to, e)))?;
    Envelope::new(Some(from), vec![to]).map_err(|e| ProcessError::Transport(e.to_string()))
}
