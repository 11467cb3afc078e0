use std::time::Duration;

use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::{debug, warn};

use crate::error::SmtpError;
use crate::message::OutgoingEmail;
use crate::provider::{self, Endpoint, Security};

/// Opens verified channels for sender accounts. The dispatch loop talks to
/// this trait so tests can swap the network out.
pub trait Mailer {
    type Channel: MailChannel;

    /// Opens a channel for the account and verifies the handshake,
    /// retrying exactly once on the alternate endpoint before giving up.
    async fn connect(&self, address: &str, credential: &str) -> Result<Self::Channel, SmtpError>;
}

/// One open submission channel. At most one exists per account at a time;
/// the owner drops it on rotation or on any send failure.
pub trait MailChannel {
    async fn send(&mut self, email: &OutgoingEmail) -> Result<(), SmtpError>;
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

pub struct LettreMailer {
    timeout: Duration,
}

impl LettreMailer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn open(
        &self,
        endpoint: &Endpoint,
        address: &str,
        credential: &str,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, SmtpError> {
        let connect_err = |reason: String| SmtpError::Connect {
            endpoint: endpoint.to_string(),
            reason,
        };

        let builder = match endpoint.security {
            Security::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&endpoint.host),
            Security::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&endpoint.host)
            }
        }
        .map_err(|e| connect_err(e.to_string()))?;

        let transport = builder
            .port(endpoint.port)
            .credentials(Credentials::new(
                address.to_string(),
                credential.to_string(),
            ))
            .timeout(Some(self.timeout))
            .build();

        match transport.test_connection().await {
            Ok(true) => Ok(transport),
            Ok(false) => Err(connect_err("server rejected the handshake".to_string())),
            Err(e) => Err(connect_err(e.to_string())),
        }
    }
}

impl Default for LettreMailer {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Mailer for LettreMailer {
    type Channel = LettreChannel;

    async fn connect(&self, address: &str, credential: &str) -> Result<Self::Channel, SmtpError> {
        let primary = provider::resolve(address);
        match self.open(&primary, address, credential).await {
            Ok(transport) => {
                debug!(endpoint = %primary, account = address, "smtp channel open");
                Ok(LettreChannel { transport })
            }
            Err(first) => {
                let fallback = primary.alternate();
                warn!(
                    endpoint = %primary,
                    fallback = %fallback,
                    account = address,
                    error = %first,
                    "handshake failed, trying alternate endpoint"
                );
                let transport = self.open(&fallback, address, credential).await?;
                Ok(LettreChannel { transport })
            }
        }
    }
}

pub struct LettreChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl MailChannel for LettreChannel {
    async fn send(&mut self, email: &OutgoingEmail) -> Result<(), SmtpError> {
        let message = email.build()?;
        self.transport.send(message).await?;
        Ok(())
    }
}
