pub mod error;
pub mod message;
pub mod provider;
pub mod transport;

pub use error::SmtpError;
pub use message::OutgoingEmail;
pub use provider::{Endpoint, Provider, Security};
pub use transport::{LettreMailer, MailChannel, Mailer};
