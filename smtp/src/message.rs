use chrono::{DateTime, Utc};
use lettre::message::header::{Header, HeaderName, HeaderValue};
use lettre::message::{Attachment, Mailbox, Message, MultiPart};
use lettre::message::header::ContentType;
use mailout_types::AttachmentMeta;
use uuid::Uuid;

use crate::error::SmtpError;

/// Software identifier placed in the User-Agent header of every message.
pub const MAILER_IDENT: &str = concat!("mailout/", env!("CARGO_PKG_VERSION"));

/// A fully personalized message, ready to be encoded for the wire.
/// Rendering and policy application happen before this point; this type
/// only carries the result.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub from_address: String,
    pub from_name: Option<String>,
    pub to: String,
    pub reply_to: Option<String>,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub subject: String,
    pub text_body: String,
    pub is_html: bool,
    pub attachments: Vec<AttachmentMeta>,
}

/// RFC 2369 unsubscribe pointer. lettre has no built-in header for it, so
/// it is declared here.
#[derive(Debug, Clone)]
pub struct ListUnsubscribe(String);

impl ListUnsubscribe {
    pub fn mailto(address: &str) -> Self {
        Self(format!("<mailto:{address}?subject=unsubscribe>"))
    }
}

impl Header for ListUnsubscribe {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("List-Unsubscribe")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self(s.to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

/// Message-ID derived from the send timestamp and the sender domain.
pub fn message_id(sender_address: &str, now: DateTime<Utc>) -> String {
    let domain = sender_address.rsplit('@').next().unwrap_or("localhost");
    format!(
        "{}.{}@{}",
        now.timestamp_millis(),
        Uuid::new_v4().simple(),
        domain
    )
}

/// Plain text to an HTML alternative part, for requests that did not
/// supply their own markup.
pub fn html_from_text(text: &str) -> String {
    text.replace('\n', "<br>\n")
}

impl OutgoingEmail {
    /// Encodes the email as an RFC 5322 message: multipart alternative
    /// body, optional attachments, and the deterministic header block
    /// (Message-ID, User-Agent, List-Unsubscribe).
    pub fn build(&self) -> Result<Message, SmtpError> {
        let from = Mailbox::new(
            self.from_name.clone(),
            self.from_address.parse()?,
        );

        let mut builder = Message::builder()
            .from(from)
            .to(self.to.parse::<Mailbox>()?)
            .subject(self.subject.clone())
            .date_now()
            .message_id(Some(message_id(&self.from_address, Utc::now())))
            .user_agent(MAILER_IDENT.to_string());

        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(reply_to.parse::<Mailbox>()?);
        }
        if let Some(cc) = &self.cc {
            builder = builder.cc(cc.parse::<Mailbox>()?);
        }
        if let Some(bcc) = &self.bcc {
            builder = builder.bcc(bcc.parse::<Mailbox>()?);
        }

        let html_body = if self.is_html {
            self.text_body.clone()
        } else {
            html_from_text(&self.text_body)
        };
        let alternative =
            MultiPart::alternative_plain_html(self.text_body.clone(), html_body);

        let mut message = if self.attachments.is_empty() {
            builder.multipart(alternative)?
        } else {
            let mut mixed = MultiPart::mixed().multipart(alternative);
            for meta in &self.attachments {
                mixed = mixed.singlepart(load_attachment(meta)?);
            }
            builder.multipart(mixed)?
        };

        let unsubscribe_target = self.reply_to.as_deref().unwrap_or(&self.from_address);
        message
            .headers_mut()
            .set(ListUnsubscribe::mailto(unsubscribe_target));

        Ok(message)
    }
}

fn load_attachment(meta: &AttachmentMeta) -> Result<lettre::message::SinglePart, SmtpError> {
    let content = std::fs::read(&meta.path).map_err(|source| SmtpError::Attachment {
        name: meta.original_name.clone(),
        source,
    })?;
    let content_type = ContentType::parse(&meta.content_type)
        .map_err(|_| SmtpError::ContentType(meta.content_type.clone()))?;
    Ok(Attachment::new(meta.original_name.clone()).body(content, content_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            from_address: "sender@gmail.com".to_string(),
            from_name: Some("Ana Sender".to_string()),
            to: "r1@example.org".to_string(),
            reply_to: Some("replies@gmail.com".to_string()),
            cc: None,
            bcc: None,
            subject: "Hello".to_string(),
            text_body: "line one\nline two".to_string(),
            is_html: false,
            attachments: Vec::new(),
        }
    }

    #[test]
    fn builds_with_unsubscribe_and_ident_headers() {
        let message = email().build().unwrap();
        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("List-Unsubscribe"));
        assert!(formatted.contains("mailto:replies@gmail.com"));
        assert!(formatted.contains(MAILER_IDENT));
    }

    #[test]
    fn plain_text_gets_a_br_converted_html_part() {
        let message = email().build().unwrap();
        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("line one<br>"));
    }

    #[test]
    fn html_requests_keep_their_markup_untouched() {
        let mut request = email();
        request.is_html = true;
        request.text_body = "<p>already html</p>".to_string();
        let message = request.build().unwrap();
        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("<p>already html</p>"));
        assert!(!formatted.contains("<br>"));
    }

    #[test]
    fn message_id_carries_the_sender_domain() {
        let id = message_id("a@zoho.com", Utc::now());
        assert!(id.ends_with("@zoho.com"));
    }

    #[test]
    fn unparseable_recipient_is_rejected() {
        let mut request = email();
        request.to = "not-an-address".to_string();
        assert!(matches!(request.build(), Err(SmtpError::Mailbox(_))));
    }
}
