use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sending identity registered with the service. The credential is the
/// SMTP password for the mailbox, stored as provided by the owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SenderAccount {
    pub address: String,
    pub credential: String,
    #[serde(default)]
    pub sent_count: u64,
    #[serde(default)]
    pub daily_sent_count: u64,
    pub added_at: DateTime<Utc>,
}

impl SenderAccount {
    pub fn new(address: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            credential: credential.into(),
            sent_count: 0,
            daily_sent_count: 0,
            added_at: Utc::now(),
        }
    }

    pub fn record_sent(&mut self) {
        self.sent_count += 1;
        self.daily_sent_count += 1;
    }

    /// Zeroes the daily counter. The cumulative counter is never reset here.
    pub fn reset_daily(&mut self) {
        self.daily_sent_count = 0;
    }
}

/// One destination mailbox plus the merge fields available to templates.
/// Everything but the address is optional and defaults to empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Recipient {
    pub address: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub custom1: String,
    #[serde(default)]
    pub custom2: String,
}

impl Recipient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }
}

/// Metadata for a previously uploaded attachment. Only the path is read at
/// send time; the binary content never travels through this API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttachmentMeta {
    pub filename: String,
    pub original_name: String,
    pub path: String,
    pub size: u64,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

/// One batch-send request. Consumed entirely by a single dispatch run and
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignRequest {
    pub recipients: Vec<Recipient>,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub sender_display_name: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub cc: Option<String>,
    #[serde(default)]
    pub bcc: Option<String>,
    #[serde(default = "default_delay_seconds")]
    pub delay_seconds: u64,
    #[serde(default)]
    pub is_html: bool,
    #[serde(default)]
    pub attachments: Vec<AttachmentMeta>,
}

fn default_delay_seconds() -> u64 {
    60
}

/// Aggregate counters for a user. Incremented by the dispatch loop, reset
/// only through the admin reset endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CampaignStats {
    pub total_sent: u64,
    pub total_failed: u64,
    pub last_campaign_time: Option<DateTime<Utc>>,
}

/// A tenant of the service, owning its sender pool, stored recipient list
/// and counters. An inactive user cannot send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub password_hash: String,
    pub active: bool,
    pub daily_limit: u64,
    #[serde(default)]
    pub accounts: Vec<SenderAccount>,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
    #[serde(default)]
    pub stats: CampaignStats,
}

impl User {
    pub fn new(
        name: impl Into<String>,
        password_hash: impl Into<String>,
        daily_limit: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            password_hash: password_hash.into(),
            active: true,
            daily_limit,
            accounts: Vec::new(),
            recipients: Vec::new(),
            stats: CampaignStats::default(),
        }
    }

    /// Sends counted against the daily limit today, across the whole pool.
    pub fn daily_sent(&self) -> u64 {
        self.accounts.iter().map(|a| a.daily_sent_count).sum()
    }
}

/// Lifecycle of one dispatched campaign, queryable by id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sent_moves_both_counters() {
        let mut account = SenderAccount::new("a@gmail.com", "secret");
        account.record_sent();
        account.record_sent();
        assert_eq!(account.sent_count, 2);
        assert_eq!(account.daily_sent_count, 2);
        assert!(account.daily_sent_count <= account.sent_count);
    }

    #[test]
    fn daily_reset_keeps_cumulative_count() {
        let mut account = SenderAccount::new("a@gmail.com", "secret");
        account.record_sent();
        account.record_sent();
        account.reset_daily();
        assert_eq!(account.daily_sent_count, 0);
        assert_eq!(account.sent_count, 2);
    }

    #[test]
    fn recipient_merge_fields_default_to_empty() {
        let recipient: Recipient =
            serde_json::from_str(r#"{"address":"r@example.org","first_name":"Ana"}"#).unwrap();
        assert_eq!(recipient.first_name, "Ana");
        assert_eq!(recipient.company, "");
        assert_eq!(recipient.custom2, "");
    }

    #[test]
    fn campaign_request_defaults() {
        let request: CampaignRequest = serde_json::from_str(
            r#"{"recipients":[{"address":"r@example.org"}],"subject":"hi","body":"hello"}"#,
        )
        .unwrap();
        assert_eq!(request.delay_seconds, 60);
        assert!(!request.is_html);
        assert!(request.attachments.is_empty());
    }
}
