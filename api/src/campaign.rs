use std::collections::HashMap;
use std::sync::Arc;

use mailout_smtp::{MailChannel, Mailer, OutgoingEmail, SmtpError};
use mailout_types::{CampaignRequest, CampaignStatus, SenderAccount};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{RwLock, watch};
use tracing::{info, warn};
use uuid::Uuid;

use crate::pacing::{Rotation, jittered_delay};
use crate::policy::ContentPolicy;
use crate::store::{self, StateStore, StoreError};
use crate::template::render;

#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("user no longer exists")]
    UnknownUser,

    #[error("sender pool is empty")]
    NoAccounts,

    #[error(transparent)]
    Store(#[from] StoreError),
}

enum Outcome {
    Completed,
    Cancelled,
}

/// Point-in-time view of one dispatched campaign.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignProgress {
    pub id: Uuid,
    pub status: CampaignStatus,
    pub total_recipients: usize,
    pub sent: u64,
    pub failed: u64,
}

struct CampaignEntry {
    status: CampaignStatus,
    total_recipients: usize,
    sent: u64,
    failed: u64,
    cancel: watch::Sender<bool>,
}

/// In-memory handles for every campaign accepted since startup. The API
/// reads progress here; the dispatch loop reports into it.
#[derive(Clone, Default)]
pub struct CampaignRegistry {
    inner: Arc<RwLock<HashMap<Uuid, CampaignEntry>>>,
}

impl CampaignRegistry {
    /// Creates the handle for a freshly accepted campaign and returns the
    /// cancellation signal its dispatch task will watch.
    pub async fn register(&self, id: Uuid, total_recipients: usize) -> watch::Receiver<bool> {
        let (cancel, cancelled) = watch::channel(false);
        self.inner.write().await.insert(
            id,
            CampaignEntry {
                status: CampaignStatus::Idle,
                total_recipients,
                sent: 0,
                failed: 0,
                cancel,
            },
        );
        cancelled
    }

    async fn mark(&self, id: Uuid, status: CampaignStatus) {
        if let Some(entry) = self.inner.write().await.get_mut(&id) {
            entry.status = status;
        }
    }

    async fn record(&self, id: Uuid, sent: u64, failed: u64) {
        if let Some(entry) = self.inner.write().await.get_mut(&id) {
            entry.sent = sent;
            entry.failed = failed;
        }
    }

    pub async fn progress(&self, id: Uuid) -> Option<CampaignProgress> {
        self.inner.read().await.get(&id).map(|entry| CampaignProgress {
            id,
            status: entry.status,
            total_recipients: entry.total_recipients,
            sent: entry.sent,
            failed: entry.failed,
        })
    }

    /// Requests cancellation. Returns false for unknown ids and for
    /// campaigns that already reached a terminal state.
    pub async fn cancel(&self, id: Uuid) -> bool {
        match self.inner.write().await.get_mut(&id) {
            Some(entry)
                if matches!(entry.status, CampaignStatus::Idle | CampaignStatus::Running) =>
            {
                entry.cancel.send_replace(true);
                true
            }
            _ => false,
        }
    }
}

/// Drives one campaign: render, send, record, rotate, pace. Generic over
/// the transport and the store so tests run without a network or a fixed
/// file location.
pub struct CampaignRunner<M, S> {
    mailer: M,
    store: Arc<S>,
    registry: CampaignRegistry,
    policy: Arc<dyn ContentPolicy>,
}

impl<M: Mailer, S: StateStore> CampaignRunner<M, S> {
    pub fn new(
        mailer: M,
        store: Arc<S>,
        registry: CampaignRegistry,
        policy: Arc<dyn ContentPolicy>,
    ) -> Self {
        Self {
            mailer,
            store,
            registry,
            policy,
        }
    }

    /// Entry point for the detached dispatch task.
    pub async fn run(
        &self,
        id: Uuid,
        user_id: Uuid,
        request: CampaignRequest,
        mut cancelled: watch::Receiver<bool>,
    ) {
        self.registry.mark(id, CampaignStatus::Running).await;
        match self.dispatch(id, user_id, &request, &mut cancelled).await {
            Ok(Outcome::Completed) => {
                info!(campaign = %id, "campaign complete");
                self.registry.mark(id, CampaignStatus::Completed).await;
            }
            Ok(Outcome::Cancelled) => {
                info!(campaign = %id, "campaign cancelled");
                self.registry.mark(id, CampaignStatus::Cancelled).await;
            }
            Err(err) => {
                warn!(campaign = %id, error = %err, "campaign aborted");
                self.registry.mark(id, CampaignStatus::Failed).await;
            }
        }
    }

    async fn dispatch(
        &self,
        id: Uuid,
        user_id: Uuid,
        request: &CampaignRequest,
        cancelled: &mut watch::Receiver<bool>,
    ) -> Result<Outcome, CampaignError> {
        let snapshot = self.store.snapshot().await?;
        let accounts: Vec<SenderAccount> = snapshot
            .data
            .users
            .iter()
            .find(|u| u.id == user_id)
            .ok_or(CampaignError::UnknownUser)?
            .accounts
            .clone();
        if accounts.is_empty() {
            return Err(CampaignError::NoAccounts);
        }

        let mut rotation = Rotation::new(accounts.len());
        let mut channel: Option<(usize, M::Channel)> = None;
        let mut sent = 0u64;
        let mut failed = 0u64;
        let total = request.recipients.len();

        for (position, recipient) in request.recipients.iter().enumerate() {
            let index = rotation.next();
            let account = &accounts[index];

            let subject = render(&request.subject, recipient);
            let body = render(&request.body, recipient);
            let (subject, body) = self.policy.apply(&subject, &body);

            let email = OutgoingEmail {
                from_address: account.address.clone(),
                from_name: request.sender_display_name.clone(),
                to: recipient.address.clone(),
                reply_to: request.reply_to.clone(),
                cc: request.cc.clone(),
                bcc: request.bcc.clone(),
                subject,
                text_body: body,
                is_html: request.is_html,
                attachments: request.attachments.clone(),
            };

            match self.attempt(&mut channel, index, account, &email).await {
                Ok(()) => {
                    sent += 1;
                    let address = account.address.clone();
                    store::update(self.store.as_ref(), move |data| {
                        if let Some(user) = data.users.iter_mut().find(|u| u.id == user_id) {
                            if let Some(acc) =
                                user.accounts.iter_mut().find(|a| a.address == address)
                            {
                                acc.record_sent();
                            }
                            user.stats.total_sent += 1;
                        }
                    })
                    .await?;
                    info!(
                        campaign = %id,
                        to = %recipient.address,
                        account = %account.address,
                        sent,
                        total,
                        "sent"
                    );
                }
                Err(err) => {
                    failed += 1;
                    channel = None;
                    store::update(self.store.as_ref(), |data| {
                        if let Some(user) = data.users.iter_mut().find(|u| u.id == user_id) {
                            user.stats.total_failed += 1;
                        }
                    })
                    .await?;
                    warn!(campaign = %id, to = %recipient.address, error = %err, "send failed");
                }
            }

            self.registry.record(id, sent, failed).await;

            if position + 1 < total {
                let delay = jittered_delay(request.delay_seconds, &mut rand::thread_rng());
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancelled.changed() => {}
                }
                if *cancelled.borrow() {
                    return Ok(Outcome::Cancelled);
                }
            }
        }

        Ok(Outcome::Completed)
    }

    /// Reuses the open channel while rotation stays on the same account;
    /// otherwise drops it and opens a fresh one.
    async fn attempt(
        &self,
        channel: &mut Option<(usize, M::Channel)>,
        index: usize,
        account: &SenderAccount,
        email: &OutgoingEmail,
    ) -> Result<(), SmtpError> {
        let reusable = matches!(channel, Some((open, _)) if *open == index);
        if !reusable {
            *channel = None;
            let fresh = self
                .mailer
                .connect(&account.address, &account.credential)
                .await?;
            *channel = Some((index, fresh));
        }
        match channel {
            Some((_, open)) => open.send(email).await,
            None => Err(SmtpError::Connect {
                endpoint: account.address.clone(),
                reason: "channel unavailable".to_string(),
            }),
        }
    }
}
