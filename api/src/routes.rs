use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{delete, get, post};
use axum::{Json, Router, extract::Path, extract::State};
use chrono::{DateTime, Utc};
use email_address::EmailAddress;
use mailout_smtp::{LettreMailer, MailChannel, Mailer, OutgoingEmail};
use mailout_types::{CampaignRequest, CampaignStats, Recipient, SenderAccount, User};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use uuid::Uuid;

use crate::auth::{self, SessionMap};
use crate::campaign::{CampaignProgress, CampaignRegistry, CampaignRunner};
use crate::error::ApiError;
use crate::policy::ContentPolicy;
use crate::store::{self, FileStore, StateStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<FileStore>,
    pub sessions: SessionMap,
    pub registry: CampaignRegistry,
    pub policy: Arc<dyn ContentPolicy>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin, _request_head| {
            let origin_str = origin.to_str().unwrap_or("");
            origin_str.starts_with("http://localhost:")
        }))
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/readyz", get(|| async { "OK" }))
        .route("/livez", get(|| async { "OK" }))
        .route("/api/login", post(login))
        .route("/api/accounts", post(add_account).get(list_accounts))
        .route("/api/accounts/{address}", delete(remove_account))
        .route("/api/recipients", post(add_recipients).delete(clear_recipients))
        .route("/api/attachments", post(upload_attachments))
        .route("/api/send", post(send_single))
        .route("/api/campaign", post(start_campaign))
        .route("/api/campaigns/{id}", get(campaign_status))
        .route("/api/campaigns/{id}/cancel", post(cancel_campaign))
        .route("/api/stats", get(stats))
        .route("/api/reset-daily", post(reset_daily))
        .route("/api/verify-address", post(verify_address))
        .layer(cors)
        .with_state(state)
}

async fn authed_user(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = auth::bearer_token(headers).ok_or(ApiError::Unauthorized)?;
    let user_id = state
        .sessions
        .user_for(token)
        .await
        .ok_or(ApiError::Unauthorized)?;
    let snapshot = state.store.snapshot().await?;
    snapshot
        .data
        .users
        .into_iter()
        .find(|u| u.id == user_id)
        .ok_or(ApiError::Unauthorized)
}

#[derive(Deserialize)]
struct LoginRequest {
    name: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    user_id: Uuid,
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let snapshot = state.store.snapshot().await?;
    let user = snapshot
        .data
        .users
        .iter()
        .find(|u| u.name == request.name)
        .ok_or(ApiError::Unauthorized)?;
    if user.password_hash != auth::hash_credential(&request.password) {
        return Err(ApiError::Unauthorized);
    }
    if !user.active {
        return Err(ApiError::Forbidden("account is inactive".to_string()));
    }
    let token = state.sessions.create(user.id).await;
    Ok(Json(LoginResponse {
        token,
        user_id: user.id,
    }))
}

#[derive(Deserialize)]
struct AddAccountRequest {
    address: String,
    credential: String,
}

#[derive(Serialize)]
struct AccountView {
    address: String,
    sent_count: u64,
    daily_sent_count: u64,
    added_at: DateTime<Utc>,
}

impl From<&SenderAccount> for AccountView {
    fn from(account: &SenderAccount) -> Self {
        Self {
            address: account.address.clone(),
            sent_count: account.sent_count,
            daily_sent_count: account.daily_sent_count,
            added_at: account.added_at,
        }
    }
}

async fn add_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AddAccountRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = authed_user(&state, &headers).await?;
    if request.address.is_empty() || request.credential.is_empty() {
        return Err(ApiError::Validation(
            "address and credential required".to_string(),
        ));
    }
    if request.address.parse::<EmailAddress>().is_err() {
        return Err(ApiError::Validation("invalid sender address".to_string()));
    }

    store::update(state.store.as_ref(), |data| {
        if let Some(owner) = data.users.iter_mut().find(|u| u.id == user.id) {
            owner
                .accounts
                .push(SenderAccount::new(&request.address, &request.credential));
        }
    })
    .await?;

    Ok(Json(serde_json::json!({ "success": true })))
}

async fn list_accounts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<AccountView>>, ApiError> {
    let user = authed_user(&state, &headers).await?;
    Ok(Json(user.accounts.iter().map(AccountView::from).collect()))
}

async fn remove_account(
    State(state): State<AppState>,
    Path(address): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = authed_user(&state, &headers).await?;
    if !user.accounts.iter().any(|a| a.address == address) {
        return Err(ApiError::NotFound);
    }

    store::update(state.store.as_ref(), |data| {
        if let Some(owner) = data.users.iter_mut().find(|u| u.id == user.id) {
            owner.accounts.retain(|a| a.address != address);
        }
    })
    .await?;

    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Deserialize)]
struct AddRecipientsRequest {
    recipients: Vec<Recipient>,
}

async fn add_recipients(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AddRecipientsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = authed_user(&state, &headers).await?;
    if request.recipients.is_empty() {
        return Err(ApiError::Validation("recipients required".to_string()));
    }
    if request.recipients.iter().any(|r| r.address.is_empty()) {
        return Err(ApiError::Validation(
            "every recipient needs an address".to_string(),
        ));
    }

    let snapshot = store::update(state.store.as_ref(), |data| {
        if let Some(owner) = data.users.iter_mut().find(|u| u.id == user.id) {
            owner.recipients.extend(request.recipients.iter().cloned());
        }
    })
    .await?;

    let count = snapshot
        .data
        .users
        .iter()
        .find(|u| u.id == user.id)
        .map_or(0, |u| u.recipients.len());
    Ok(Json(serde_json::json!({ "success": true, "count": count })))
}

async fn clear_recipients(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = authed_user(&state, &headers).await?;
    store::update(state.store.as_ref(), |data| {
        if let Some(owner) = data.users.iter_mut().find(|u| u.id == user.id) {
            owner.recipients.clear();
        }
    })
    .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Deserialize)]
struct AttachmentUpload {
    original_name: String,
    path: String,
    #[serde(default)]
    content_type: Option<String>,
}

async fn upload_attachments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(uploads): Json<Vec<AttachmentUpload>>,
) -> Result<Json<Vec<mailout_types::AttachmentMeta>>, ApiError> {
    authed_user(&state, &headers).await?;

    let mut attachments = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let metadata = tokio::fs::metadata(&upload.path).await.map_err(|e| {
            ApiError::Validation(format!("attachment {}: {e}", upload.original_name))
        })?;
        attachments.push(mailout_types::AttachmentMeta {
            filename: format!("{}-{}", Utc::now().timestamp_millis(), upload.original_name),
            original_name: upload.original_name,
            path: upload.path,
            size: metadata.len(),
            content_type: upload
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
        });
    }
    Ok(Json(attachments))
}

#[derive(Deserialize)]
struct SendRequest {
    to: String,
    subject: String,
    body: String,
    #[serde(default)]
    from_name: Option<String>,
    #[serde(default)]
    account_index: usize,
    #[serde(default)]
    reply_to: Option<String>,
    #[serde(default)]
    cc: Option<String>,
    #[serde(default)]
    bcc: Option<String>,
    #[serde(default)]
    is_html: bool,
    #[serde(default)]
    attachments: Vec<mailout_types::AttachmentMeta>,
}

async fn send_single(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SendRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = authed_user(&state, &headers).await?;
    if request.to.is_empty() || request.subject.is_empty() || request.body.is_empty() {
        return Err(ApiError::Validation("missing required fields".to_string()));
    }
    let account = user
        .accounts
        .get(request.account_index)
        .ok_or_else(|| ApiError::Validation("no sender accounts configured".to_string()))?
        .clone();
    check_sending_allowed(&user)?;

    let (subject, body) = state.policy.apply(&request.subject, &request.body);
    let email = OutgoingEmail {
        from_address: account.address.clone(),
        from_name: request.from_name,
        to: request.to.clone(),
        reply_to: request.reply_to,
        cc: request.cc,
        bcc: request.bcc,
        subject,
        text_body: body,
        is_html: request.is_html,
        attachments: request.attachments,
    };

    let mailer = LettreMailer::default();
    let outcome = async {
        let mut channel = mailer.connect(&account.address, &account.credential).await?;
        channel.send(&email).await
    }
    .await;

    match outcome {
        Ok(()) => {
            let snapshot = store::update(state.store.as_ref(), |data| {
                if let Some(owner) = data.users.iter_mut().find(|u| u.id == user.id) {
                    if let Some(acc) = owner
                        .accounts
                        .iter_mut()
                        .find(|a| a.address == account.address)
                    {
                        acc.record_sent();
                    }
                    owner.stats.total_sent += 1;
                }
            })
            .await?;
            let sent_count = snapshot
                .data
                .users
                .iter()
                .find(|u| u.id == user.id)
                .and_then(|u| u.accounts.iter().find(|a| a.address == account.address))
                .map_or(0, |a| a.sent_count);
            Ok(Json(serde_json::json!({
                "success": true,
                "message": format!("Email sent to {}", request.to),
                "sent_count": sent_count,
            })))
        }
        Err(err) => {
            store::update(state.store.as_ref(), |data| {
                if let Some(owner) = data.users.iter_mut().find(|u| u.id == user.id) {
                    owner.stats.total_failed += 1;
                }
            })
            .await?;
            Err(ApiError::Send(err))
        }
    }
}

#[derive(Serialize)]
struct CampaignAccepted {
    accepted: bool,
    total_recipients: usize,
    campaign_id: Uuid,
}

async fn start_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CampaignRequest>,
) -> Result<Json<CampaignAccepted>, ApiError> {
    let user = authed_user(&state, &headers).await?;
    if request.recipients.is_empty() {
        return Err(ApiError::Validation("recipients required".to_string()));
    }
    if user.accounts.is_empty() {
        return Err(ApiError::Validation(
            "no sender accounts configured".to_string(),
        ));
    }
    check_sending_allowed(&user)?;

    store::update(state.store.as_ref(), |data| {
        if let Some(owner) = data.users.iter_mut().find(|u| u.id == user.id) {
            owner.stats.last_campaign_time = Some(Utc::now());
        }
    })
    .await?;

    let campaign_id = Uuid::new_v4();
    let total_recipients = request.recipients.len();
    let cancelled = state.registry.register(campaign_id, total_recipients).await;

    let runner = CampaignRunner::new(
        LettreMailer::default(),
        state.store.clone(),
        state.registry.clone(),
        state.policy.clone(),
    );
    let user_id = user.id;
    tokio::spawn(async move {
        runner.run(campaign_id, user_id, request, cancelled).await;
    });

    Ok(Json(CampaignAccepted {
        accepted: true,
        total_recipients,
        campaign_id,
    }))
}

fn check_sending_allowed(user: &User) -> Result<(), ApiError> {
    if !user.active {
        return Err(ApiError::Forbidden("account is inactive".to_string()));
    }
    if user.daily_limit > 0 && user.daily_sent() >= user.daily_limit {
        return Err(ApiError::Forbidden("daily limit reached".to_string()));
    }
    Ok(())
}

async fn campaign_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<CampaignProgress>, ApiError> {
    authed_user(&state, &headers).await?;
    state
        .registry
        .progress(id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn cancel_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    authed_user(&state, &headers).await?;
    if state.registry.cancel(id).await {
        Ok(Json(serde_json::json!({ "success": true })))
    } else {
        Err(ApiError::NotFound)
    }
}

#[derive(Serialize)]
struct StatsResponse {
    stats: CampaignStats,
    accounts: Vec<AccountView>,
}

async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatsResponse>, ApiError> {
    let user = authed_user(&state, &headers).await?;
    Ok(Json(StatsResponse {
        stats: user.stats.clone(),
        accounts: user.accounts.iter().map(AccountView::from).collect(),
    }))
}

async fn reset_daily(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = authed_user(&state, &headers).await?;
    store::update(state.store.as_ref(), |data| {
        if let Some(owner) = data.users.iter_mut().find(|u| u.id == user.id) {
            for account in &mut owner.accounts {
                account.reset_daily();
            }
        }
    })
    .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

const DISPOSABLE_DOMAINS: [&str; 3] = ["tempmail.com", "10minutemail.com", "guerrillamail.com"];

fn check_address(address: &str) -> (bool, &'static str) {
    if address.parse::<EmailAddress>().is_err() {
        return (false, "invalid format");
    }
    let domain = address.rsplit('@').next().unwrap_or("");
    if DISPOSABLE_DOMAINS.contains(&domain) {
        return (false, "disposable address");
    }
    (true, "valid")
}

#[derive(Deserialize)]
struct VerifyRequest {
    address: String,
}

async fn verify_address(
    Json(request): Json<VerifyRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (valid, reason) = check_address(&request.address);
    Ok(Json(serde_json::json!({
        "address": request.address,
        "valid": valid,
        "reason": reason,
    })))
}
