use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{HeaderMap, header};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Credentials are stored and compared as hex-encoded SHA-256 digests;
/// the plaintext never reaches the store.
pub fn hash_credential(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// In-memory session tokens handed out by the login endpoint. Sessions do
/// not survive a restart.
#[derive(Clone, Default)]
pub struct SessionMap {
    inner: Arc<RwLock<HashMap<String, Uuid>>>,
}

impl SessionMap {
    pub async fn create(&self, user_id: Uuid) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.inner.write().await.insert(token.clone(), user_id);
        token
    }

    pub async fn user_for(&self, token: &str) -> Option<Uuid> {
        self.inner.read().await.get(token).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_the_sha256_hex_digest() {
        assert_eq!(
            hash_credential("secret"),
            "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b"
        );
    }

    #[test]
    fn bearer_token_requires_the_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert(header::AUTHORIZATION, "abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn session_round_trip() {
        let sessions = SessionMap::default();
        let user_id = Uuid::new_v4();
        let token = sessions.create(user_id).await;
        assert_eq!(sessions.user_for(&token).await, Some(user_id));
        assert_eq!(sessions.user_for("bogus").await, None);
    }
}
