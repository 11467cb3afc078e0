use std::sync::Arc;

use mailout_types::User;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::auth::SessionMap;
use crate::campaign::CampaignRegistry;
use crate::policy::Passthrough;
use crate::routes::AppState;
use crate::store::{FileStore, StoreData};

mod auth;
mod campaign;
mod error;
mod pacing;
mod policy;
mod routes;
mod store;
mod template;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store_path =
        std::env::var("STORE_PATH").unwrap_or_else(|_| "mailout-store.json".to_string());
    let admin_password =
        std::env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "changeme".to_string());
    let admin_hash = auth::hash_credential(&admin_password);
    let initial = StoreData {
        admin_hash: admin_hash.clone(),
        users: vec![User::new("admin", admin_hash, 500)],
    };
    let store = Arc::new(FileStore::open(&store_path, initial).await?);

    let state = AppState {
        store,
        sessions: SessionMap::default(),
        registry: CampaignRegistry::default(),
        policy: Arc::new(Passthrough),
    };
    let app = routes::router(state);

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .expect("PORT must be a valid u16");
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    info!(store = %store_path, "listening on http://0.0.0.0:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
