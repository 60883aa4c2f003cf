//! Settlement notification: match id plus ordered winners, signed with HMAC-SHA256

use futures::future::BoxFuture;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;

use super::client::RestClient;
use super::results::SinkError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `t=<unix secs>,v1=<hex hmac>`
pub const SIGNATURE_HEADER: &str = "X-Arena-Signature";

/// Everything the settlement system is told
#[derive(Debug, Clone, Serialize)]
pub struct SettlementNotice {
    pub match_id: Uuid,
    pub winners: Vec<Uuid>,
}

pub trait SettlementNotifier: Send + Sync {
    fn notify<'a>(&'a self, notice: &'a SettlementNotice) -> BoxFuture<'a, Result<(), SinkError>>;
}

/// Hex HMAC over `"{timestamp}.{payload}"`
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, SinkError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SinkError::Signature)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Signed POST to the settlement endpoint
pub struct SignedSettlement {
    client: RestClient,
    secret: String,
}

impl SignedSettlement {
    pub fn new(client: RestClient, secret: String) -> Self {
        Self { client, secret }
    }
}

impl SettlementNotifier for SignedSettlement {
    fn notify<'a>(&'a self, notice: &'a SettlementNotice) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            let payload = serde_json::to_vec(notice).map_err(|e| SinkError::Rest(e.into()))?;
            let timestamp = chrono::Utc::now().timestamp();
            let signature = sign_payload(&self.secret, timestamp, &payload)?;

            self.client
                .post_raw(
                    "",
                    payload,
                    &[(SIGNATURE_HEADER, format!("t={},v1={}", timestamp, signature))],
                )
                .await?;

            info!(match_id = %notice.match_id, winners = notice.winners.len(), "Settlement notified");
            Ok(())
        })
    }
}

/// Logs the notice when settlement is not configured
pub struct LogSettlement;

impl SettlementNotifier for LogSettlement {
    fn notify<'a>(&'a self, notice: &'a SettlementNotice) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            info!(
                match_id = %notice.match_id,
                winners = ?notice.winners,
                "Settlement notice (no settlement endpoint configured)"
            );
            Ok(())
        })
    }
}

/// Pick the notifier for the configured environment
pub fn settlement_notifier(config: &Config) -> Arc<dyn SettlementNotifier> {
    match (&config.settlement_url, &config.settlement_secret) {
        (Some(url), Some(secret)) => Arc::new(SignedSettlement::new(
            RestClient::new(url, None),
            secret.clone(),
        )),
        _ => Arc::new(LogSettlement),
    }
}
