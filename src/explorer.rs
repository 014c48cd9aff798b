//! ブロックエクスプローラ (前トランザクション取得) とブロードキャストAPIのHTTPクライアント。

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use bitcoin::Txid;
use reqwest::header::CONTENT_TYPE;

use crate::config::ServiceConfig;
use crate::error::AppError;

/// 前トランザクションの生データ (hex) を取得する
pub trait Explorer {
    fn fetch_previous_transaction(
        &self,
        txid: &Txid,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// 完成したトランザクションをネットワークへ送信し、txidを返す
pub trait Broadcaster {
    fn broadcast(&self, raw_tx_hex: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

#[derive(Debug, Clone)]
pub struct HttpExplorer {
    base_url: String,
    client: reqwest::Client,
}

impl HttpExplorer {
    pub fn new(config: &ServiceConfig) -> Result<Self, AppError> {
        let client = build_client(config.timeout)?;
        Ok(Self { base_url: config.explorer_url.trim_end_matches('/').to_string(), client })
    }
}

impl Explorer for HttpExplorer {
    async fn fetch_previous_transaction(&self, txid: &Txid) -> Result<String, AppError> {
        let url = format!("{}/rawtx/{}?format=hex", self.base_url, txid);
        log::debug!("前トランザクションを取得します: {}", url);

        let fetch_error = |reason: String| AppError::UpstreamFetch { txid: *txid, reason };
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| fetch_error(e.to_string()))?;
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {}: {}", status, body.trim())));
        }
        Ok(body.trim().to_string())
    }
}

#[derive(Debug, Clone)]
pub struct HttpBroadcaster {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBroadcaster {
    pub fn new(config: &ServiceConfig) -> Result<Self, AppError> {
        let client = build_client(config.timeout)?;
        Ok(Self { base_url: config.broadcast_url.trim_end_matches('/').to_string(), client })
    }
}

impl Broadcaster for HttpBroadcaster {
    async fn broadcast(&self, raw_tx_hex: &str) -> Result<String, AppError> {
        let url = format!("{}/tx", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "text/plain")
            .body(raw_tx_hex.to_string())
            .send()
            .await
            .map_err(|e| AppError::Broadcast(e.to_string()))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| AppError::Broadcast(e.to_string()))?;
        log::debug!("ブロードキャスト応答: HTTP {}, {}", status, body);
        if !status.is_success() {
            return Err(AppError::Broadcast(format!("HTTP {}: {}", status, body.trim())));
        }
        txid_from_response(&body)
    }
}

/// 応答本文がtxidそのもの、または `{"txid": ...}` のどちらでも受け付ける
fn txid_from_response(body: &str) -> Result<String, AppError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(AppError::Broadcast("応答にtxidが含まれていません".to_string()));
    }
    let candidate = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => map
            .get("txid")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| AppError::Broadcast(format!("応答にtxidが含まれていません: {}", body)))?,
        _ => body.to_string(),
    };
    Txid::from_str(&candidate)
        .map(|txid| txid.to_string())
        .map_err(|_| AppError::Broadcast(format!("応答が有効なtxidではありません: {}", body)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TXID: &str = "25678908869df04db95791a4f50a7943f751272ddd4784183bfb2a29588f2e28";

    #[test]
    fn accepts_plain_and_json_txid() {
        assert_eq!(txid_from_response(&format!("{}\n", TXID)).unwrap(), TXID);
        assert_eq!(txid_from_response(&format!("{{\"txid\":\"{}\"}}", TXID)).unwrap(), TXID);
    }

    #[test]
    fn rejects_missing_txid() {
        assert!(matches!(txid_from_response(""), Err(AppError::Broadcast(_))));
        assert!(matches!(txid_from_response("{\"ok\":true}"), Err(AppError::Broadcast(_))));
        assert!(matches!(txid_from_response("sendrawtransaction RPC error"), Err(AppError::Broadcast(_))));
    }
}
