use std::path::PathBuf;
use bitcoin::Txid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSONパースエラー ファイル: {file_path:?}, 詳細: {source}")]
    JsonParse {
        file_path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("入力形式エラー: {0}")]
    MalformedInput(String),

    #[error("ネットワーク不整合: CLI指定 ({cli_network}) vs WIF/アドレス ({inferred_network})")]
    NetworkMismatch {
        cli_network: String,
        inferred_network: String,
    },

    #[error("資金不足: 利用可能な総額 {available} sats, 要求額 {required} sats (手数料 {fee} sats を含む)")]
    InsufficientFunds {
        available: u64,
        required: u64,
        fee: u64,
    },

    #[error("前トランザクションの取得に失敗 (txid {txid}): {reason}")]
    UpstreamFetch {
        txid: Txid,
        reason: String,
    },

    #[error("署名エラー (入力インデックス {input_index}): {reason}")]
    Signing {
        input_index: usize,
        reason: String,
    },

    #[error("ブロードキャストエラー: {0}")]
    Broadcast(String),

    #[error("HTTPクライアントの初期化に失敗: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl AppError {
    /// 呼び出し側 (HTTP層など) がステータスへ対応付けるための短いコード。
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::MalformedInput(_) | AppError::NetworkMismatch { .. } | AppError::JsonParse { .. } => {
                "malformed_input"
            }
            AppError::InsufficientFunds { .. } => "insufficient_funds",
            AppError::UpstreamFetch { .. } => "upstream_fetch",
            AppError::Signing { .. } => "signing",
            AppError::Broadcast(_) => "broadcast",
            AppError::Io(_) | AppError::HttpClient(_) => "internal",
        }
    }

    pub(crate) fn signing(input_index: usize, reason: impl std::fmt::Display) -> Self {
        AppError::Signing { input_index, reason: reason.to_string() }
    }
}
