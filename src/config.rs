use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::strategy::ScriptType;

/// 呼び出し側から渡されるトランザクション作成要求 (JSON)
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputConfig {
    /// `txid:vout,value,wif|...` 形式。秘密鍵を含むためログに出さないこと。
    pub utxos_string: String,
    /// カンマ区切りで複数指定可
    pub recipient_address: String,
    #[serde(deserialize_with = "string_or_number")]
    pub amount_to_send: String,
    pub change_address: String,
    #[serde(rename = "RBF", default, deserialize_with = "bool_or_string")]
    pub rbf: bool,
    #[serde(default, deserialize_with = "bool_or_string")]
    pub is_broadcast: bool,
    #[serde(deserialize_with = "u64_or_string")]
    pub transaction_fee: u64,
    #[serde(default)]
    pub script_type: Option<ScriptType>,
}

// utxos_string には秘密鍵が含まれる
impl std::fmt::Debug for InputConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputConfig")
            .field("utxos_string", &"<redacted>")
            .field("recipient_address", &self.recipient_address)
            .field("amount_to_send", &self.amount_to_send)
            .field("change_address", &self.change_address)
            .field("rbf", &self.rbf)
            .field("is_broadcast", &self.is_broadcast)
            .field("transaction_fee", &self.transaction_fee)
            .field("script_type", &self.script_type)
            .finish()
    }
}

/// 外部サービスの接続設定 (CLI引数から作る)
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub explorer_url: String,
    pub broadcast_url: String,
    pub timeout: Duration,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrString {
    Bool(bool),
    String(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

// "true" 以外の文字列は false として扱う
fn bool_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(b) => b,
        BoolOrString::String(s) => s.trim() == "true",
    })
}

fn u64_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s
            .trim()
            .parse()
            .map_err(|e| serde::de::Error::custom(format!("無効な手数料 ({}): {}", s, e))),
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n.to_string(),
        NumberOrString::String(s) => s,
    })
}
