use std::fmt;

use bitcoin::{Address, OutPoint, PrivateKey, ScriptBuf, Sequence, Transaction, TxOut, Txid};
use serde::Serialize;

use crate::error::AppError;
use crate::strategy::ScriptType;

// Bitcoin Coreのデフォルトダスト閾値 (P2PKH/P2WPKH出力に対して)
pub const DUST_THRESHOLD_SATS: u64 = 546;

/// BIP125 の置き換え可能シグナル (0xfffffffd)
pub const RBF_SEQUENCE: Sequence = Sequence::ENABLE_RBF_NO_LOCKTIME;

/// 置き換え不可 (0xffffffff)
pub const FINAL_SEQUENCE: Sequence = Sequence::MAX;

pub fn sequence_for(rbf: bool) -> Sequence {
    if rbf { RBF_SEQUENCE } else { FINAL_SEQUENCE }
}

/// 呼び出し側から渡された使用可能なUTXO。パース後は不変。
#[derive(Clone)]
pub struct UtxoRecord {
    pub txid: Txid,
    pub vout: u32,
    pub value: u64,
    pub controlling_key: PrivateKey,
}

impl UtxoRecord {
    pub fn out_point(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }
}

// 秘密鍵はログに出さない
impl fmt::Debug for UtxoRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UtxoRecord")
            .field("txid", &self.txid)
            .field("vout", &self.vout)
            .field("value", &self.value)
            .field("controlling_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub recipient: Address,
    pub amount: u64,
}

/// 1リクエスト分の作業単位。リクエスト間で共有しない。
#[derive(Debug)]
pub struct TransactionRequest {
    pub utxos: Vec<UtxoRecord>,
    pub payments: Vec<PaymentRequest>,
    pub change_address: Address,
    pub fee: u64,
    pub rbf: bool,
    pub broadcast: bool,
    pub script_type: ScriptType,
}

impl TransactionRequest {
    pub fn total_input_value(&self) -> Result<u64, AppError> {
        self.utxos
            .iter()
            .try_fold(0u64, |acc, u| acc.checked_add(u.value))
            .ok_or_else(|| AppError::MalformedInput("UTXO金額の合計がオーバーフローしました".to_string()))
    }
}

/// 1つのUTXOを消費するために必要な情報 (スクリプトタイプごとに内容が異なる)
#[derive(Debug, Clone)]
pub struct InputDescriptor {
    pub script_type: ScriptType,
    pub out_point: OutPoint,
    pub sequence: Sequence,
    pub spent_output: TxOut,
    pub previous_transaction: Option<Transaction>,
    pub redeem_script: Option<ScriptBuf>,
}

/// パイプラインの最終結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BuildOutcome {
    Broadcast {
        txid: String,
    },
    Prepared {
        hex: String,
        #[serde(rename = "virtualSize")]
        virtual_size: usize,
    },
}
