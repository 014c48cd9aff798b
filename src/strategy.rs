use bitcoin::{
    script::ScriptBuf, Amount, PublicKey, Sequence, Transaction, TxOut,
};
use clap::ValueEnum;
use serde::Deserialize;

use crate::error::AppError;
use crate::types::{InputDescriptor, UtxoRecord};

/// 入力が前出力をどのスクリプト形式で消費するか。1リクエスト内では全入力で共通。
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptType {
    /// ネイティブSegWit (bech32)
    P2wpkh,
    /// レガシー
    P2pkh,
    /// P2SHでラップしたP2WPKH (BIP49)
    P2shP2wpkh,
}

impl ScriptType {
    /// 前トランザクション全体 (エクスプローラから取得) が必要か
    pub fn requires_previous_transaction(self) -> bool {
        match self {
            ScriptType::P2wpkh => false,
            ScriptType::P2pkh | ScriptType::P2shP2wpkh => true,
        }
    }

    pub fn build_input(
        self,
        input_index: usize,
        utxo: &UtxoRecord,
        public_key: &PublicKey,
        sequence: Sequence,
        previous_transaction: Option<Transaction>,
    ) -> Result<InputDescriptor, AppError> {
        let descriptor = match self {
            ScriptType::P2wpkh => {
                // 前出力のスクリプトと金額だけで署名できる
                let script_pubkey = p2wpkh_script(input_index, public_key)?;
                InputDescriptor {
                    script_type: self,
                    out_point: utxo.out_point(),
                    sequence,
                    spent_output: TxOut { value: Amount::from_sat(utxo.value), script_pubkey },
                    previous_transaction: None,
                    redeem_script: None,
                }
            }
            ScriptType::P2pkh => {
                let previous_transaction = require_previous(utxo, previous_transaction)?;
                let spent_output = spent_output_of(utxo, &previous_transaction)?;
                InputDescriptor {
                    script_type: self,
                    out_point: utxo.out_point(),
                    sequence,
                    spent_output,
                    previous_transaction: Some(previous_transaction),
                    redeem_script: None,
                }
            }
            ScriptType::P2shP2wpkh => {
                let previous_transaction = require_previous(utxo, previous_transaction)?;
                let spent_output = spent_output_of(utxo, &previous_transaction)?;
                let redeem_script = p2wpkh_script(input_index, public_key)?;
                InputDescriptor {
                    script_type: self,
                    out_point: utxo.out_point(),
                    sequence,
                    spent_output,
                    previous_transaction: Some(previous_transaction),
                    redeem_script: Some(redeem_script),
                }
            }
        };
        log::debug!(
            "入力 {} ({:?}) の記述子を構築: txid={}, vout={}, value={}",
            input_index,
            self,
            utxo.txid,
            utxo.vout,
            descriptor.spent_output.value.to_sat()
        );
        Ok(descriptor)
    }

    /// 鍵から導かれる、この形式の前出力 scriptPubKey
    pub fn expected_script_pubkey(
        self,
        input_index: usize,
        public_key: &PublicKey,
    ) -> Result<ScriptBuf, AppError> {
        match self {
            ScriptType::P2wpkh => p2wpkh_script(input_index, public_key),
            ScriptType::P2pkh => Ok(ScriptBuf::new_p2pkh(&public_key.pubkey_hash())),
            ScriptType::P2shP2wpkh => {
                let redeem_script = p2wpkh_script(input_index, public_key)?;
                Ok(ScriptBuf::new_p2sh(&redeem_script.script_hash()))
            }
        }
    }
}

fn p2wpkh_script(input_index: usize, public_key: &PublicKey) -> Result<ScriptBuf, AppError> {
    let wpubkey_hash = public_key
        .wpubkey_hash()
        .map_err(|e| AppError::signing(input_index, format!("SegWitには圧縮公開鍵が必要です: {}", e)))?;
    Ok(ScriptBuf::new_p2wpkh(&wpubkey_hash))
}

fn require_previous(
    utxo: &UtxoRecord,
    previous_transaction: Option<Transaction>,
) -> Result<Transaction, AppError> {
    let previous_transaction = previous_transaction.ok_or_else(|| AppError::UpstreamFetch {
        txid: utxo.txid,
        reason: "前トランザクションが渡されていません".to_string(),
    })?;
    let actual = previous_transaction.compute_txid();
    if actual != utxo.txid {
        return Err(AppError::UpstreamFetch {
            txid: utxo.txid,
            reason: format!("取得したトランザクションのtxidが一致しません: {}", actual),
        });
    }
    Ok(previous_transaction)
}

fn spent_output_of(utxo: &UtxoRecord, previous_transaction: &Transaction) -> Result<TxOut, AppError> {
    let output = previous_transaction
        .output
        .get(utxo.vout as usize)
        .ok_or_else(|| {
            AppError::MalformedInput(format!(
                "vout {} は範囲外です (txid {} の出力数 {})",
                utxo.vout,
                utxo.txid,
                previous_transaction.output.len()
            ))
        })?;
    if output.value.to_sat() != utxo.value {
        return Err(AppError::MalformedInput(format!(
            "UTXO {}:{} の金額が一致しません: 指定 {} sats, チェーン上 {} sats",
            utxo.txid,
            utxo.vout,
            utxo.value,
            output.value.to_sat()
        )));
    }
    Ok(output.clone())
}
