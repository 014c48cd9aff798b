//! UTXO文字列のパース。
//!
//! エントリは `|` 区切り。各エントリは次のいずれかの形式:
//! - 位置指定: `txid:vout,value,wif`
//! - キー指定: `txid:<hex>, vout:<n>, value:<sats>, wif:<WIF>` (順不同)

use std::collections::HashSet;
use std::str::FromStr;

use bitcoin::{Amount, PrivateKey, Txid};

use crate::error::AppError;
use crate::types::UtxoRecord;

const ENTRY_DELIMITER: char = '|';
const FIELD_DELIMITER: char = ',';

pub fn parse_utxos(utxos_string: &str) -> Result<Vec<UtxoRecord>, AppError> {
    if utxos_string.trim().is_empty() {
        return Err(AppError::MalformedInput("UTXOリストが空です".to_string()));
    }

    let mut records = Vec::new();
    let mut seen = HashSet::new();
    for (index, entry) in utxos_string.split(ENTRY_DELIMITER).enumerate() {
        let record = parse_entry(entry.trim())
            .map_err(|reason| AppError::MalformedInput(format!("UTXO #{}: {}", index, reason)))?;
        if !seen.insert(record.out_point()) {
            // 二重使用の回避は呼び出し側の責任
            log::warn!("重複したUTXOが指定されています: {}:{}", record.txid, record.vout);
        }
        log::debug!("UTXOパース成功: txid={}, vout={}, value={}", record.txid, record.vout, record.value);
        records.push(record);
    }
    Ok(records)
}

fn parse_entry(entry: &str) -> Result<UtxoRecord, String> {
    let fields: Vec<&str> = entry.split(FIELD_DELIMITER).map(str::trim).collect();
    if is_keyed(&fields) {
        parse_keyed(&fields)
    } else {
        parse_positional(&fields)
    }
}

// `vout:` か `value:` で始まるフィールドがあればキー指定形式
fn is_keyed(fields: &[&str]) -> bool {
    fields.iter().any(|f| f.starts_with("vout:") || f.starts_with("value:"))
}

fn parse_positional(fields: &[&str]) -> Result<UtxoRecord, String> {
    let [outpoint, value, key] = fields else {
        return Err(format!("フィールド数が不正です (期待値 3, 実際 {})", fields.len()));
    };
    let (txid, vout) = outpoint
        .split_once(':')
        .ok_or_else(|| format!("txid:vout 形式ではありません: {}", outpoint))?;
    build_record(txid, vout, value, key)
}

fn parse_keyed(fields: &[&str]) -> Result<UtxoRecord, String> {
    if fields.len() != 4 {
        return Err(format!("フィールド数が不正です (期待値 4, 実際 {})", fields.len()));
    }
    let (mut txid, mut vout, mut value, mut key) = (None, None, None, None);
    for field in fields {
        let (name, content) = field
            .split_once(':')
            .ok_or_else(|| format!("key:value 形式ではありません: {}", field))?;
        let slot = match name.trim() {
            "txid" => &mut txid,
            "vout" => &mut vout,
            "value" => &mut value,
            "wif" | "key" => &mut key,
            other => return Err(format!("不明なフィールド: {}", other)),
        };
        if slot.replace(content.trim()).is_some() {
            return Err(format!("フィールドが重複しています: {}", name.trim()));
        }
    }
    match (txid, vout, value, key) {
        (Some(txid), Some(vout), Some(value), Some(key)) => build_record(txid, vout, value, key),
        _ => Err("txid, vout, value, wif のいずれかが欠けています".to_string()),
    }
}

fn build_record(txid: &str, vout: &str, value: &str, key: &str) -> Result<UtxoRecord, String> {
    let txid = txid.trim();
    if txid.is_empty() {
        return Err("txidが空です".to_string());
    }
    let txid = Txid::from_str(txid).map_err(|e| format!("無効なTXID形式 ({}): {}", txid, e))?;
    let vout: u32 = vout
        .trim()
        .parse()
        .map_err(|e| format!("無効なvout ({}): {}", vout, e))?;
    let value: u64 = value
        .trim()
        .parse()
        .map_err(|e| format!("無効な金額 ({}): {}", value, e))?;
    if value == 0 {
        return Err("UTXOの金額は0より大きい必要があります".to_string());
    }
    if value > Amount::MAX_MONEY.to_sat() {
        return Err(format!("UTXOの金額が発行上限を超えています: {}", value));
    }
    // 鍵の内容はエラーメッセージに含めない
    let controlling_key =
        PrivateKey::from_wif(key.trim()).map_err(|e| format!("秘密鍵(WIF)のデコードに失敗: {}", e))?;
    Ok(UtxoRecord { txid, vout, value, controlling_key })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::secp256k1::SecretKey;
    use bitcoin::Network;

    const TXID_A: &str = "25678908869df04db95791a4f50a7943f751272ddd4784183bfb2a29588f2e28";
    const TXID_B: &str = "96bc93a16ee5566d26e682f8d300ad11130db811cc5617d55bd9df4f0f25229d";

    fn wif(byte: u8) -> String {
        PrivateKey::new(SecretKey::from_slice(&[byte; 32]).unwrap(), Network::Bitcoin).to_wif()
    }

    #[test]
    fn parses_positional_entries_in_order() {
        let input = format!("{}:0,15851,{}|{}:3,10000,{}", TXID_A, wif(1), TXID_B, wif(2));
        let utxos = parse_utxos(&input).unwrap();
        assert_eq!(utxos.len(), 2);
        assert_eq!(utxos[0].txid.to_string(), TXID_A);
        assert_eq!(utxos[0].vout, 0);
        assert_eq!(utxos[0].value, 15851);
        assert_eq!(utxos[1].txid.to_string(), TXID_B);
        assert_eq!(utxos[1].vout, 3);
        assert_eq!(utxos[1].controlling_key.to_wif(), wif(2));
    }

    #[test]
    fn parses_keyed_entries() {
        let input = format!(
            "txid:{}, vout:0, value:15851, wif:{}|value:10000, wif:{}, txid:{}, vout:1",
            TXID_A,
            wif(1),
            wif(2),
            TXID_B
        );
        let utxos = parse_utxos(&input).unwrap();
        assert_eq!(utxos[0].value, 15851);
        assert_eq!(utxos[1].txid.to_string(), TXID_B);
        assert_eq!(utxos[1].vout, 1);
        assert_eq!(utxos[1].value, 10000);
    }

    #[test]
    fn duplicates_are_accepted() {
        let entry = format!("{}:0,1000,{}", TXID_A, wif(1));
        let utxos = parse_utxos(&format!("{}|{}", entry, entry)).unwrap();
        assert_eq!(utxos.len(), 2);
    }

    fn assert_malformed(input: &str) {
        match parse_utxos(input) {
            Err(AppError::MalformedInput(_)) => {}
            other => panic!("MalformedInputを期待しましたが {:?}", other),
        }
    }

    #[test]
    fn rejects_malformed_entries() {
        assert_malformed("");
        assert_malformed(&format!("{}:0,1000", TXID_A));
        assert_malformed(&format!("{}:0,1000,{},extra", TXID_A, wif(1)));
        assert_malformed(&format!(":0,1000,{}", wif(1)));
        assert_malformed(&format!("{}:0,-5,{}", TXID_A, wif(1)));
        assert_malformed(&format!("{}:0,abc,{}", TXID_A, wif(1)));
        assert_malformed(&format!("{}:0,0,{}", TXID_A, wif(1)));
        assert_malformed(&format!("{}:x,1000,{}", TXID_A, wif(1)));
        assert_malformed(&format!("abcd:0,1000,{}", wif(1)));
        assert_malformed(&format!("{}:0,1000,notawif", TXID_A));
        assert_malformed(&format!("txid:{}, vout:0, value:1000", TXID_A));
    }

    #[test]
    fn rejects_value_above_money_supply() {
        let max = Amount::MAX_MONEY.to_sat();
        assert!(parse_utxos(&format!("{}:0,{},{}", TXID_A, max, wif(1))).is_ok());
        assert_malformed(&format!("{}:0,{},{}", TXID_A, max + 1, wif(1)));
        assert_malformed(&format!("{}:0,{},{}|{}:0,2,{}", TXID_A, u64::MAX, wif(1), TXID_B, wif(2)));
    }

    #[test]
    fn error_does_not_leak_key() {
        let key = wif(9);
        let input = format!("{}:0,abc,{}", TXID_A, key);
        let err = parse_utxos(&input).unwrap_err();
        assert!(!err.to_string().contains(&key));
    }
}
