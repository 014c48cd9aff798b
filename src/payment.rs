use std::str::FromStr;

use bitcoin::{Address, Network as BitcoinNetwork};

use crate::error::AppError;
use crate::types::PaymentRequest;

const LIST_DELIMITER: char = ',';

/// アドレスをパースし、指定ネットワークのものか検証する
pub fn parse_address(address: &str, network: BitcoinNetwork) -> Result<Address, AppError> {
    let address = address.trim();
    Address::from_str(address)
        .and_then(|addr| addr.require_network(network))
        .map_err(|e| {
            AppError::MalformedInput(format!(
                "アドレス形式エラーまたはネットワーク不整合 ({}): {}",
                address, e
            ))
        })
}

/// カンマ区切りの受信者アドレスと送金額を位置で対応付ける。
/// 1件だけの場合も同じ経路で扱う。
pub fn parse_payments(
    recipient_addresses: &str,
    amounts: &str,
    network: BitcoinNetwork,
) -> Result<Vec<PaymentRequest>, AppError> {
    let addresses: Vec<&str> = recipient_addresses.split(LIST_DELIMITER).map(str::trim).collect();
    let amounts: Vec<&str> = amounts.split(LIST_DELIMITER).map(str::trim).collect();

    if addresses.len() != amounts.len() {
        return Err(AppError::MalformedInput(format!(
            "受信者アドレス数 ({}) と送金額の数 ({}) が一致しません",
            addresses.len(),
            amounts.len()
        )));
    }

    addresses
        .iter()
        .zip(amounts.iter())
        .map(|(address, amount)| {
            if address.is_empty() {
                return Err(AppError::MalformedInput("受信者アドレスが空です".to_string()));
            }
            let recipient = parse_address(address, network)?;
            let amount: u64 = amount
                .parse()
                .map_err(|e| AppError::MalformedInput(format!("無効な送金額 ({}): {}", amount, e)))?;
            if amount == 0 {
                return Err(AppError::MalformedInput(format!(
                    "送金額は0より大きい必要があります ({})",
                    address
                )));
            }
            log::debug!("受信者出力要求: address={}, value={}", recipient, amount);
            Ok(PaymentRequest { recipient, amount })
        })
        .collect()
}
