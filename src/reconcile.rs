//! 要求された送金額・手数料と入力総額の調整。
//!
//! 入力総額が足りない場合は、手数料を差し引いた残りを各送金額の比率で按分する
//! (各要素は切り捨て)。切り捨てで生じた端数とダスト未満のおつりは手数料に吸収される。

use crate::error::AppError;
use crate::types::DUST_THRESHOLD_SATS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// 要求と同じ並びの最終送金額。0 の要素は出力されない。
    pub amounts: Vec<u64>,
    pub requested_fee: u64,
    /// 実効手数料 (吸収された端数・ダストを含む)
    pub fee: u64,
    /// 実際に出力するおつり。ダスト以下なら 0。
    pub change_value: u64,
    pub scaled: bool,
}

impl Reconciliation {
    pub fn total_payment(&self) -> u64 {
        self.amounts.iter().sum()
    }

    pub fn has_change(&self) -> bool {
        self.change_value > 0
    }
}

pub fn reconcile(
    total_input_value: u64,
    requested_fee: u64,
    requested_amounts: &[u64],
) -> Result<Reconciliation, AppError> {
    if requested_amounts.is_empty() {
        return Err(AppError::MalformedInput("送金額が指定されていません".to_string()));
    }
    if requested_amounts.contains(&0) {
        return Err(AppError::MalformedInput("送金額は0より大きい必要があります".to_string()));
    }
    let total_requested = requested_amounts
        .iter()
        .try_fold(0u64, |acc, amount| acc.checked_add(*amount))
        .ok_or_else(|| AppError::MalformedInput("送金額の合計がオーバーフローしました".to_string()))?;

    let required = total_requested.checked_add(requested_fee);
    let (amounts, remainder, scaled) = match required {
        Some(required) if required <= total_input_value => {
            (requested_amounts.to_vec(), total_input_value - required, false)
        }
        _ => {
            let available = total_input_value.checked_sub(requested_fee).ok_or(
                AppError::InsufficientFunds {
                    available: total_input_value,
                    required: total_requested.saturating_add(requested_fee),
                    fee: requested_fee,
                },
            )?;
            log::warn!(
                "資金不足のため送金額を按分します: 入力総額 {} sats, 要求額 {} sats, 手数料 {} sats",
                total_input_value,
                total_requested,
                requested_fee
            );
            let amounts: Vec<u64> = requested_amounts
                .iter()
                .map(|amount| scale(*amount, total_requested, available))
                .collect();
            // 按分後はおつりを出さない。端数は手数料へ。
            (amounts, 0, true)
        }
    };

    if amounts.iter().all(|amount| *amount == 0) {
        return Err(AppError::InsufficientFunds {
            available: total_input_value,
            required: requested_fee.saturating_add(1),
            fee: requested_fee,
        });
    }

    let change_value = if remainder > DUST_THRESHOLD_SATS {
        remainder
    } else {
        if remainder > 0 {
            log::warn!(
                "おつり {} sats はダスト閾値 {} sats 以下のため手数料に含めます。",
                remainder,
                DUST_THRESHOLD_SATS
            );
        }
        0
    };
    let total_payment: u64 = amounts.iter().sum();
    let fee = total_input_value - total_payment - change_value;
    log::debug!(
        "調整結果: 送金額 {:?}, 実効手数料 {} sats, おつり {} sats, 按分 {}",
        amounts,
        fee,
        change_value,
        scaled
    );

    Ok(Reconciliation { amounts, requested_fee, fee, change_value, scaled })
}

// floor(amount / total_requested * available) を整数演算で
fn scale(amount: u64, total_requested: u64, available: u64) -> u64 {
    (u128::from(amount) * u128::from(available) / u128::from(total_requested)) as u64
}
