//! UTXOと送金要求から Bitcoin トランザクションを構築・署名し、
//! シリアライズするかブロードキャストする。
//!
//! 入力のスクリプト形式は P2WPKH / P2PKH / P2SH-P2WPKH の3種類で、
//! 金額調整と構築の流れは共通。

pub mod cli;
pub mod config;
pub mod error;
pub mod explorer;
pub mod payment;
pub mod reconcile;
pub mod signer;
pub mod strategy;
pub mod transaction;
pub mod types;
pub mod utxo;

pub use error::AppError;
pub use strategy::ScriptType;
pub use transaction::{build_request, create_and_sign_transaction};
pub use types::BuildOutcome;
