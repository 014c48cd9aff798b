use bitcoin::{
    absolute::LockTime, consensus::encode, network::Network as BitcoinNetwork, secp256k1::{All, Secp256k1},
    transaction::Version, Amount, NetworkKind, PrivateKey, ScriptBuf, Transaction, TxIn, TxOut, Witness,
};

use crate::{
    config::InputConfig,
    error::AppError,
    explorer::{Broadcaster, Explorer},
    payment::{parse_address, parse_payments},
    reconcile::{reconcile, Reconciliation},
    signer::{sign_and_finalize, SignedTransaction},
    strategy::ScriptType,
    types::{sequence_for, BuildOutcome, InputDescriptor, TransactionRequest, UtxoRecord},
    utxo::parse_utxos,
};

/// 署名前のトランザクションと、入力と同じ並びの記述子・鍵
pub struct AssembledTransaction {
    pub transaction: Transaction,
    pub descriptors: Vec<InputDescriptor>,
    pub keys: Vec<PrivateKey>,
}

/// JSON要求を検証済みの TransactionRequest に変換する
pub fn build_request(
    config: InputConfig,
    cli_network: BitcoinNetwork,
    default_script_type: ScriptType,
) -> Result<TransactionRequest, AppError> {
    let utxos = parse_utxos(&config.utxos_string)?;
    for utxo in &utxos {
        if utxo.controlling_key.network != NetworkKind::from(cli_network) {
            return Err(AppError::NetworkMismatch {
                cli_network: format!("{:?}", cli_network),
                inferred_network: format!("{:?}", utxo.controlling_key.network),
            });
        }
    }
    let payments = parse_payments(&config.recipient_address, &config.amount_to_send, cli_network)?;
    let change_address = parse_address(&config.change_address, cli_network)?;
    let script_type = config.script_type.unwrap_or(default_script_type);

    Ok(TransactionRequest {
        utxos,
        payments,
        change_address,
        fee: config.transaction_fee,
        rbf: config.rbf,
        broadcast: config.is_broadcast,
        script_type,
    })
}

/// UTXOの順に入力を追加し、調整済みの送金額とおつりで出力を作る。
/// 前トランザクションの取得は1件ずつ順番に行う。
pub async fn assemble_transaction<E: Explorer>(
    request: &TransactionRequest,
    reconciliation: &Reconciliation,
    explorer: &E,
    secp: &Secp256k1<All>,
) -> Result<AssembledTransaction, AppError> {
    log::info!(
        "トランザクション構築処理を開始します。入力 {} 件, スクリプトタイプ {:?}",
        request.utxos.len(),
        request.script_type
    );
    let sequence = sequence_for(request.rbf);

    let mut descriptors = Vec::with_capacity(request.utxos.len());
    for (input_index, utxo) in request.utxos.iter().enumerate() {
        let previous_transaction = if request.script_type.requires_previous_transaction() {
            Some(fetch_previous_transaction(explorer, utxo).await?)
        } else {
            None
        };
        let public_key = utxo.controlling_key.public_key(secp);
        descriptors.push(request.script_type.build_input(
            input_index,
            utxo,
            &public_key,
            sequence,
            previous_transaction,
        )?);
    }

    let mut outputs = Vec::with_capacity(request.payments.len() + 1);
    for (payment, amount) in request.payments.iter().zip(&reconciliation.amounts) {
        if *amount == 0 {
            log::warn!("送金額が0になったため出力を省略します: address={}", payment.recipient);
            continue;
        }
        log::debug!("受信者出力追加: address={}, value={}", payment.recipient, amount);
        outputs.push(TxOut {
            value: Amount::from_sat(*amount),
            script_pubkey: payment.recipient.script_pubkey(),
        });
    }
    if reconciliation.has_change() {
        log::debug!(
            "おつり発生: {} sats, おつりアドレス: {}",
            reconciliation.change_value,
            request.change_address
        );
        outputs.push(TxOut {
            value: Amount::from_sat(reconciliation.change_value),
            script_pubkey: request.change_address.script_pubkey(),
        });
    }

    // 署名対象のトランザクションを初期化 (script_sig と witness は空)
    let transaction = Transaction {
        version: Version(2),
        lock_time: LockTime::ZERO,
        input: descriptors
            .iter()
            .map(|d| TxIn {
                previous_output: d.out_point,
                script_sig: ScriptBuf::new(),
                sequence: d.sequence,
                witness: Witness::new(),
            })
            .collect(),
        output: outputs,
    };
    let keys = request.utxos.iter().map(|u| u.controlling_key).collect();

    Ok(AssembledTransaction { transaction, descriptors, keys })
}

async fn fetch_previous_transaction<E: Explorer>(
    explorer: &E,
    utxo: &UtxoRecord,
) -> Result<Transaction, AppError> {
    let raw_hex = explorer.fetch_previous_transaction(&utxo.txid).await?;
    let fetch_error = |reason: String| AppError::UpstreamFetch { txid: utxo.txid, reason };
    let bytes = hex::decode(raw_hex.trim()).map_err(|e| fetch_error(format!("hexのデコードに失敗: {}", e)))?;
    let transaction: Transaction =
        encode::deserialize(&bytes).map_err(|e| fetch_error(format!("トランザクションのデコードに失敗: {}", e)))?;
    log::debug!("前トランザクション取得完了: txid={}, {} bytes", utxo.txid, bytes.len());
    Ok(transaction)
}

/// broadcast が真なら送信して txid を、偽なら hex と vsize を返す。失敗時に他方へは切り替えない。
pub async fn broadcast_or_return<B: Broadcaster>(
    signed: &SignedTransaction,
    broadcast: bool,
    broadcaster: &B,
) -> Result<BuildOutcome, AppError> {
    if broadcast {
        let txid = broadcaster.broadcast(&signed.hex).await?;
        log::info!("トランザクションをブロードキャストしました。txid: {}", txid);
        Ok(BuildOutcome::Broadcast { txid })
    } else {
        log::info!("トランザクションを作成しました (ブロードキャストなし)。");
        Ok(BuildOutcome::Prepared { hex: signed.hex.clone(), virtual_size: signed.virtual_size })
    }
}

/// パース済み要求から、調整 → 構築 → 署名 → ブロードキャスト判定までを通しで行う
pub async fn create_and_sign_transaction<E: Explorer, B: Broadcaster>(
    request: TransactionRequest,
    explorer: &E,
    broadcaster: &B,
    secp: &Secp256k1<All>,
) -> Result<BuildOutcome, AppError> {
    let requested_amounts: Vec<u64> = request.payments.iter().map(|p| p.amount).collect();
    let reconciliation = reconcile(request.total_input_value()?, request.fee, &requested_amounts)?;

    let assembled = assemble_transaction(&request, &reconciliation, explorer, secp).await?;
    let signed = sign_and_finalize(assembled.transaction, &assembled.descriptors, &assembled.keys, secp)?;
    log::info!("署名済みトランザクションの生成に成功しました。");

    broadcast_or_return(&signed, request.broadcast, broadcaster).await
}
