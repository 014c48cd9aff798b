use bitcoin::{
    consensus::encode,
    hashes::Hash,
    script::{Builder, PushBytesBuf},
    secp256k1::{All, Message, Secp256k1},
    sighash::{EcdsaSighashType, SighashCache},
    PrivateKey, PublicKey, ScriptBuf, Transaction, Witness,
};

use crate::error::AppError;
use crate::strategy::ScriptType;
use crate::types::InputDescriptor;

// 署名に必要な情報を一時的に保持するための構造体
struct SigningInfo<'a> {
    input_index: usize,
    sighash_message: Message,
    private_key: &'a PrivateKey,
    public_key: PublicKey,
    script_type: ScriptType,
    redeem_script: Option<&'a ScriptBuf>,
}

/// 署名・ファイナライズ済みのトランザクション
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub hex: String,
    pub virtual_size: usize,
}

/// 各入力をそれぞれのUTXOの鍵で署名し (入力と鍵は位置で1対1)、
/// scriptSig / witness を確定してシリアライズする。
pub fn sign_and_finalize(
    mut transaction: Transaction,
    descriptors: &[InputDescriptor],
    keys: &[PrivateKey],
    secp: &Secp256k1<All>,
) -> Result<SignedTransaction, AppError> {
    if descriptors.len() != transaction.input.len() || keys.len() != transaction.input.len() {
        return Err(AppError::signing(
            descriptors.len().min(keys.len()),
            format!(
                "入力数 {} に対し記述子 {} 件, 鍵 {} 件",
                transaction.input.len(),
                descriptors.len(),
                keys.len()
            ),
        ));
    }

    log::info!("トランザクション署名処理を開始します。");
    let mut signing_infos: Vec<SigningInfo> = Vec::with_capacity(descriptors.len());

    // 1. 署名ハッシュ計算フェーズ
    {
        let mut sighash_cache = SighashCache::new(&transaction);

        for (input_index, (descriptor, private_key)) in descriptors.iter().zip(keys).enumerate() {
            let public_key = private_key.public_key(secp);
            let expected = descriptor.script_type.expected_script_pubkey(input_index, &public_key)?;
            if expected != descriptor.spent_output.script_pubkey {
                return Err(AppError::signing(
                    input_index,
                    format!(
                        "鍵が前出力のスクリプトと一致しません (期待 {}, 実際 {})",
                        expected.to_hex_string(),
                        descriptor.spent_output.script_pubkey.to_hex_string()
                    ),
                ));
            }

            let sighash_type = EcdsaSighashType::All;
            let redeem_script = descriptor.redeem_script.as_ref();
            let sighash_message = match descriptor.script_type {
                ScriptType::P2pkh => {
                    let sighash = sighash_cache
                        .legacy_signature_hash(
                            input_index,
                            &descriptor.spent_output.script_pubkey,
                            sighash_type.to_u32(),
                        )
                        .map_err(|e| AppError::signing(input_index, e))?;
                    Message::from_digest(sighash.to_byte_array())
                }
                ScriptType::P2wpkh => {
                    let sighash = sighash_cache
                        .p2wpkh_signature_hash(
                            input_index,
                            &descriptor.spent_output.script_pubkey,
                            descriptor.spent_output.value,
                            sighash_type,
                        )
                        .map_err(|e| AppError::signing(input_index, e))?;
                    Message::from_digest(sighash.to_byte_array())
                }
                ScriptType::P2shP2wpkh => {
                    // BIP143 のスクリプトコードは redeem script (P2WPKH) から作る
                    let redeem = redeem_script
                        .ok_or_else(|| AppError::signing(input_index, "redeem scriptがありません"))?;
                    if ScriptBuf::new_p2sh(&redeem.script_hash()) != descriptor.spent_output.script_pubkey {
                        return Err(AppError::signing(input_index, "redeem scriptが前出力のハッシュと一致しません"));
                    }
                    let sighash = sighash_cache
                        .p2wpkh_signature_hash(
                            input_index,
                            redeem,
                            descriptor.spent_output.value,
                            sighash_type,
                        )
                        .map_err(|e| AppError::signing(input_index, e))?;
                    Message::from_digest(sighash.to_byte_array())
                }
            };
            log::debug!("入力 {} ({:?}) の署名ハッシュ計算完了。", input_index, descriptor.script_type);

            signing_infos.push(SigningInfo {
                input_index,
                sighash_message,
                private_key,
                public_key,
                script_type: descriptor.script_type,
                redeem_script,
            });
        }
    }

    // 2. 署名生成と適用 (ファイナライズ) フェーズ
    for info in signing_infos {
        let signature = bitcoin::ecdsa::Signature {
            signature: secp.sign_ecdsa(&info.sighash_message, &info.private_key.inner),
            sighash_type: EcdsaSighashType::All,
        };
        let input = &mut transaction.input[info.input_index];

        match info.script_type {
            ScriptType::P2pkh => {
                input.script_sig = Builder::new()
                    .push_slice(push_bytes(info.input_index, signature.to_vec())?)
                    .push_key(&info.public_key)
                    .into_script();
            }
            ScriptType::P2wpkh => {
                input.witness = p2wpkh_witness(&signature, &info.public_key);
            }
            ScriptType::P2shP2wpkh => {
                let redeem = info
                    .redeem_script
                    .ok_or_else(|| AppError::signing(info.input_index, "redeem scriptがありません"))?;
                input.script_sig = Builder::new()
                    .push_slice(push_bytes(info.input_index, redeem.to_bytes())?)
                    .into_script();
                input.witness = p2wpkh_witness(&signature, &info.public_key);
            }
        }
        log::debug!("入力 {} ({:?}) の署名適用完了。", info.input_index, info.script_type);
    }
    log::info!("全ての入力の署名が完了しました。");

    let hex = encode::serialize_hex(&transaction);
    let virtual_size = transaction.vsize();
    log::info!("txid={}, vsize={} vB", transaction.compute_txid(), virtual_size);

    Ok(SignedTransaction { transaction, hex, virtual_size })
}

fn push_bytes(input_index: usize, bytes: Vec<u8>) -> Result<PushBytesBuf, AppError> {
    PushBytesBuf::try_from(bytes)
        .map_err(|_| AppError::signing(input_index, "PushBytes変換に失敗"))
}

fn p2wpkh_witness(signature: &bitcoin::ecdsa::Signature, public_key: &PublicKey) -> Witness {
    let mut witness = Witness::new();
    witness.push(signature.to_vec());
    witness.push(public_key.to_bytes());
    witness
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::sequence_for;
    use bitcoin::absolute::LockTime;
    use bitcoin::secp256k1::{ecdsa, SecretKey};
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, Network, OutPoint, Sequence, TxIn, TxOut, Txid};

    fn key(byte: u8) -> PrivateKey {
        PrivateKey::new(SecretKey::from_slice(&[byte; 32]).unwrap(), Network::Bitcoin)
    }

    fn funding_tx(script_pubkey: ScriptBuf, value: u64) -> Transaction {
        Transaction {
            version: Version(2),
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::new(Txid::all_zeros(), 0),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut { value: Amount::from_sat(value), script_pubkey }],
        }
    }

    fn unsigned_spending(descriptors: &[InputDescriptor]) -> Transaction {
        Transaction {
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
            output: vec![TxOut {
                value: Amount::from_sat(1_000),
                script_pubkey: ScriptBuf::new_p2pkh(&key(9).public_key(&Secp256k1::new()).pubkey_hash()),
            }],
        }
    }

    fn descriptor_for(script_type: ScriptType, private_key: PrivateKey, value: u64) -> InputDescriptor {
        let secp = Secp256k1::new();
        let pk = private_key.public_key(&secp);
        let script = script_type.expected_script_pubkey(0, &pk).unwrap();
        let prev = funding_tx(script, value);
        let utxo = crate::types::UtxoRecord {
            txid: prev.compute_txid(),
            vout: 0,
            value,
            controlling_key: private_key,
        };
        let prev = script_type.requires_previous_transaction().then_some(prev);
        script_type.build_input(0, &utxo, &pk, sequence_for(false), prev).unwrap()
    }

    #[test]
    fn p2wpkh_signature_verifies() {
        let secp = Secp256k1::new();
        let descriptor = descriptor_for(ScriptType::P2wpkh, key(1), 5_000);
        let tx = unsigned_spending(std::slice::from_ref(&descriptor));
        let signed = sign_and_finalize(tx, std::slice::from_ref(&descriptor), &[key(1)], &secp).unwrap();

        let input = &signed.transaction.input[0];
        assert!(input.script_sig.is_empty());
        assert_eq!(input.witness.len(), 2);

        let witness_sig = input.witness.nth(0).unwrap();
        let sig = ecdsa::Signature::from_der(&witness_sig[..witness_sig.len() - 1]).unwrap();
        assert_eq!(*witness_sig.last().unwrap(), EcdsaSighashType::All as u8);

        let mut cache = SighashCache::new(&signed.transaction);
        let sighash = cache
            .p2wpkh_signature_hash(0, &descriptor.spent_output.script_pubkey, Amount::from_sat(5_000), EcdsaSighashType::All)
            .unwrap();
        let msg = Message::from_digest(sighash.to_byte_array());
        secp.verify_ecdsa(&msg, &sig, &key(1).public_key(&secp).inner).unwrap();
    }

    #[test]
    fn p2pkh_fills_script_sig_only() {
        let secp = Secp256k1::new();
        let descriptor = descriptor_for(ScriptType::P2pkh, key(2), 8_000);
        let tx = unsigned_spending(std::slice::from_ref(&descriptor));
        let signed = sign_and_finalize(tx, std::slice::from_ref(&descriptor), &[key(2)], &secp).unwrap();

        let input = &signed.transaction.input[0];
        assert!(input.witness.is_empty());
        let pushes: Vec<_> = input.script_sig.instructions().collect::<Result<_, _>>().unwrap();
        assert_eq!(pushes.len(), 2);
        // レガシーのみなので vsize はバイト長と等しい
        assert_eq!(signed.virtual_size, signed.hex.len() / 2);
    }

    #[test]
    fn p2sh_p2wpkh_reveals_redeem_script() {
        let secp = Secp256k1::new();
        let descriptor = descriptor_for(ScriptType::P2shP2wpkh, key(3), 8_000);
        let redeem = descriptor.redeem_script.clone().unwrap();
        let tx = unsigned_spending(std::slice::from_ref(&descriptor));
        let signed = sign_and_finalize(tx, std::slice::from_ref(&descriptor), &[key(3)], &secp).unwrap();

        let input = &signed.transaction.input[0];
        assert_eq!(input.witness.len(), 2);
        let expected_sig = Builder::new().push_slice(PushBytesBuf::try_from(redeem.to_bytes()).unwrap()).into_script();
        assert_eq!(input.script_sig, expected_sig);
        assert!(signed.virtual_size < signed.hex.len() / 2);
    }

    #[test]
    fn wrong_key_is_signing_error() {
        let secp = Secp256k1::new();
        for script_type in [ScriptType::P2wpkh, ScriptType::P2pkh, ScriptType::P2shP2wpkh] {
            let descriptor = descriptor_for(script_type, key(4), 8_000);
            let tx = unsigned_spending(std::slice::from_ref(&descriptor));
            let err = sign_and_finalize(tx, std::slice::from_ref(&descriptor), &[key(5)], &secp).unwrap_err();
            assert!(matches!(err, AppError::Signing { input_index: 0, .. }), "{:?}", script_type);
        }
    }

    #[test]
    fn key_count_must_match_inputs() {
        let secp = Secp256k1::new();
        let descriptor = descriptor_for(ScriptType::P2wpkh, key(1), 5_000);
        let tx = unsigned_spending(std::slice::from_ref(&descriptor));
        let err = sign_and_finalize(tx, std::slice::from_ref(&descriptor), &[], &secp).unwrap_err();
        assert!(matches!(err, AppError::Signing { .. }));
    }
}
