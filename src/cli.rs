use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use bitcoin::Network as BitcoinNetwork;

use crate::config::ServiceConfig;
use crate::error::AppError;
use crate::strategy::ScriptType;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    /// トランザクション作成要求を記述したJSONファイルへのパス
    #[clap(short, long, value_parser)]
    pub input_file: PathBuf,

    /// 結果JSONを保存するファイルへのパス (省略時は標準出力のみ)
    #[clap(short, long, value_parser)]
    pub output_file: Option<PathBuf>,

    /// 使用するネットワーク ("bitcoin", "testnet", "regtest")
    #[clap(short, long, value_parser, default_value = "bitcoin")]
    pub network: String,

    /// 入力のスクリプト形式 (要求JSONの scriptType が優先)
    #[clap(short, long, value_enum, default_value_t = ScriptType::P2wpkh)]
    pub script_type: ScriptType,

    /// 前トランザクション取得に使うエクスプローラのベースURL
    #[clap(long, default_value = "https://blockchain.info")]
    pub explorer_url: String,

    /// ブロードキャストAPIのベースURL
    #[clap(long, default_value = "https://mempool.space/api")]
    pub broadcast_url: String,

    /// 外部呼び出し1回あたりのタイムアウト (秒)
    #[clap(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

impl CliArgs {
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            explorer_url: self.explorer_url.clone(),
            broadcast_url: self.broadcast_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

pub fn parse_network(network_str: &str) -> Result<BitcoinNetwork, AppError> {
    match network_str.to_lowercase().as_str() {
        "bitcoin" | "mainnet" => Ok(BitcoinNetwork::Bitcoin),
        "testnet" => Ok(BitcoinNetwork::Testnet),
        "signet" => Ok(BitcoinNetwork::Signet),
        "regtest" => Ok(BitcoinNetwork::Regtest),
        s => Err(AppError::MalformedInput(format!("無効なネットワークが指定されました: {}", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_names() {
        assert_eq!(parse_network("Mainnet").unwrap(), BitcoinNetwork::Bitcoin);
        assert_eq!(parse_network("testnet").unwrap(), BitcoinNetwork::Testnet);
        assert!(parse_network("litecoin").is_err());
    }

    #[test]
    fn defaults() {
        let args = CliArgs::parse_from(["bitcoin-tx-builder", "-i", "req.json"]);
        assert_eq!(args.script_type, ScriptType::P2wpkh);
        assert_eq!(args.network, "bitcoin");
        assert!(args.output_file.is_none());
        assert_eq!(args.service_config().timeout, Duration::from_secs(30));
    }

    #[test]
    fn script_type_flag() {
        let args = CliArgs::parse_from(["bitcoin-tx-builder", "-i", "req.json", "-s", "p2sh-p2wpkh"]);
        assert_eq!(args.script_type, ScriptType::P2shP2wpkh);
    }
}
