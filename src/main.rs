use std::fs::{self, File};
use std::io::Write;
use std::process::ExitCode;

use bitcoin::secp256k1::All as AllContext;
use bitcoin::secp256k1::Secp256k1;
use clap::Parser;

use bitcoin_tx_builder::cli::{parse_network, CliArgs};
use bitcoin_tx_builder::config::InputConfig;
use bitcoin_tx_builder::explorer::{HttpBroadcaster, HttpExplorer};
use bitcoin_tx_builder::{build_request, create_and_sign_transaction, AppError, BuildOutcome};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args = CliArgs::parse();
    log::info!("アプリケーションを開始します。引数: {:?}", args);

    match run(&args).await {
        Ok(outcome) => {
            log::info!("処理が正常に完了しました。");
            println!("{}", serde_json::json!(outcome));
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("トランザクション作成に失敗しました ({}): {}", e.kind(), e);
            println!("{}", serde_json::json!({ "error": e.to_string() }));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &CliArgs) -> Result<BuildOutcome, AppError> {
    let cli_network = parse_network(&args.network)?;
    log::info!("指定されたネットワーク: {:?}", cli_network);

    let input_file_content = fs::read_to_string(&args.input_file).map_err(|e| {
        log::error!("入力ファイルの読み込みに失敗しました: {:?}", args.input_file);
        AppError::Io(e)
    })?;

    let config: InputConfig = serde_json::from_str(&input_file_content).map_err(|e| {
        log::error!("入力JSONのパースに失敗しました。");
        AppError::JsonParse {
            file_path: args.input_file.clone(),
            source: e,
        }
    })?;
    log::debug!("入力設定ファイルのパース成功: {:?}", config);

    let request = build_request(config, cli_network, args.script_type)?;

    let service_config = args.service_config();
    let explorer = HttpExplorer::new(&service_config)?;
    let broadcaster = HttpBroadcaster::new(&service_config)?;
    let secp: Secp256k1<AllContext> = Secp256k1::new();

    let outcome = create_and_sign_transaction(request, &explorer, &broadcaster, &secp).await?;

    if let Some(output_path) = &args.output_file {
        let mut output_file = File::create(output_path).map_err(|e| {
            log::error!("出力ファイルの作成に失敗しました: {:?}", output_path);
            AppError::Io(e)
        })?;
        output_file
            .write_all(serde_json::json!(outcome).to_string().as_bytes())
            .map_err(|e| {
                log::error!("出力ファイルへの書き込みに失敗しました。");
                AppError::Io(e)
            })?;
        log::info!("結果を {:?} に保存しました。", output_path);
    }

    Ok(outcome)
}
