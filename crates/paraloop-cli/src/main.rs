/*
 * ParaLoop CLI - メインエントリーポイント
 *
 * テキストIRを読み込み、ループごとに反復の並列実行可能性を判定して
 * 結果を表示するコマンドラインツールです。
 */

use std::process;
use std::time::Instant;

use clap::Parser;
use env_logger::Builder;
use log::{debug, error};

mod cli;

fn main() {
    // コマンドライン引数の解析
    let cli = cli::Cli::parse();

    // ロギングの初期化（ログは標準エラー出力へ）
    let mut builder = Builder::new();
    builder.filter_level(cli::log_level(&cli));
    builder.format_timestamp(None);
    builder.init();

    debug!("ParaLoop v{} を起動しています", paraloop_analysis::VERSION);
    let start_time = Instant::now();

    let result = cli::run(&cli);
    debug!("処理時間: {:.3}秒", start_time.elapsed().as_secs_f64());

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            process::exit(2);
        }
    }
}
