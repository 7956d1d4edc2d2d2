// ParaLoop Analysis Library
// ループ並列化可能性の解析ライブラリ

//! # ParaLoop Analysis
//!
//! コンパイル済み関数の自然ループごとに、反復を並行に実行しても
//! 反復間のデータハザードが起きないかを判定するライブラリです。
//! ホストコンパイラの中間表現(IR)を読み取るだけで、書き換えは行いません。
//!
//! 判定は次の要素から構成されます。
//! - 誘導変数の特定
//! - 名前付き格納場所の読み書きの分類
//! - 誘導変数に対する配列インデックスの追跡
//! - インデックス式の構造的等価性の比較
//! - 関数呼び出しの監査

use log::info;

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod middleend;

// 再エクスポート
pub use self::config::AnalysisConfig;
pub use self::diagnostics::{Diagnostic, DiagnosticEmitter, DiagnosticLevel, DiagnosticSink};
pub use self::error::{ParaLoopError, Result};
pub use self::middleend::analysis::{DominanceInfo, FunctionAnalyses, Loop, LoopInfo};
pub use self::middleend::ir::{parse_file, parse_module, Function, FunctionBuilder, Module};
pub use self::middleend::parallelization::{
    analyze_loop, analyze_module, FunctionReport, Hazard, LoopParallelizationPass, LoopReport,
    LoopStatus, ModuleReport, PassResult, PreservedAnalyses, SkipReason,
};

/// ライブラリのバージョン
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 名前を指定して一つの関数だけを解析
pub fn analyze_function(
    module: &Module,
    name: &str,
    config: &AnalysisConfig,
    sink: &mut dyn DiagnosticSink,
) -> Result<FunctionReport> {
    let function = module
        .get_function(name)
        .ok_or_else(|| ParaLoopError::UnknownFunction(name.to_string()))?;
    let result = LoopParallelizationPass::new(config.clone()).run(function, sink);
    info!(
        "関数 @{} の解析完了: ループ {} 個",
        name,
        result.report.loops.len()
    );
    Ok(result.report)
}

/// ファイルを読み込んでモジュール全体を解析
pub fn analyze_file<P: AsRef<std::path::Path>>(
    path: P,
    config: &AnalysisConfig,
    sink: &mut dyn DiagnosticSink,
) -> Result<ModuleReport> {
    let module = parse_file(path)?;
    Ok(analyze_module(&module, config, sink))
}
