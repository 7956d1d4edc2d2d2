/*
 * ParaLoop CLI - コマンドライン引数処理モジュール
 *
 * コマンドライン引数を解析し、解析ライブラリの呼び出しと
 * 結果の表示（テキスト/JSON）に変換します。
 */

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use log::{debug, info, warn, LevelFilter};

use paraloop_analysis::middleend::analysis::FunctionAnalyses;
use paraloop_analysis::{
    analyze_function, analyze_module, parse_file, AnalysisConfig, DiagnosticEmitter, Hazard, LoopReport,
    LoopStatus, Module, ModuleReport, VERSION,
};

/// 解析対象のテキストIRファイルの拡張子
const IR_EXTENSION: &str = "pir";

/// ループ並列化可能性の静的解析ツール
#[derive(Parser)]
#[command(name = "paraloop")]
#[command(author = "ParaLoop開発チーム")]
#[command(version = VERSION)]
#[command(about = "ループ反復を並列実行できるかを判定する静的解析器", long_about = None)]
pub struct Cli {
    /// 詳細なログ出力を有効にする
    #[arg(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    /// 不要な出力を抑制する
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,

    /// 色付き出力を無効にする
    #[arg(long, global = true, default_value = "false")]
    pub no_color: bool,

    /// サブコマンド
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// ループの並列化可能性を解析
    Analyze(AnalyzeArgs),

    /// 読み込んだIRとループ構造を表示
    Dump(DumpArgs),
}

/// 解析サブコマンドの引数
#[derive(Args)]
pub struct AnalyzeArgs {
    /// 入力ファイルまたはディレクトリ
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// 指定した関数だけを解析
    #[arg(short, long, value_name = "NAME")]
    pub function: Option<String>,

    /// 出力形式
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// 解析設定ファイルへのパス
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// 内側のループも解析する
    #[arg(long, default_value = "false")]
    pub nested: bool,

    /// 誘導変数に基づかない書き込みインデックスをハザードとして扱う
    #[arg(long, default_value = "false")]
    pub strict: bool,

    /// 関数を並列に解析するスレッド数（0はCPUコア数）
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// ハザードが見つかったら終了コード1で終了する（エラーは終了コード2）
    #[arg(long, default_value = "false")]
    pub deny_hazards: bool,
}

/// ダンプサブコマンドの引数
#[derive(Args)]
pub struct DumpArgs {
    /// 入力ファイル
    #[arg(required = true)]
    pub input: PathBuf,
}

/// 出力形式
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// 人が読むためのテキスト
    Text,
    /// JSON
    Json,
}

/// ログレベルを引数から決める
pub fn log_level(cli: &Cli) -> LevelFilter {
    if cli.verbose {
        LevelFilter::Debug
    } else if cli.quiet {
        LevelFilter::Error
    } else {
        LevelFilter::Warn
    }
}

/// コマンドを実行
///
/// 処理は成功したがハザードにより失敗扱いにすべき場合は `Ok(false)` を返します。
pub fn run(cli: &Cli) -> Result<bool> {
    if cli.no_color {
        colored::control::set_override(false);
    }

    match &cli.command {
        Commands::Analyze(args) => analyze(args, cli),
        Commands::Dump(args) => dump(args).map(|_| true),
    }
}

/// 設定ファイルとフラグから解析設定を組み立てる
fn build_config(args: &AnalyzeArgs) -> Result<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::from_file(path)
            .with_context(|| format!("設定ファイル {} を読み込めません", path.display()))?,
        None => AnalysisConfig::default(),
    };

    if args.nested {
        config.include_nested_loops = true;
    }
    if args.strict {
        config.strict_indices = true;
    }
    if let Some(jobs) = args.jobs {
        config.parallel_functions = true;
        config.threads = if jobs == 0 { None } else { Some(jobs) };
    }

    config.validate().context("解析設定が不正です")?;
    debug!("解析設定: {:?}", config);
    Ok(config)
}

/// 解析コマンドの処理
fn analyze(args: &AnalyzeArgs, cli: &Cli) -> Result<bool> {
    let config = build_config(args)?;
    let files = collect_input_files(&args.inputs)?;
    if files.is_empty() {
        return Err(anyhow::anyhow!(
            "解析対象の .{} ファイルが見つかりません",
            IR_EXTENSION
        ));
    }

    let mut reports = Vec::with_capacity(files.len());
    for file in &files {
        info!("解析中: {}", file.display());
        let module = load_module(file)?;
        let mut emitter = DiagnosticEmitter::new();

        let report = match &args.function {
            Some(name) => {
                let function = analyze_function(&module, name, &config, &mut emitter)
                    .with_context(|| format!("{} の解析に失敗しました", file.display()))?;
                ModuleReport {
                    module: module.name.clone(),
                    functions: vec![function],
                }
            }
            None => analyze_module(&module, &config, &mut emitter),
        };
        reports.push(report);
    }

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&reports).context("JSONへの変換に失敗しました")?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            for report in &reports {
                print!("{}", render_text(report));
            }
            if !cli.quiet {
                println!("{}", render_summary(&reports));
            }
        }
    }

    let hazardous = reports.iter().any(ModuleReport::has_hazards);
    if hazardous && args.deny_hazards {
        warn!("並列化できないループが見つかりました");
        return Ok(false);
    }
    Ok(true)
}

/// ダンプコマンドの処理
fn dump(args: &DumpArgs) -> Result<()> {
    let module = load_module(&args.input)?;
    print!("{}", module);

    for function in &module.functions {
        let analyses = FunctionAnalyses::compute(function);
        println!();
        println!("{} @{}", "ループ構造".bold(), function.name);
        if analyses.loops.is_empty() {
            println!("  (ループなし)");
            continue;
        }
        let block_name = |id| function.block(id).name.clone();
        for l in analyses.loops.all() {
            let indent = "  ".repeat(l.depth as usize);
            let header = l.header.map(block_name).unwrap_or_else(|| "?".to_string());
            let preheader = l
                .preheader
                .map(block_name)
                .unwrap_or_else(|| "なし".yellow().to_string());
            let blocks: Vec<String> = l.blocks.iter().map(|&b| block_name(b)).collect();
            println!(
                "{}ヘッダ {} / プリヘッダ {} / 深さ {} / ブロック [{}]",
                indent,
                header.cyan(),
                preheader,
                l.depth,
                blocks.join(", ")
            );
        }
    }
    Ok(())
}

/// ファイルを読み込んでモジュールを作成（モジュール名はファイル名）
fn load_module(path: &Path) -> Result<Module> {
    parse_file(path).with_context(|| format!("{} を読み込めません", path.display()))
}

/// 入力パスからIRファイルを収集
///
/// ファイルはそのまま、ディレクトリは再帰的にたどって拡張子の一致するものを集めます。
fn collect_input_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        if input.is_file() {
            files.push(input.clone());
        } else if input.is_dir() {
            let mut found: Vec<PathBuf> = walkdir::WalkDir::new(input)
                .follow_links(true)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.into_path())
                .filter(|path| path.is_file() && has_ir_extension(path))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            return Err(anyhow::anyhow!("入力 {} が存在しません", input.display()));
        }
    }

    Ok(files)
}

fn has_ir_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext == IR_EXTENSION)
        .unwrap_or(false)
}

/// 解析結果を色付きテキストにする
fn render_text(report: &ModuleReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} {}\n", "モジュール".bold(), report.module));
    for function in &report.functions {
        out.push_str(&format!(
            "  {} @{} (ループ数: {})\n",
            "関数".bold(),
            function.function,
            function.loops.len()
        ));
        for l in &function.loops {
            render_loop(&mut out, l);
        }
    }
    out
}

fn render_loop(out: &mut String, l: &LoopReport) {
    let verdict = match l.status {
        LoopStatus::Skipped(reason) => format!("{} ({})", "スキップ".yellow(), reason),
        LoopStatus::Analyzed if l.parallelizable => "並列化可能".green().to_string(),
        LoopStatus::Analyzed => "並列化不可".red().to_string(),
    };
    out.push_str(&format!("    ループ {}: {}\n", l.location, verdict));

    if let Some(iv) = &l.induction_variable {
        out.push_str(&format!("      誘導変数: {}\n", iv));
    }
    for hazard in &l.hazards {
        let code = format!("[{}]", hazard.code());
        out.push_str(&format!("      {} {}\n", code.red(), hazard_line(hazard)));
    }
}

fn hazard_line(hazard: &Hazard) -> String {
    match hazard.location() {
        Some(location) => format!("{} @ {}", hazard, location.dimmed()),
        None => hazard.to_string(),
    }
}

/// 全ファイルの集計行
fn render_summary(reports: &[ModuleReport]) -> String {
    let total: usize = reports.iter().map(ModuleReport::loop_count).sum();
    let parallel: usize = reports.iter().map(ModuleReport::parallelizable_count).sum();
    let skipped: usize = reports.iter().map(ModuleReport::skipped_count).sum();
    let blocked = total - parallel - skipped;
    format!(
        "ループ {} 個: {} / {} / {}",
        total,
        format!("並列化可能 {}", parallel).green(),
        format!("並列化不可 {}", blocked).red(),
        format!("スキップ {}", skipped).yellow()
    )
}
