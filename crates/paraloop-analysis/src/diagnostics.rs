//! 診断情報モジュール
//!
//! 解析結果の診断情報を収集し、ログへ転送するためのユーティリティを提供します。

use std::fmt;

use serde::Serialize;

/// 診断コード
pub mod codes {
    /// プリヘッダがないためループをスキップ
    pub const MISSING_PREHEADER: &str = "PL0001";
    /// ヘッダがないためループをスキップ
    pub const MISSING_HEADER: &str = "PL0002";
    /// ヘッダが空のためループをスキップ
    pub const EMPTY_HEADER: &str = "PL0003";
    /// 誘導変数が見つからないためループをスキップ
    pub const NO_INDUCTION_VARIABLE: &str = "PL0004";
    /// 共有変数ハザード
    pub const SHARED_VARIABLE: &str = "PL0101";
    /// 配列インデックスハザード
    pub const ARRAY_INDEX: &str = "PL0102";
    /// 関数呼び出しハザード
    pub const CALL: &str = "PL0103";
    /// 不規則インデックスハザード
    pub const IRREGULAR_INDEX: &str = "PL0104";
    /// 判定結果
    pub const VERDICT: &str = "PL0200";
}

/// 診断情報のレベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    /// エラー
    Error,
    /// 警告
    Warning,
    /// 情報
    Info,
    /// 注意
    Note,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticLevel::Error => write!(f, "エラー"),
            DiagnosticLevel::Warning => write!(f, "警告"),
            DiagnosticLevel::Info => write!(f, "情報"),
            DiagnosticLevel::Note => write!(f, "注意"),
        }
    }
}

/// 診断情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// レベル
    pub level: DiagnosticLevel,
    /// コード
    pub code: Option<String>,
    /// メッセージ
    pub message: String,
    /// ソース位置（"<ディレクトリ>/<ファイル>:<行>"）
    pub location: Option<String>,
}

impl Diagnostic {
    /// 新しい診断情報を作成
    pub fn new(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            code: None,
            message: message.into(),
            location: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Warning, message)
    }

    pub fn note(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Note, message)
    }

    /// コードを設定
    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }

    /// 位置を設定
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{}[{}]: {}", self.level, code, self.message)?,
            None => write!(f, "{}: {}", self.level, self.message)?,
        }
        if let Some(location) = &self.location {
            write!(f, " ({})", location)?;
        }
        Ok(())
    }
}

/// 診断情報の受け取り先
///
/// 解析器は診断情報を書き込むだけで、読み戻すことはありません。
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// 診断情報をそのまま溜めるバッファ（並列解析で関数ごとに使用）
impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// 診断情報エミッタ - 診断情報をログに出力しつつ収集する
#[derive(Debug, Default)]
pub struct DiagnosticEmitter {
    /// 診断情報
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticEmitter {
    /// 新しい診断エミッタを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 診断情報をログに出力
    pub fn emit(&self, diagnostic: &Diagnostic) {
        match diagnostic.level {
            DiagnosticLevel::Error => log::error!("{}", diagnostic),
            DiagnosticLevel::Warning => log::warn!("{}", diagnostic),
            DiagnosticLevel::Info => log::info!("{}", diagnostic),
            DiagnosticLevel::Note => log::debug!("{}", diagnostic),
        }
    }

    /// 診断情報を追加
    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// 診断情報を取得
    pub fn get_diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// 診断情報を取り出して空にする
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// エラーが存在するかどうか
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level == DiagnosticLevel::Error)
    }

    /// 警告が存在するかどうか
    pub fn has_warnings(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level == DiagnosticLevel::Warning)
    }

    /// 指定コードの診断情報の数
    pub fn count_code(&self, code: &str) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.code.as_deref() == Some(code))
            .count()
    }
}

impl DiagnosticSink for DiagnosticEmitter {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.emit(&diagnostic);
        self.add_diagnostic(diagnostic);
    }
}
