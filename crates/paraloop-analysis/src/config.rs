// 解析設定を管理するモジュール
// TOMLファイルから読み込み、CLIのフラグで上書きします

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ParaLoopError, Result};

/// ループ並列化解析の設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// 内側のループも解析する（既定では最外ループのみ）
    pub include_nested_loops: bool,

    /// 呼び出し監査で無視する関数名の接頭辞（既定では空で、すべての呼び出しを報告する）
    pub ignored_callees: Vec<String>,

    /// 呼び出し先の名前がない呼び出しも報告する
    pub flag_indirect_calls: bool,

    /// 誘導変数に基づかない書き込みインデックスをハザードとして報告する
    pub strict_indices: bool,

    /// 関数を並列に解析する
    pub parallel_functions: bool,

    /// 並列解析のスレッド数（未指定ならCPU数）
    pub threads: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            include_nested_loops: false,
            ignored_callees: Vec::new(),
            flag_indirect_calls: true,
            strict_indices: false,
            parallel_functions: false,
            threads: None,
        }
    }
}

impl AnalysisConfig {
    /// TOML文字列から設定を読み込む
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: AnalysisConfig = toml::from_str(source)
            .map_err(|e| ParaLoopError::Config(format!("TOMLの解析に失敗しました: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// ファイルから設定を読み込む
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ParaLoopError::io(e, path))?;
        Self::from_toml_str(&content)
    }

    /// TOML文字列に変換
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ParaLoopError::Config(format!("TOMLへの変換に失敗しました: {}", e)))
    }

    /// 設定値を検証
    pub fn validate(&self) -> Result<()> {
        if self.threads == Some(0) {
            return Err(ParaLoopError::Config("threads は1以上でなければなりません".to_string()));
        }
        Ok(())
    }

    /// 並列解析に使うスレッド数
    pub fn thread_count(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }

    /// 呼び出し先が監査対象外かどうか
    pub fn is_ignored_callee(&self, callee: &str) -> bool {
        self.ignored_callees
            .iter()
            .any(|prefix| callee.starts_with(prefix.as_str()))
    }
}
