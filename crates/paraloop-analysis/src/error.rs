//! # エラー処理モジュール
//!
//! ParaLoopライブラリのエラー型です。
//! 解析そのものは失敗しません。エラーになるのはIRの読み込み、
//! 設定ファイルの読み込み、関数の検索だけです。

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// ParaLoopのエラー型
#[derive(Error, Debug)]
pub enum ParaLoopError {
    /// テキストIRの構文エラー
    #[error("構文解析エラー ({line}行目): {message}")]
    Parse {
        /// エラーが発生した行番号（1始まり）
        line: usize,
        /// エラーメッセージ
        message: String,
    },

    /// ファイル入出力エラー
    #[error("I/Oエラー: {} ({})", .source, .path.display())]
    Io {
        #[source]
        source: io::Error,
        /// 関連するファイルパス
        path: PathBuf,
    },

    /// 設定エラー
    #[error("設定エラー: {0}")]
    Config(String),

    /// 指定された関数が存在しない
    #[error("関数 '{0}' が見つかりません")]
    UnknownFunction(String),

    /// 正規表現の構築エラー
    #[error("内部エラー: {0}")]
    Pattern(#[from] regex::Error),
}

impl ParaLoopError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        ParaLoopError::Parse {
            line,
            message: message.into(),
        }
    }

    pub fn io(source: io::Error, path: impl Into<PathBuf>) -> Self {
        ParaLoopError::Io {
            source,
            path: path.into(),
        }
    }
}

/// ParaLoopの結果型
pub type Result<T> = std::result::Result<T, ParaLoopError>;
