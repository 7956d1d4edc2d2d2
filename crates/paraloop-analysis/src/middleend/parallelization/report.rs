// 並列化判定の結果データ
//
// ループごとの判定結果と、それを関数・モジュール単位にまとめた型です。
// JSON出力のために Serialize を、テキスト出力のために Display を実装します。

use std::fmt;

use serde::Serialize;

use crate::diagnostics::codes;

/// 位置情報がないときの表示
pub const UNKNOWN_LOCATION: &str = "unknown location";

/// ループをスキップした理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// プリヘッダがない
    MissingPreheader,
    /// ヘッダがない
    MissingHeader,
    /// ヘッダが空
    EmptyHeader,
    /// 誘導変数が見つからない
    NoInductionVariable,
}

impl SkipReason {
    /// 診断コード
    pub fn code(self) -> &'static str {
        match self {
            SkipReason::MissingPreheader => codes::MISSING_PREHEADER,
            SkipReason::MissingHeader => codes::MISSING_HEADER,
            SkipReason::EmptyHeader => codes::EMPTY_HEADER,
            SkipReason::NoInductionVariable => codes::NO_INDUCTION_VARIABLE,
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingPreheader => write!(f, "プリヘッダがないためスキップしました"),
            SkipReason::MissingHeader => write!(f, "ヘッダがないためスキップしました"),
            SkipReason::EmptyHeader => write!(f, "ヘッダが空のためスキップしました"),
            SkipReason::NoInductionVariable => write!(f, "誘導変数が見つかりません"),
        }
    }
}

/// ループの解析状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum LoopStatus {
    /// 解析済み
    Analyzed,
    /// スキップ
    Skipped(SkipReason),
}

/// 並列化を妨げる要因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Hazard {
    /// ループ前に定義され、ループ内で読み書きされる変数
    SharedVariable { name: String, locations: Vec<String> },
    /// 読み込みと書き込みでインデックス式が一致しない配列
    ArrayIndex {
        base: String,
        read_location: String,
        write_location: String,
        read_index: String,
        write_index: String,
    },
    /// 関数呼び出し
    Call { callee: String, location: String },
    /// 誘導変数に基づかない書き込みインデックス
    IrregularIndex { base: String, location: String },
}

impl Hazard {
    /// 診断コード
    pub fn code(&self) -> &'static str {
        match self {
            Hazard::SharedVariable { .. } => codes::SHARED_VARIABLE,
            Hazard::ArrayIndex { .. } => codes::ARRAY_INDEX,
            Hazard::Call { .. } => codes::CALL,
            Hazard::IrregularIndex { .. } => codes::IRREGULAR_INDEX,
        }
    }

    /// 診断に付ける代表位置
    pub fn location(&self) -> Option<&str> {
        match self {
            Hazard::SharedVariable { locations, .. } => locations.first().map(String::as_str),
            Hazard::ArrayIndex { write_location, .. } => Some(write_location),
            Hazard::Call { location, .. } | Hazard::IrregularIndex { location, .. } => Some(location),
        }
    }
}

impl fmt::Display for Hazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hazard::SharedVariable { name, locations } => {
                write!(
                    f,
                    "共有変数 '{}' はループ前に定義され、ループ内で読み書きされています",
                    name
                )?;
                if !locations.is_empty() {
                    write!(f, " [{}]", locations.join(", "))?;
                }
                Ok(())
            }
            Hazard::ArrayIndex {
                base,
                read_location,
                write_location,
                read_index,
                write_index,
            } => write!(
                f,
                "配列 '{}' の読み込みインデックス {} ({}) と書き込みインデックス {} ({}) が一致しません",
                base, read_index, read_location, write_index, write_location
            ),
            Hazard::Call { callee, location } => {
                write!(f, "関数 '{}' を呼び出しています ({})", callee, location)
            }
            Hazard::IrregularIndex { base, location } => write!(
                f,
                "配列 '{}' への書き込みインデックスが誘導変数に基づいていません ({})",
                base, location
            ),
        }
    }
}

/// 配列アクセスの記録（表示用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArrayAccess {
    /// ベースの名前
    pub base: String,
    /// インデックス式
    pub index: String,
    /// ソース位置
    pub location: String,
}

/// ループごとの判定結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopReport {
    /// ループの位置（"<ディレクトリ>/<ファイル>:<行>"）
    pub location: String,
    /// ヘッダブロックの名前
    pub header: Option<String>,
    /// 誘導変数の名前
    pub induction_variable: Option<String>,
    pub status: LoopStatus,
    /// ループ内で読み込まれる変数
    pub reads: Vec<String>,
    /// ループ内で書き込まれる変数
    pub writes: Vec<String>,
    /// ループ前に定義される変数
    pub defined_before: Vec<String>,
    pub array_reads: Vec<ArrayAccess>,
    pub array_writes: Vec<ArrayAccess>,
    pub irregular_read_bases: Vec<String>,
    pub irregular_write_bases: Vec<String>,
    /// インデックスが一致しない配列
    pub array_hazards: Vec<String>,
    pub hazards: Vec<Hazard>,
    /// 並列化可能か
    pub parallelizable: bool,
}

impl LoopReport {
    /// スキップしたループの結果
    pub fn skipped(location: String, header: Option<String>, reason: SkipReason) -> Self {
        Self {
            location,
            header,
            induction_variable: None,
            status: LoopStatus::Skipped(reason),
            reads: Vec::new(),
            writes: Vec::new(),
            defined_before: Vec::new(),
            array_reads: Vec::new(),
            array_writes: Vec::new(),
            irregular_read_bases: Vec::new(),
            irregular_write_bases: Vec::new(),
            array_hazards: Vec::new(),
            hazards: Vec::new(),
            parallelizable: false,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, LoopStatus::Skipped(_))
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self.status {
            LoopStatus::Skipped(reason) => Some(reason),
            LoopStatus::Analyzed => None,
        }
    }

    /// 解析した結果、並列化できないと判定されたか
    pub fn has_hazards(&self) -> bool {
        !self.hazards.is_empty()
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, label: &str, items: &[String]) -> fmt::Result {
    if items.is_empty() {
        writeln!(f, "    {}: -", label)
    } else {
        writeln!(f, "    {}: {}", label, items.join(", "))
    }
}

impl fmt::Display for LoopReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = self.header.as_deref().unwrap_or("?");
        writeln!(f, "  ループ {} (ヘッダ: {})", self.location, header)?;
        if let LoopStatus::Skipped(reason) = self.status {
            return writeln!(f, "    スキップ: {}", reason);
        }
        writeln!(
            f,
            "    誘導変数: {}",
            self.induction_variable.as_deref().unwrap_or("-")
        )?;
        write_list(f, "読み込み", &self.reads)?;
        write_list(f, "書き込み", &self.writes)?;
        write_list(f, "ループ前の定義", &self.defined_before)?;
        write_list(f, "インデックス不一致の配列", &self.array_hazards)?;
        for hazard in &self.hazards {
            writeln!(f, "    ハザード: {}", hazard)?;
        }
        writeln!(
            f,
            "    判定: {}",
            if self.parallelizable { "並列化可能" } else { "並列化不可" }
        )
    }
}

/// 関数ごとの結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionReport {
    pub function: String,
    pub loops: Vec<LoopReport>,
}

impl FunctionReport {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            loops: Vec::new(),
        }
    }

    /// すべてのループが解析され、並列化可能か
    pub fn all_parallelizable(&self) -> bool {
        self.loops.iter().all(|l| l.parallelizable)
    }

    /// ハザードが見つかったループがあるか
    pub fn has_hazards(&self) -> bool {
        self.loops.iter().any(LoopReport::has_hazards)
    }
}

impl fmt::Display for FunctionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "関数 @{} (ループ数: {})", self.function, self.loops.len())?;
        for l in &self.loops {
            write!(f, "{}", l)?;
        }
        Ok(())
    }
}

/// モジュール全体の結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleReport {
    pub module: String,
    pub functions: Vec<FunctionReport>,
}

impl ModuleReport {
    pub fn loops(&self) -> impl Iterator<Item = &LoopReport> {
        self.functions.iter().flat_map(|f| f.loops.iter())
    }

    pub fn loop_count(&self) -> usize {
        self.loops().count()
    }

    pub fn parallelizable_count(&self) -> usize {
        self.loops().filter(|l| l.parallelizable).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.loops().filter(|l| l.is_skipped()).count()
    }

    pub fn has_hazards(&self) -> bool {
        self.functions.iter().any(FunctionReport::has_hazards)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionReport> {
        self.functions.iter().find(|f| f.function == name)
    }

    /// 整形済みJSONに変換
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for ModuleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "モジュール {}", self.module)?;
        for function in &self.functions {
            write!(f, "{}", function)?;
        }
        write!(
            f,
            "ループ {} 個中 {} 個が並列化可能 (スキップ {} 個)",
            self.loop_count(),
            self.parallelizable_count(),
            self.skipped_count()
        )
    }
}
