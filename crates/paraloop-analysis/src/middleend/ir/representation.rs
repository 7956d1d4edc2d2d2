// ParaLoop IR表現モジュール
//
// ホストコンパイラから受け取る中間表現(IR)を定義します。
// 値と基本ブロックは関数ごとのアリーナに格納され、解析器は
// ハンドル（ValueId / BlockId）だけを保持します。解析器がノードを
// 所有したり変更したりすることはありません。

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

/// 値へのハンドル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(u32);

impl ValueId {
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// 基本ブロックへのハンドル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);

impl BlockId {
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// ソース位置情報（デバッグメタデータ）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DebugLoc {
    /// ディレクトリ
    pub directory: String,
    /// ファイル名
    pub file: String,
    /// 行番号
    pub line: u32,
}

impl DebugLoc {
    pub fn new(directory: impl Into<String>, file: impl Into<String>, line: u32) -> Self {
        Self {
            directory: directory.into(),
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for DebugLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.directory.is_empty() {
            write!(f, "{}:{}", self.file, self.line)
        } else {
            write!(
                f,
                "{}/{}:{}",
                self.directory.trim_end_matches('/'),
                self.file,
                self.line
            )
        }
    }
}

/// キャスト命令の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    /// 符号拡張
    SExt,
    /// ゼロ拡張
    ZExt,
    /// 切り詰め
    Trunc,
    /// ビットキャスト
    BitCast,
    /// 浮動小数点から符号付き整数へ
    FpToSi,
    /// 符号付き整数から浮動小数点へ
    SiToFp,
}

impl CastOp {
    /// 拡張キャスト（sext / zext）かどうか
    pub fn is_widening(self) -> bool {
        matches!(self, CastOp::SExt | CastOp::ZExt)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            CastOp::SExt => "sext",
            CastOp::ZExt => "zext",
            CastOp::Trunc => "trunc",
            CastOp::BitCast => "bitcast",
            CastOp::FpToSi => "fptosi",
            CastOp::SiToFp => "sitofp",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Self> {
        match s {
            "sext" => Some(CastOp::SExt),
            "zext" => Some(CastOp::ZExt),
            "trunc" => Some(CastOp::Trunc),
            "bitcast" => Some(CastOp::BitCast),
            "fptosi" => Some(CastOp::FpToSi),
            "sitofp" => Some(CastOp::SiToFp),
            _ => None,
        }
    }
}

/// 二項演算子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    FAdd,
    FSub,
    FMul,
    FDiv,
}

impl BinaryOp {
    /// 整数の加減算かどうか
    pub fn is_additive(self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Sub)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::SDiv => "sdiv",
            BinaryOp::UDiv => "udiv",
            BinaryOp::SRem => "srem",
            BinaryOp::URem => "urem",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::LShr => "lshr",
            BinaryOp::AShr => "ashr",
            BinaryOp::FAdd => "fadd",
            BinaryOp::FSub => "fsub",
            BinaryOp::FMul => "fmul",
            BinaryOp::FDiv => "fdiv",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Self> {
        let op = match s {
            "add" => BinaryOp::Add,
            "sub" => BinaryOp::Sub,
            "mul" => BinaryOp::Mul,
            "sdiv" => BinaryOp::SDiv,
            "udiv" => BinaryOp::UDiv,
            "srem" => BinaryOp::SRem,
            "urem" => BinaryOp::URem,
            "and" => BinaryOp::And,
            "or" => BinaryOp::Or,
            "xor" => BinaryOp::Xor,
            "shl" => BinaryOp::Shl,
            "lshr" => BinaryOp::LShr,
            "ashr" => BinaryOp::AShr,
            "fadd" => BinaryOp::FAdd,
            "fsub" => BinaryOp::FSub,
            "fmul" => BinaryOp::FMul,
            "fdiv" => BinaryOp::FDiv,
            _ => return None,
        };
        Some(op)
    }
}

/// 命令の操作種別（構造的等価性の比較に使用）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Opcode {
    Alloca,
    Load,
    Store,
    ElementAddr,
    Call,
    Cast(CastOp),
    Binary(BinaryOp),
    ICmp,
    FCmp,
    Phi,
    Br,
    Ret,
    Other(String),
}

/// 命令
///
/// 解析器が関心を持つ操作だけを列挙した閉じた列挙型です。
/// それ以外の命令は `Other` として保持されます。
#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    /// スタック領域の確保（名前付き格納場所）
    Alloca,
    /// メモリ読み込み
    Load { ptr: ValueId },
    /// メモリ書き込み
    Store { value: ValueId, ptr: ValueId },
    /// 配列要素/構造体フィールドのアドレス計算
    ElementAddr { base: ValueId, indices: Vec<ValueId> },
    /// 関数呼び出し
    Call { callee: ValueId, args: Vec<ValueId> },
    /// 型キャスト
    Cast { op: CastOp, operand: ValueId },
    /// 二項演算
    Binary { op: BinaryOp, lhs: ValueId, rhs: ValueId },
    /// 比較
    Cmp {
        float: bool,
        predicate: String,
        lhs: ValueId,
        rhs: ValueId,
    },
    /// ファイ関数
    Phi { incoming: Vec<(ValueId, BlockId)> },
    /// 無条件分岐
    Br { target: BlockId },
    /// 条件分岐
    CondBr {
        cond: ValueId,
        then_bb: BlockId,
        else_bb: BlockId,
    },
    /// 関数からの戻り
    Ret { value: Option<ValueId> },
    /// その他の命令
    Other { mnemonic: String, operands: Vec<ValueId> },
}

impl InstKind {
    /// 操作種別
    pub fn opcode(&self) -> Opcode {
        match self {
            InstKind::Alloca => Opcode::Alloca,
            InstKind::Load { .. } => Opcode::Load,
            InstKind::Store { .. } => Opcode::Store,
            InstKind::ElementAddr { .. } => Opcode::ElementAddr,
            InstKind::Call { .. } => Opcode::Call,
            InstKind::Cast { op, .. } => Opcode::Cast(*op),
            InstKind::Binary { op, .. } => Opcode::Binary(*op),
            InstKind::Cmp { float: false, .. } => Opcode::ICmp,
            InstKind::Cmp { float: true, .. } => Opcode::FCmp,
            InstKind::Phi { .. } => Opcode::Phi,
            InstKind::Br { .. } | InstKind::CondBr { .. } => Opcode::Br,
            InstKind::Ret { .. } => Opcode::Ret,
            InstKind::Other { mnemonic, .. } => Opcode::Other(mnemonic.clone()),
        }
    }

    /// オペランド（値のみ。ブロック参照は含まない）
    ///
    /// 呼び出し命令では呼び出し先が最後のオペランドになります。
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            InstKind::Alloca | InstKind::Br { .. } => Vec::new(),
            InstKind::Load { ptr } => vec![*ptr],
            InstKind::Store { value, ptr } => vec![*value, *ptr],
            InstKind::ElementAddr { base, indices } => {
                let mut ops = Vec::with_capacity(indices.len() + 1);
                ops.push(*base);
                ops.extend(indices.iter().copied());
                ops
            }
            InstKind::Call { callee, args } => {
                let mut ops = args.clone();
                ops.push(*callee);
                ops
            }
            InstKind::Cast { operand, .. } => vec![*operand],
            InstKind::Binary { lhs, rhs, .. } | InstKind::Cmp { lhs, rhs, .. } => vec![*lhs, *rhs],
            InstKind::Phi { incoming } => incoming.iter().map(|(v, _)| *v).collect(),
            InstKind::CondBr { cond, .. } => vec![*cond],
            InstKind::Ret { value } => value.iter().copied().collect(),
            InstKind::Other { operands, .. } => operands.clone(),
        }
    }

    /// 終端命令かどうか
    pub fn is_terminator(&self) -> bool {
        matches!(self, InstKind::Br { .. } | InstKind::CondBr { .. } | InstKind::Ret { .. })
    }

    /// 後続ブロック
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            InstKind::Br { target } => vec![*target],
            InstKind::CondBr { then_bb, else_bb, .. } => {
                if then_bb == else_bb {
                    vec![*then_bb]
                } else {
                    vec![*then_bb, *else_bb]
                }
            }
            _ => Vec::new(),
        }
    }

    /// 結果値を生成する命令かどうか
    pub fn produces_value(&self) -> bool {
        !matches!(
            self,
            InstKind::Store { .. } | InstKind::Br { .. } | InstKind::CondBr { .. } | InstKind::Ret { .. }
        )
    }
}

/// 値の種類
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    /// 関数引数
    Argument,
    /// グローバル変数（名前付き格納場所）
    Global,
    /// 関数参照（呼び出し先）
    Function,
    /// 整数定数
    ConstInt(i64),
    /// 浮動小数点定数（ビット表現）
    ConstFloat(u64),
    /// 未定義値
    Undef,
    /// 命令
    Inst(InstKind),
}

/// IR値
#[derive(Debug, Clone)]
pub struct Value {
    /// 安定した名前（無名値は None）
    pub name: Option<String>,
    /// 値の種類
    pub kind: ValueKind,
    /// 命令が属するブロック
    pub block: Option<BlockId>,
    /// ソース位置
    pub loc: Option<DebugLoc>,
}

impl Value {
    pub fn new(name: Option<String>, kind: ValueKind) -> Self {
        Self {
            name,
            kind,
            block: None,
            loc: None,
        }
    }

    /// 命令であればその内容を返す
    pub fn inst(&self) -> Option<&InstKind> {
        match &self.kind {
            ValueKind::Inst(inst) => Some(inst),
            _ => None,
        }
    }

    pub fn is_instruction(&self) -> bool {
        matches!(self.kind, ValueKind::Inst(_))
    }
}

/// 名前が安定した名前として扱えるか
///
/// `%0` のような数字だけの名前は無名値の番号であり、名前を持たない値として扱います。
pub fn is_stable_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().all(|c| c.is_ascii_digit())
}

/// 名前を正規化する（無名なら None）
pub fn stable_name(name: &str) -> Option<String> {
    if is_stable_name(name) {
        Some(name.to_string())
    } else {
        None
    }
}

/// 基本ブロック
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// ブロックのラベル
    pub name: String,
    /// 命令リスト
    pub instructions: Vec<ValueId>,
}

impl BasicBlock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn first_instruction(&self) -> Option<ValueId> {
        self.instructions.first().copied()
    }
}

/// 定数・参照の共有キー
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum InternKey {
    Int(i64),
    Float(u64),
    Undef,
    Global(String),
    Function(String),
}

/// 関数
///
/// 値と基本ブロックのアリーナです。定数・グローバル参照・関数参照は
/// 関数内で共有されるため、同じ定数は同じハンドルになります。
#[derive(Debug, Clone)]
pub struct Function {
    /// 関数名
    pub name: String,
    /// 引数
    pub params: Vec<ValueId>,
    /// 基本ブロック（先頭がエントリーブロック）
    pub blocks: Vec<BasicBlock>,
    values: Vec<Value>,
    interned: HashMap<InternKey, ValueId>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            blocks: Vec::new(),
            values: Vec::new(),
            interned: HashMap::new(),
        }
    }

    /// 値を取得
    ///
    /// ハンドルはこの関数が発行したものでなければなりません。
    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.index()]
    }

    /// 命令であればその内容を返す
    pub fn inst(&self, id: ValueId) -> Option<&InstKind> {
        self.values.get(id.index()).and_then(Value::inst)
    }

    /// 安定した名前を返す
    pub fn name_of(&self, id: ValueId) -> Option<&str> {
        self.values.get(id.index()).and_then(|v| v.name.as_deref())
    }

    /// ソース位置を返す
    pub fn loc_of(&self, id: ValueId) -> Option<&DebugLoc> {
        self.values.get(id.index()).and_then(|v| v.loc.as_ref())
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len()).map(BlockId::new)
    }

    pub fn block_by_name(&self, name: &str) -> Option<BlockId> {
        self.blocks
            .iter()
            .position(|b| b.name == name)
            .map(BlockId::new)
    }

    /// エントリーブロック
    pub fn entry(&self) -> Option<BlockId> {
        if self.blocks.is_empty() {
            None
        } else {
            Some(BlockId::new(0))
        }
    }

    /// ブロック内の命令を順に返す
    pub fn instructions(&self, block: BlockId) -> impl Iterator<Item = (ValueId, &InstKind)> + '_ {
        self.block(block)
            .instructions
            .iter()
            .filter_map(move |&id| self.inst(id).map(|inst| (id, inst)))
    }

    /// 終端命令
    pub fn terminator(&self, block: BlockId) -> Option<&InstKind> {
        self.block(block)
            .instructions
            .last()
            .and_then(|&id| self.inst(id))
            .filter(|inst| inst.is_terminator())
    }

    /// 後続ブロック
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.terminator(block)
            .map(InstKind::successors)
            .unwrap_or_default()
    }

    pub fn add_block(&mut self, name: impl Into<String>) -> BlockId {
        self.blocks.push(BasicBlock::new(name));
        BlockId::new(self.blocks.len() - 1)
    }

    /// 値をアリーナに追加
    pub fn push_value(&mut self, value: Value) -> ValueId {
        self.values.push(value);
        ValueId::new(self.values.len() - 1)
    }

    /// 引数を追加
    pub fn add_param(&mut self, name: &str) -> ValueId {
        let id = self.push_value(Value::new(stable_name(name), ValueKind::Argument));
        self.params.push(id);
        id
    }

    /// 命令を作成してブロック末尾に追加
    pub fn append_instruction(
        &mut self,
        block: BlockId,
        name: Option<String>,
        kind: InstKind,
        loc: Option<DebugLoc>,
    ) -> ValueId {
        let id = self.push_value(Value::new(name, ValueKind::Inst(kind)));
        self.define_instruction(id, block, None, loc);
        id
    }

    /// 予約済みの値に命令を定義し、ブロック末尾に追加
    ///
    /// 前方参照を解決するために、パーサは先に値を予約してから定義します。
    pub fn define_instruction(
        &mut self,
        id: ValueId,
        block: BlockId,
        kind: Option<InstKind>,
        loc: Option<DebugLoc>,
    ) {
        let value = &mut self.values[id.index()];
        if let Some(kind) = kind {
            value.kind = ValueKind::Inst(kind);
        }
        value.block = Some(block);
        value.loc = loc;
        self.blocks[block.index()].instructions.push(id);
    }

    /// 命令の内容を置き換える（ファイ関数の入力追加などに使用）
    pub fn replace_instruction(&mut self, id: ValueId, kind: InstKind) {
        self.values[id.index()].kind = ValueKind::Inst(kind);
    }

    /// 後で定義する値を予約
    pub fn reserve_value(&mut self, name: Option<String>) -> ValueId {
        self.push_value(Value::new(name, ValueKind::Undef))
    }

    fn intern(&mut self, key: InternKey, name: Option<String>, kind: ValueKind) -> ValueId {
        if let Some(&id) = self.interned.get(&key) {
            return id;
        }
        let id = self.push_value(Value::new(name, kind));
        self.interned.insert(key, id);
        id
    }

    pub fn const_int(&mut self, value: i64) -> ValueId {
        self.intern(InternKey::Int(value), None, ValueKind::ConstInt(value))
    }

    pub fn const_float(&mut self, value: f64) -> ValueId {
        let bits = value.to_bits();
        self.intern(InternKey::Float(bits), None, ValueKind::ConstFloat(bits))
    }

    pub fn undef(&mut self) -> ValueId {
        self.intern(InternKey::Undef, None, ValueKind::Undef)
    }

    pub fn global(&mut self, name: &str) -> ValueId {
        self.intern(
            InternKey::Global(name.to_string()),
            stable_name(name),
            ValueKind::Global,
        )
    }

    pub fn function_ref(&mut self, name: &str) -> ValueId {
        self.intern(
            InternKey::Function(name.to_string()),
            Some(name.to_string()),
            ValueKind::Function,
        )
    }

    /// オペランドの表示
    pub fn format_value(&self, id: ValueId) -> String {
        let value = self.value(id);
        match (&value.kind, &value.name) {
            (ValueKind::ConstInt(v), _) => v.to_string(),
            (ValueKind::ConstFloat(bits), _) => format!("{:?}", f64::from_bits(*bits)),
            (ValueKind::Undef, None) => "undef".to_string(),
            (ValueKind::Global, Some(name)) | (ValueKind::Function, Some(name)) => format!("@{}", name),
            (_, Some(name)) => format!("%{}", name),
            (_, None) => format!("%{}", id.index()),
        }
    }

    /// 命令の表示（テキストIR形式）
    pub fn format_instruction(&self, id: ValueId) -> String {
        let value = self.value(id);
        let inst = match value.inst() {
            Some(inst) => inst,
            None => return self.format_value(id),
        };
        let v = |id: ValueId| self.format_value(id);
        let label = |b: BlockId| format!("label %{}", self.block(b).name);
        let body = match inst {
            InstKind::Alloca => "alloca".to_string(),
            InstKind::Load { ptr } => format!("load {}", v(*ptr)),
            InstKind::Store { value, ptr } => format!("store {}, {}", v(*value), v(*ptr)),
            InstKind::ElementAddr { base, indices } => {
                let mut s = format!("gep {}", v(*base));
                for idx in indices {
                    s.push_str(&format!(", {}", v(*idx)));
                }
                s
            }
            InstKind::Call { callee, args } => {
                let args: Vec<String> = args.iter().map(|a| v(*a)).collect();
                format!("call {}({})", v(*callee), args.join(", "))
            }
            InstKind::Cast { op, operand } => format!("{} {}", op.mnemonic(), v(*operand)),
            InstKind::Binary { op, lhs, rhs } => format!("{} {}, {}", op.mnemonic(), v(*lhs), v(*rhs)),
            InstKind::Cmp {
                float,
                predicate,
                lhs,
                rhs,
            } => format!(
                "{} {} {}, {}",
                if *float { "fcmp" } else { "icmp" },
                predicate,
                v(*lhs),
                v(*rhs)
            ),
            InstKind::Phi { incoming } => {
                let parts: Vec<String> = incoming
                    .iter()
                    .map(|(val, bb)| format!("[{}, %{}]", v(*val), self.block(*bb).name))
                    .collect();
                format!("phi {}", parts.join(", "))
            }
            InstKind::Br { target } => format!("br {}", label(*target)),
            InstKind::CondBr { cond, then_bb, else_bb } => {
                format!("br {}, {}, {}", v(*cond), label(*then_bb), label(*else_bb))
            }
            InstKind::Ret { value: Some(val) } => format!("ret {}", v(*val)),
            InstKind::Ret { value: None } => "ret".to_string(),
            InstKind::Other { mnemonic, operands } => {
                let ops: Vec<String> = operands.iter().map(|o| v(*o)).collect();
                format!("{} {}", mnemonic, ops.join(", ")).trim_end().to_string()
            }
        };

        let mut line = if inst.produces_value() {
            format!("{} = {}", self.format_value(id), body)
        } else {
            body
        };
        if let Some(loc) = &value.loc {
            line.push_str(&format!(" !dbg {}", loc.line));
        }
        line
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(|p| self.format_value(*p)).collect();
        writeln!(f, "define @{}({}) {{", self.name, params.join(", "))?;
        for block in &self.blocks {
            writeln!(f, "{}:", block.name)?;
            for &inst in &block.instructions {
                writeln!(f, "  {}", self.format_instruction(inst))?;
            }
        }
        write!(f, "}}")
    }
}

/// モジュール
#[derive(Debug, Clone, Default)]
pub struct Module {
    /// モジュール名
    pub name: String,
    /// ソースファイル名
    pub source_filename: Option<String>,
    /// ソースディレクトリ
    pub source_directory: Option<String>,
    /// 宣言されたグローバル変数
    pub globals: Vec<String>,
    /// 関数リスト（定義順）
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.push(function);
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.source_filename {
            writeln!(f, "source_filename = \"{}\"", file)?;
        }
        if let Some(dir) = &self.source_directory {
            writeln!(f, "source_directory = \"{}\"", dir)?;
        }
        for global in &self.globals {
            writeln!(f, "@{} = global", global)?;
        }
        for function in &self.functions {
            writeln!(f)?;
            writeln!(f, "{}", function)?;
        }
        Ok(())
    }
}
