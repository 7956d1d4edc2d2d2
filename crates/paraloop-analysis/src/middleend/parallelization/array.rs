// 配列/構造体インデックスの追跡
//
// 読み込み・書き込みの対象がアドレス計算（gep）である命令を見つけ、
// (インデックス式, ベース) の組を記録します。インデックスが誘導変数に
// 基づかないベースは別に記録します。

use std::collections::BTreeSet;

use log::debug;

use super::access::StorageKey;
use super::induction::is_induction_relative;
use crate::middleend::ir::{BinaryOp, BlockId, CastOp, Function, InstKind, ValueId, ValueKind};

/// 名前のないベースの表示名
pub const UNDEFINED_BASE: &str = "undefined";

/// ベースをたどる最大の深さ
const MAX_BASE_DEPTH: usize = 8;

/// 配列/構造体のベース
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArrayBase {
    /// 名前付き格納場所
    Named(StorageKey),
    /// 名前のない格納場所（すべて同じベースとして扱う）
    Undefined,
}

impl ArrayBase {
    pub fn name(&self) -> &str {
        match self {
            ArrayBase::Named(key) => &key.name,
            ArrayBase::Undefined => UNDEFINED_BASE,
        }
    }
}

/// 配列アクセスの記録
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayAccessRecord {
    /// インデックス式（最後のインデックス）
    pub index: Option<ValueId>,
    pub base: ArrayBase,
    /// 読み込み/書き込み命令
    pub access: ValueId,
}

/// ループ本体の配列アクセス
#[derive(Debug, Clone, Default)]
pub struct ArrayTracker {
    /// アドレス計算の結果
    address_computations: BTreeSet<ValueId>,
    /// 名前付きベースの格納場所
    base_locations: BTreeSet<ValueId>,
    pub reads: Vec<ArrayAccessRecord>,
    pub writes: Vec<ArrayAccessRecord>,
    /// 誘導変数に基づかない読み込みインデックスを持つベース
    pub irregular_reads: BTreeSet<ArrayBase>,
    /// 誘導変数に基づかない書き込みインデックスを持つベース
    pub irregular_writes: BTreeSet<ArrayBase>,
}

impl ArrayTracker {
    /// ループ本体の配列アクセスを追跡
    pub fn track(function: &Function, blocks: &[BlockId], induction_variable: ValueId) -> Self {
        let mut tracker = Self::default();
        for &block in blocks {
            for (id, inst) in function.instructions(block) {
                let (ptr, is_write) = match inst {
                    InstKind::Load { ptr } => (*ptr, false),
                    InstKind::Store { ptr, .. } => (*ptr, true),
                    _ => continue,
                };
                if let Some((addresses, base, index)) = element_address(function, ptr) {
                    tracker.record(function, addresses, base, index, id, is_write, induction_variable);
                }
            }
        }
        tracker
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &mut self,
        function: &Function,
        addresses: Vec<ValueId>,
        base: ValueId,
        index: Option<ValueId>,
        access: ValueId,
        is_write: bool,
        induction_variable: ValueId,
    ) {
        self.address_computations.extend(addresses);
        let base = resolve_base(function, base);
        if let ArrayBase::Named(key) = &base {
            self.base_locations.insert(key.id);
        }

        let regular = is_induction_relative(function, index, induction_variable);
        debug!(
            "配列{} {}[{}]{}",
            if is_write { "書き込み" } else { "読み込み" },
            base.name(),
            describe_index(function, index),
            if regular { "" } else { " (不規則)" }
        );

        let record = ArrayAccessRecord { index, base, access };
        if is_write {
            if !regular {
                self.irregular_writes.insert(record.base.clone());
            }
            self.writes.push(record);
        } else {
            if !regular {
                self.irregular_reads.insert(record.base.clone());
            }
            self.reads.push(record);
        }
    }

    /// アドレス計算の結果か
    pub fn is_address_computation(&self, value: ValueId) -> bool {
        self.address_computations.contains(&value)
    }

    /// 配列のベースとして使われた格納場所か
    pub fn is_array_base(&self, value: ValueId) -> bool {
        self.base_locations.contains(&value)
    }

    /// 読み書きされたすべてのベース
    pub fn bases(&self) -> BTreeSet<&ArrayBase> {
        self.reads
            .iter()
            .chain(self.writes.iter())
            .map(|r| &r.base)
            .collect()
    }
}

/// ポインタがアドレス計算なら (アドレス計算の値, ベース, 最後のインデックス) を返す
///
/// ビットキャストは透過的にたどります。
fn element_address(function: &Function, ptr: ValueId) -> Option<(Vec<ValueId>, ValueId, Option<ValueId>)> {
    let mut addresses = vec![ptr];
    let mut current = ptr;
    while let Some(InstKind::Cast {
        op: CastOp::BitCast,
        operand,
    }) = function.inst(current)
    {
        current = *operand;
        addresses.push(current);
    }
    match function.inst(current) {
        Some(InstKind::ElementAddr { base, indices }) => Some((addresses, *base, indices.last().copied())),
        _ => None,
    }
}

/// アドレス計算のベースから名前付き格納場所をたどる
///
/// キャスト、ポインタの読み込み（`%0 = load %a.addr`）、入れ子のアドレス計算を
/// たどり、名前のある値に着いたらそれをベースとします。
pub fn resolve_base(function: &Function, value: ValueId) -> ArrayBase {
    let mut current = value;
    for _ in 0..MAX_BASE_DEPTH {
        if let Some(key) = StorageKey::of(function, current) {
            return ArrayBase::Named(key);
        }
        current = match function.inst(current) {
            Some(InstKind::Cast { operand, .. }) => *operand,
            Some(InstKind::Load { ptr }) => *ptr,
            Some(InstKind::ElementAddr { base, .. }) => *base,
            _ => break,
        };
    }
    ArrayBase::Undefined
}

/// インデックス式を人が読める形にする
pub fn describe_index(function: &Function, index: Option<ValueId>) -> String {
    match index {
        Some(index) => describe(function, index, 0),
        None => "-".to_string(),
    }
}

fn describe(function: &Function, value: ValueId, depth: usize) -> String {
    if depth > 4 {
        return function.format_value(value);
    }
    match &function.value(value).kind {
        ValueKind::Inst(InstKind::Load { ptr }) if function.name_of(*ptr).is_some() => {
            function.format_value(*ptr)
        }
        ValueKind::Inst(InstKind::Cast { operand, .. }) => describe(function, *operand, depth + 1),
        ValueKind::Inst(InstKind::Binary { op, lhs, rhs }) => {
            let symbol = match op {
                BinaryOp::Add => "+",
                BinaryOp::Sub => "-",
                BinaryOp::Mul => "*",
                other => other.mnemonic(),
            };
            format!(
                "({} {} {})",
                describe(function, *lhs, depth + 1),
                symbol,
                describe(function, *rhs, depth + 1)
            )
        }
        _ => function.format_value(value),
    }
}
