// アクセス分類
//
// ループ前の定義の収集と、ループ本体での名前付き格納場所の読み書きの分類を行います。
// 格納場所は値ハンドルで識別し、名前は表示にだけ使います。名前のない格納場所は
// 追跡しません。

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::trace;

use super::array::ArrayTracker;
use super::report::UNKNOWN_LOCATION;
use crate::middleend::analysis::DominanceInfo;
use crate::middleend::ir::{BlockId, Function, InstKind, ValueId};

/// 名前付き格納場所の識別子（名前順、同名なら定義順）
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageKey {
    pub name: String,
    pub id: ValueId,
}

impl StorageKey {
    /// 名前を持つ値なら識別子を作る
    pub fn of(function: &Function, id: ValueId) -> Option<Self> {
        function.name_of(id).map(|name| Self {
            name: name.to_string(),
            id,
        })
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// 命令のソース位置を文字列で返す
pub fn location_string(function: &Function, id: ValueId) -> String {
    function
        .loc_of(id)
        .map(|loc| loc.to_string())
        .unwrap_or_else(|| UNKNOWN_LOCATION.to_string())
}

/// ループ前の定義とループ内の読み書き
#[derive(Debug, Clone, Default)]
pub struct AccessSet {
    /// ループ前に書き込まれる格納場所
    pub defined_before: BTreeSet<StorageKey>,
    /// ループ内で読み込まれる格納場所
    pub reads: BTreeSet<StorageKey>,
    /// ループ内で書き込まれる格納場所
    pub writes: BTreeSet<StorageKey>,
    /// 格納場所ごとの使用位置
    pub uses: BTreeMap<StorageKey, Vec<String>>,
}

impl AccessSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// プリヘッダを支配するブロックで書き込まれる格納場所を集める
    pub fn collect_defined_before(
        &mut self,
        function: &Function,
        preheader: BlockId,
        dom: &dyn DominanceInfo,
    ) {
        for block in function.block_ids() {
            if !dom.dominates(block, preheader) {
                continue;
            }
            for (_, inst) in function.instructions(block) {
                if let InstKind::Store { ptr, .. } = inst {
                    if matches!(function.inst(*ptr), Some(InstKind::ElementAddr { .. })) {
                        continue;
                    }
                    if let Some(key) = StorageKey::of(function, *ptr) {
                        self.defined_before.insert(key);
                    }
                }
            }
        }
    }

    /// ループ本体の読み書きを分類
    ///
    /// 誘導変数と、配列のアドレス計算に関わる格納場所は除外します。
    pub fn classify(
        &mut self,
        function: &Function,
        blocks: &[BlockId],
        induction_variable: ValueId,
        tracker: &ArrayTracker,
    ) {
        for &block in blocks {
            for (id, inst) in function.instructions(block) {
                let (ptr, is_write) = match inst {
                    InstKind::Load { ptr } => (*ptr, false),
                    InstKind::Store { ptr, .. } => (*ptr, true),
                    _ => continue,
                };
                if ptr == induction_variable
                    || tracker.is_address_computation(ptr)
                    || tracker.is_array_base(ptr)
                {
                    continue;
                }
                let key = match StorageKey::of(function, ptr) {
                    Some(key) => key,
                    None => continue,
                };

                trace!(
                    "{} {} ({})",
                    if is_write { "書き込み" } else { "読み込み" },
                    key,
                    function.format_instruction(id)
                );
                self.uses
                    .entry(key.clone())
                    .or_default()
                    .push(location_string(function, id));
                if is_write {
                    self.writes.insert(key);
                } else {
                    self.reads.insert(key);
                }
            }
        }
    }

    /// ループ前に定義され、ループ内で読み書きされる格納場所
    pub fn shared(&self) -> impl Iterator<Item = &StorageKey> {
        self.defined_before
            .iter()
            .filter(move |key| self.reads.contains(*key) && self.writes.contains(*key))
    }

    /// 使用位置
    pub fn locations(&self, key: &StorageKey) -> &[String] {
        self.uses.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// 表示用に名前の一覧へ変換
pub fn names(keys: &BTreeSet<StorageKey>) -> Vec<String> {
    keys.iter().map(|k| k.name.clone()).collect()
}
