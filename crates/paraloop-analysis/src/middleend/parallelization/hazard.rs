// ハザード検査
//
// 収集した読み書きと配列アクセスを組み合わせ、並列化を妨げる要因を求めます。

use std::collections::BTreeSet;

use super::access::{location_string, AccessSet};
use super::array::{describe_index, ArrayBase, ArrayTracker};
use super::equivalence::EquivalenceComparator;
use super::report::{Hazard, UNKNOWN_LOCATION};
use crate::middleend::ir::Function;

/// 共有変数の検査
///
/// ループ前に定義され、ループ内で読み込みと書き込みの両方がある格納場所を報告します。
pub fn check_shared_variables(access: &AccessSet) -> Vec<Hazard> {
    access
        .shared()
        .map(|key| Hazard::SharedVariable {
            name: key.name.clone(),
            locations: access.locations(key).to_vec(),
        })
        .collect()
}

/// 配列インデックスの検査
///
/// 同じベースを持つ読み込みと書き込みのすべての組について、インデックス式が
/// 構造的に等価でなければ報告します。
pub fn check_array_indices(
    function: &Function,
    tracker: &ArrayTracker,
) -> (Vec<Hazard>, BTreeSet<ArrayBase>) {
    let mut comparator = EquivalenceComparator::new(function);
    let mut hazards = Vec::new();
    let mut bases = BTreeSet::new();

    for read in &tracker.reads {
        for write in tracker.writes.iter().filter(|w| w.base == read.base) {
            if comparator.equivalent(read.index, write.index) {
                continue;
            }
            hazards.push(Hazard::ArrayIndex {
                base: read.base.name().to_string(),
                read_location: location_string(function, read.access),
                write_location: location_string(function, write.access),
                read_index: describe_index(function, read.index),
                write_index: describe_index(function, write.index),
            });
            bases.insert(read.base.clone());
        }
    }
    (hazards, bases)
}

/// 誘導変数に基づかない書き込みインデックスの検査
pub fn check_irregular_indices(function: &Function, tracker: &ArrayTracker) -> Vec<Hazard> {
    tracker
        .irregular_writes
        .iter()
        .map(|base| {
            let location = tracker
                .writes
                .iter()
                .find(|w| &w.base == base)
                .map(|w| location_string(function, w.access))
                .unwrap_or_else(|| UNKNOWN_LOCATION.to_string());
            Hazard::IrregularIndex {
                base: base.name().to_string(),
                location,
            }
        })
        .collect()
}
