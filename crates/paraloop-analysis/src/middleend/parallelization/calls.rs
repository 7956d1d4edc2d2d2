// 呼び出し監査
//
// ループ内の関数呼び出しは副作用を解析せず、すべて並列化を妨げるものとして扱います。

use log::debug;

use super::access::location_string;
use super::report::Hazard;
use crate::config::AnalysisConfig;
use crate::middleend::ir::{BlockId, Function, InstKind, ValueKind};

/// 呼び出し先の名前がない呼び出しの表示名
pub const INDIRECT_CALLEE: &str = "<indirect>";

/// ループ本体の呼び出しを検査
pub fn audit_calls(function: &Function, blocks: &[BlockId], config: &AnalysisConfig) -> Vec<Hazard> {
    let mut hazards = Vec::new();
    for &block in blocks {
        for (id, inst) in function.instructions(block) {
            let callee = match inst {
                InstKind::Call { callee, .. } => *callee,
                _ => continue,
            };

            let name = match (&function.value(callee).kind, function.name_of(callee)) {
                (ValueKind::Function, Some(name)) => {
                    if config.is_ignored_callee(name) {
                        debug!("呼び出し '{}' は無視されます", name);
                        continue;
                    }
                    name.to_string()
                }
                _ if config.flag_indirect_calls => INDIRECT_CALLEE.to_string(),
                _ => continue,
            };

            hazards.push(Hazard::Call {
                callee: name,
                location: location_string(function, id),
            });
        }
    }
    hazards
}
