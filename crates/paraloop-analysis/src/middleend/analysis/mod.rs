// ParaLoop 解析モジュール
// 並列化判定が利用する制御フロー・支配関係・ループの各解析を提供します。

pub mod cfg;
pub mod dominator;
pub mod loops;

pub use cfg::ControlFlowGraph;
pub use dominator::{DominanceInfo, DominatorTree};
pub use loops::{Loop, LoopInfo};

use crate::middleend::ir::Function;

/// 関数単位の解析結果
#[derive(Debug, Clone)]
pub struct FunctionAnalyses {
    pub cfg: ControlFlowGraph,
    pub dominators: DominatorTree,
    pub loops: LoopInfo,
}

impl FunctionAnalyses {
    /// 関数の各解析を実行
    pub fn compute(function: &Function) -> Self {
        let cfg = ControlFlowGraph::build(function);
        let dominators = DominatorTree::build(&cfg);
        let loops = LoopInfo::compute(&cfg, &dominators);
        log::debug!(
            "関数 @{} の解析: ブロック数 {}, ループ数 {}",
            function.name,
            cfg.len(),
            loops.len()
        );
        Self {
            cfg,
            dominators,
            loops,
        }
    }
}
