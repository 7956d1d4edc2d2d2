// 支配木
//
// Cooper-Harvey-Kennedy の反復アルゴリズムで直接支配ブロックを計算します。
// 解析器は `DominanceInfo` トレイトだけに依存するため、ホスト側の支配関係を
// そのまま渡すこともできます。

use super::cfg::ControlFlowGraph;
use crate::middleend::ir::BlockId;

/// 支配関係の問い合わせ
pub trait DominanceInfo {
    /// `a` が `b` を支配するか（反射的）
    fn dominates(&self, a: BlockId, b: BlockId) -> bool;
}

/// 支配木
#[derive(Debug, Clone)]
pub struct DominatorTree {
    /// 直接支配ブロック（エントリーは自分自身、到達不能は None）
    idom: Vec<Option<BlockId>>,
    rpo_number: Vec<Option<usize>>,
    entry: Option<BlockId>,
}

impl DominatorTree {
    /// 支配木を構築
    pub fn build(cfg: &ControlFlowGraph) -> Self {
        let n = cfg.len();
        let mut tree = Self {
            idom: vec![None; n],
            rpo_number: (0..n).map(|i| cfg.rpo_number(BlockId::new(i))).collect(),
            entry: cfg.entry(),
        };

        let entry = match cfg.entry() {
            Some(entry) => entry,
            None => return tree,
        };
        tree.idom[entry.index()] = Some(entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in cfg.reverse_post_order() {
                if block == entry {
                    continue;
                }

                // 処理済みの先行ブロックから始めて交差を取る
                let mut new_idom: Option<BlockId> = None;
                for &pred in cfg.predecessors(block) {
                    if tree.idom[pred.index()].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => tree.intersect(pred, current),
                    });
                }

                if new_idom.is_some() && tree.idom[block.index()] != new_idom {
                    tree.idom[block.index()] = new_idom;
                    changed = true;
                }
            }
        }

        tree
    }

    fn rpo(&self, block: BlockId) -> usize {
        self.rpo_number[block.index()].unwrap_or(usize::MAX)
    }

    fn intersect(&self, mut a: BlockId, mut b: BlockId) -> BlockId {
        while a != b {
            while self.rpo(a) > self.rpo(b) {
                match self.idom[a.index()] {
                    Some(next) if next != a => a = next,
                    _ => return b,
                }
            }
            while self.rpo(b) > self.rpo(a) {
                match self.idom[b.index()] {
                    Some(next) if next != b => b = next,
                    _ => return a,
                }
            }
        }
        a
    }

    /// 直接支配ブロック（エントリーと到達不能ブロックは None）
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        if Some(block) == self.entry {
            return None;
        }
        self.idom.get(block.index()).copied().flatten()
    }

    /// `a` が `b` を支配するか
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if a == b {
            return true;
        }
        let mut current = b;
        while let Some(idom) = self.idom(current) {
            if idom == a {
                return true;
            }
            current = idom;
        }
        false
    }

    /// `a` が `b` を狭義に支配するか
    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.dominates(a, b)
    }
}

impl DominanceInfo for DominatorTree {
    fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        DominatorTree::dominates(self, a, b)
    }
}
