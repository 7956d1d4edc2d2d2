// 制御フローグラフ
//
// ブロックの終端命令から後続/先行関係を作り、エントリーから到達可能な
// ブロックの逆後順（RPO）を計算します。

use crate::middleend::ir::{BlockId, Function};

/// 制御フローグラフ
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    successors: Vec<Vec<BlockId>>,
    predecessors: Vec<Vec<BlockId>>,
    entry: Option<BlockId>,
    /// 到達可能なブロックの逆後順
    rpo: Vec<BlockId>,
    /// ブロックごとのRPO番号（到達不能なら None）
    rpo_number: Vec<Option<usize>>,
}

impl ControlFlowGraph {
    /// 関数から制御フローグラフを構築
    pub fn build(function: &Function) -> Self {
        let n = function.blocks.len();
        let mut successors = Vec::with_capacity(n);
        let mut predecessors = vec![Vec::new(); n];

        for block in function.block_ids() {
            let succs = function.successors(block);
            for &succ in &succs {
                let preds: &mut Vec<BlockId> = &mut predecessors[succ.index()];
                if !preds.contains(&block) {
                    preds.push(block);
                }
            }
            successors.push(succs);
        }

        let mut cfg = Self {
            successors,
            predecessors,
            entry: function.entry(),
            rpo: Vec::new(),
            rpo_number: vec![None; n],
        };
        cfg.compute_rpo();
        cfg
    }

    /// 反復的な深さ優先探索で後順を求め、反転してRPOとする
    fn compute_rpo(&mut self) {
        let entry = match self.entry {
            Some(entry) => entry,
            None => return,
        };

        let mut visited = vec![false; self.successors.len()];
        let mut postorder = Vec::with_capacity(self.successors.len());
        let mut stack: Vec<(BlockId, usize)> = vec![(entry, 0)];
        visited[entry.index()] = true;

        while let Some((block, next)) = stack.last_mut() {
            let block = *block;
            if let Some(&succ) = self.successors[block.index()].get(*next) {
                *next += 1;
                if !visited[succ.index()] {
                    visited[succ.index()] = true;
                    stack.push((succ, 0));
                }
            } else {
                postorder.push(block);
                stack.pop();
            }
        }

        postorder.reverse();
        for (i, &block) in postorder.iter().enumerate() {
            self.rpo_number[block.index()] = Some(i);
        }
        self.rpo = postorder;
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.entry
    }

    pub fn len(&self) -> usize {
        self.successors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    pub fn successors(&self, block: BlockId) -> &[BlockId] {
        &self.successors[block.index()]
    }

    pub fn predecessors(&self, block: BlockId) -> &[BlockId] {
        &self.predecessors[block.index()]
    }

    /// 到達可能なブロックを逆後順で返す
    pub fn reverse_post_order(&self) -> &[BlockId] {
        &self.rpo
    }

    pub fn rpo_number(&self, block: BlockId) -> Option<usize> {
        self.rpo_number.get(block.index()).copied().flatten()
    }

    /// エントリーから到達可能か
    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.rpo_number(block).is_some()
    }
}
