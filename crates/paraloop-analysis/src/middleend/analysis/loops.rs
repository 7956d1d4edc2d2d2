// ループ解析
//
// 後方辺（後続ブロックが自分を支配する辺）から自然ループを求め、
// 同じヘッダを持つループは一つにまとめます。

use std::collections::{BTreeMap, BTreeSet};

use super::cfg::ControlFlowGraph;
use super::dominator::DominatorTree;
use crate::middleend::ir::BlockId;

/// 自然ループ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loop {
    /// ループヘッダ
    pub header: Option<BlockId>,
    /// プリヘッダ（ループ外からの唯一の入口で、後続がヘッダだけのブロック）
    pub preheader: Option<BlockId>,
    /// ループ本体のブロック（関数内の順序）
    pub blocks: Vec<BlockId>,
    /// ヘッダへ戻る辺の始点
    pub latches: Vec<BlockId>,
    /// 外側のループ
    pub parent: Option<usize>,
    /// 内側のループ
    pub children: Vec<usize>,
    /// ネストの深さ（最外ループが1）
    pub depth: u32,
}

impl Loop {
    /// ホストが列挙したループから作成
    pub fn new(header: Option<BlockId>, preheader: Option<BlockId>, blocks: Vec<BlockId>) -> Self {
        Self {
            header,
            preheader,
            blocks,
            latches: Vec::new(),
            parent: None,
            children: Vec::new(),
            depth: 1,
        }
    }

    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }
}

/// 関数内のループ情報
#[derive(Debug, Clone, Default)]
pub struct LoopInfo {
    /// ヘッダの順に並んだループ
    loops: Vec<Loop>,
}

impl LoopInfo {
    /// ループ情報を計算
    pub fn compute(cfg: &ControlFlowGraph, dom: &DominatorTree) -> Self {
        // ヘッダごとに後方辺の始点を集める
        let mut latches: BTreeMap<BlockId, Vec<BlockId>> = BTreeMap::new();
        for &block in cfg.reverse_post_order() {
            for &succ in cfg.successors(block) {
                if dom.dominates(succ, block) {
                    latches.entry(succ).or_default().push(block);
                }
            }
        }

        let mut loops: Vec<Loop> = latches
            .into_iter()
            .map(|(header, latches)| Self::natural_loop(cfg, header, latches))
            .collect();

        Self::compute_nesting(&mut loops);
        Self { loops }
    }

    /// 後方辺の始点から逆向きにたどってループ本体を求める
    fn natural_loop(cfg: &ControlFlowGraph, header: BlockId, latches: Vec<BlockId>) -> Loop {
        let mut body = BTreeSet::new();
        body.insert(header);
        let mut worklist: Vec<BlockId> = latches.clone();
        while let Some(block) = worklist.pop() {
            if body.insert(block) {
                worklist.extend(
                    cfg.predecessors(block)
                        .iter()
                        .copied()
                        .filter(|p| cfg.is_reachable(*p)),
                );
            }
        }

        // ループ外の先行ブロックがちょうど一つで、その後続がヘッダだけならプリヘッダ
        let outside: Vec<BlockId> = cfg
            .predecessors(header)
            .iter()
            .copied()
            .filter(|p| !body.contains(p) && cfg.is_reachable(*p))
            .collect();
        let preheader = match outside.as_slice() {
            [single] if cfg.successors(*single) == [header] => Some(*single),
            _ => None,
        };

        Loop {
            header: Some(header),
            preheader,
            blocks: body.into_iter().collect(),
            latches,
            parent: None,
            children: Vec::new(),
            depth: 1,
        }
    }

    fn compute_nesting(loops: &mut [Loop]) {
        let n = loops.len();
        for i in 0..n {
            let header = match loops[i].header {
                Some(header) => header,
                None => continue,
            };
            // ヘッダを含む最小の他ループが親
            let parent = (0..n)
                .filter(|&j| j != i && loops[j].contains(header))
                .min_by_key(|&j| loops[j].blocks.len());
            if let Some(parent) = parent {
                loops[i].parent = Some(parent);
                loops[parent].children.push(i);
            }
        }

        for i in 0..n {
            let mut depth = 1;
            let mut current = loops[i].parent;
            while let Some(parent) = current {
                depth += 1;
                current = loops[parent].parent;
            }
            loops[i].depth = depth;
        }
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// 最外ループを関数内の順序で返す
    pub fn top_level(&self) -> impl Iterator<Item = &Loop> {
        self.loops.iter().filter(|l| l.parent.is_none())
    }

    /// すべてのループを外側から内側の順で返す
    pub fn all(&self) -> Vec<&Loop> {
        let mut order = Vec::with_capacity(self.loops.len());
        let mut stack: Vec<usize> = (0..self.loops.len())
            .rev()
            .filter(|&i| self.loops[i].parent.is_none())
            .collect();
        while let Some(i) = stack.pop() {
            order.push(&self.loops[i]);
            stack.extend(self.loops[i].children.iter().rev().copied());
        }
        order
    }

    /// ブロックを含む最も内側のループの深さ（ループ外なら0）
    pub fn loop_depth(&self, block: BlockId) -> u32 {
        self.loops
            .iter()
            .filter(|l| l.contains(block))
            .map(|l| l.depth)
            .max()
            .unwrap_or(0)
    }
}
