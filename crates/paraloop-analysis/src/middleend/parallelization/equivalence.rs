// 構造的等価性の比較
//
// 二つの式が「同じ操作・同じオペランド数・再帰的に等価なオペランド」を
// 持つかを構文的に判定します。ファイ関数の後方辺で式グラフが循環しても
// 停止するよう、比較中の組を記録し、再訪した組は等価とみなします。
// 比較を終えた組の結果は記録し、共有された部分式を二度比較しません。

use std::collections::HashMap;

use crate::middleend::ir::{Function, InstKind, ValueId};

/// 構造的等価性の比較器
pub struct EquivalenceComparator<'f> {
    function: &'f Function,
    /// 比較中の組と、その比較の深さ
    in_progress: HashMap<(ValueId, ValueId), usize>,
    /// 比較を終えた組の結果
    done: HashMap<(ValueId, ValueId), bool>,
    /// 直近の比較で再訪した比較中の組のうち、最も浅い深さ
    assumed: Option<usize>,
}

impl<'f> EquivalenceComparator<'f> {
    pub fn new(function: &'f Function) -> Self {
        Self {
            function,
            in_progress: HashMap::new(),
            done: HashMap::new(),
            assumed: None,
        }
    }

    /// 二つの式が構造的に等価か（どちらかが欠けていれば偽）
    pub fn equivalent(&mut self, a: Option<ValueId>, b: Option<ValueId>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => self.values_equivalent(a, b),
            _ => false,
        }
    }

    pub fn values_equivalent(&mut self, a: ValueId, b: ValueId) -> bool {
        if a == b {
            return true;
        }

        // 定数などの非命令値は同一の参照でなければ等価ではない
        let (inst_a, inst_b) = match (self.function.inst(a), self.function.inst(b)) {
            (Some(x), Some(y)) => (x, y),
            _ => return false,
        };

        if !same_operation(inst_a, inst_b) {
            return false;
        }
        let ops_a = inst_a.operands();
        let ops_b = inst_b.operands();
        if ops_a.len() != ops_b.len() {
            return false;
        }

        let pair = (a, b);
        if let Some(&known) = self.done.get(&pair) {
            return known;
        }
        if let Some(&depth) = self.in_progress.get(&pair) {
            self.assumed = Some(self.assumed.map_or(depth, |d| d.min(depth)));
            return true;
        }

        let depth = self.in_progress.len();
        self.in_progress.insert(pair, depth);
        let outer_assumed = self.assumed.take();
        let result = ops_a
            .iter()
            .zip(ops_b.iter())
            .all(|(&x, &y)| self.values_equivalent(x, y));
        self.in_progress.remove(&pair);

        // 外側の組を等価と仮定して得た真の結果は、その仮定が確定するまで記録しない
        let inner_assumed = self.assumed.filter(|&d| d < depth);
        if !result || inner_assumed.is_none() {
            self.done.insert(pair, result);
        }
        self.assumed = match (outer_assumed, inner_assumed) {
            (Some(x), Some(y)) => Some(x.min(y)),
            (x, y) => x.or(y),
        };

        log::trace!(
            "等価性: {} と {} => {}",
            self.function.format_value(a),
            self.function.format_value(b),
            result
        );
        result
    }
}

/// 操作種別が同じか（比較命令は述語も比べる）
fn same_operation(a: &InstKind, b: &InstKind) -> bool {
    match (a, b) {
        (InstKind::Cmp { predicate: pa, .. }, InstKind::Cmp { predicate: pb, .. }) => {
            a.opcode() == b.opcode() && pa == pb
        }
        _ => a.opcode() == b.opcode(),
    }
}

/// 二つの式が構造的に等価か
pub fn equivalent(function: &Function, a: Option<ValueId>, b: Option<ValueId>) -> bool {
    EquivalenceComparator::new(function).equivalent(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleend::ir::FunctionBuilder;

    #[test]
    fn test_identity_and_constants() {
        let mut b = FunctionBuilder::new("f");
        b.block("entry");
        let one = b.const_int(1);
        let two = b.const_int(2);
        let x = b.alloca("x");
        let f = b.finish();

        assert!(equivalent(&f, Some(x), Some(x)));
        assert!(equivalent(&f, Some(one), Some(one)));
        assert!(!equivalent(&f, Some(one), Some(two)));
        assert!(!equivalent(&f, Some(one), None));
        assert!(!equivalent(&f, None, None));
    }

    #[test]
    fn test_add_operand_order_matters() {
        let mut b = FunctionBuilder::new("f");
        b.block("entry");
        let i = b.alloca("i");
        let l1 = b.load(i, "");
        let l2 = b.load(i, "");
        let one = b.const_int(1);
        let a1 = b.add(l1, one, "a1");
        let a2 = b.add(l2, one, "a2");
        let swapped = b.add(one, l2, "a3");
        let sub = b.sub(l2, one, "s");
        let f = b.finish();

        // 別々の load でも同じ格納場所なら等価
        assert!(equivalent(&f, Some(l1), Some(l2)));
        assert!(equivalent(&f, Some(a1), Some(a2)));
        assert!(!equivalent(&f, Some(a1), Some(swapped)));
        assert!(!equivalent(&f, Some(a1), Some(sub)));
    }

    #[test]
    fn test_instruction_vs_constant() {
        let mut b = FunctionBuilder::new("f");
        b.block("entry");
        let i = b.alloca("i");
        let l = b.load(i, "");
        let zero = b.const_int(0);
        let f = b.finish();
        assert!(!equivalent(&f, Some(l), Some(zero)));
    }

    #[test]
    fn test_compare_predicate_matters() {
        let mut b = FunctionBuilder::new("f");
        b.block("entry");
        let x = b.param("x");
        let y = b.param("y");
        let lt = b.icmp("slt", x, y, "");
        let gt = b.icmp("sgt", x, y, "");
        let lt2 = b.icmp("slt", x, y, "");
        let f = b.finish();
        assert!(equivalent(&f, Some(lt), Some(lt2)));
        assert!(!equivalent(&f, Some(lt), Some(gt)));
    }

    #[test]
    fn test_cyclic_phi_graph_terminates() {
        // %a = phi [0, entry], [%a.next, loop]; %a.next = add %a, 1
        // %b も同じ形で別の循環を作る
        let mut b = FunctionBuilder::new("f");
        let entry = b.block("entry");
        let lp = b.create_block("loop");
        b.br(lp);
        b.position_at_end(lp);
        let zero = b.const_int(0);
        let one = b.const_int(1);
        let pa = b.phi(&[(zero, entry)], "a");
        let pb = b.phi(&[(zero, entry)], "b");
        let na = b.add(pa, one, "a.next");
        let nb = b.add(pb, one, "b.next");
        b.add_incoming(pa, na, lp);
        b.add_incoming(pb, nb, lp);
        let two = b.const_int(2);
        let nc = b.add(pb, two, "c.next");
        b.br(lp);
        let f = b.finish();

        assert!(equivalent(&f, Some(pa), Some(pb)));
        assert!(equivalent(&f, Some(na), Some(nb)));
        assert!(!equivalent(&f, Some(na), Some(nc)));
    }

    /// 同じ部分式を共有する深い式（x+x, (x+x)+(x+x), ...）
    fn doubling_chain(b: &mut FunctionBuilder, slot: ValueId, depth: usize) -> ValueId {
        let mut value = b.load(slot, "");
        for _ in 0..depth {
            value = b.add(value, value, "");
        }
        value
    }

    #[test]
    fn test_shared_subexpressions_are_compared_once() {
        let mut b = FunctionBuilder::new("f");
        b.block("entry");
        let x = b.alloca("x");
        let lhs = doubling_chain(&mut b, x, 64);
        let rhs = doubling_chain(&mut b, x, 64);
        let shorter = doubling_chain(&mut b, x, 63);
        let f = b.finish();

        let start = std::time::Instant::now();
        let mut cmp = EquivalenceComparator::new(&f);
        assert!(cmp.equivalent(Some(lhs), Some(rhs)));
        assert!(!cmp.equivalent(Some(lhs), Some(shorter)));
        assert!(
            start.elapsed() < std::time::Duration::from_secs(1),
            "比較に時間がかかりすぎています: {:?}",
            start.elapsed()
        );
    }

    #[test]
    fn test_reused_comparator_after_failed_cycle() {
        // %p = phi [%x, entry], [%p.next, loop]; %p.next = add %p, 1
        // %q = phi [%x, entry], [%q.next, loop]; %q.next = add %q, 2
        let mut b = FunctionBuilder::new("f");
        let entry = b.block("entry");
        let lp = b.create_block("loop");
        let x = b.param("x");
        b.br(lp);
        b.position_at_end(lp);
        let one = b.const_int(1);
        let two = b.const_int(2);
        let p = b.phi(&[(x, entry)], "p");
        let q = b.phi(&[(x, entry)], "q");
        let pn = b.add(p, one, "p.next");
        let qn = b.add(q, two, "q.next");
        b.add_incoming(p, pn, lp);
        b.add_incoming(q, qn, lp);
        b.br(lp);
        let f = b.finish();

        let mut cmp = EquivalenceComparator::new(&f);
        assert!(!cmp.equivalent(Some(p), Some(q)));
        assert!(!cmp.equivalent(Some(pn), Some(qn)));
        assert!(!cmp.equivalent(Some(p), Some(q)));
    }
}
