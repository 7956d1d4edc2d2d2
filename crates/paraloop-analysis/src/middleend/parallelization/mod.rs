// ParaLoop ループ並列化判定パス
//
// 関数内の自然ループごとに、反復間のデータハザードがないかを判定します。
// IRは一切変更しません。判定結果はループごとに新しく作られ、ループ間で
// 共有される状態はありません。
//
// ループごとの処理の流れ:
//   誘導変数の特定 → {ループ前の定義, 配列アクセス, 読み書きの分類, 呼び出し監査}
//   → ハザード検査 → 判定と診断情報

pub mod access;
pub mod array;
pub mod calls;
pub mod equivalence;
pub mod hazard;
pub mod induction;
pub mod report;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::config::AnalysisConfig;
use crate::diagnostics::{codes, Diagnostic, DiagnosticSink};
use crate::middleend::analysis::{DominanceInfo, FunctionAnalyses, Loop};
use crate::middleend::ir::{Function, Module};

use self::access::{location_string, names, AccessSet};
use self::array::{describe_index, ArrayAccessRecord, ArrayBase, ArrayTracker};
use self::calls::audit_calls;
use self::hazard::{check_array_indices, check_irregular_indices, check_shared_variables};
use self::induction::find_induction_variable;
pub use self::report::{
    ArrayAccess, FunctionReport, Hazard, LoopReport, LoopStatus, ModuleReport, SkipReason,
    UNKNOWN_LOCATION,
};

/// パス実行後に保持される解析
///
/// このパスはIRを変更しないため、常にすべての解析が保持されます。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreservedAnalyses {
    all: bool,
}

impl PreservedAnalyses {
    pub fn all() -> Self {
        Self { all: true }
    }

    pub fn are_all_preserved(&self) -> bool {
        self.all
    }
}

/// パスの実行結果
#[derive(Debug, Clone)]
pub struct PassResult {
    pub report: FunctionReport,
    pub preserved: PreservedAnalyses,
}

/// ループの位置
///
/// プリヘッダの終端命令の位置、なければヘッダ内で最初に位置を持つ命令の位置を使います。
fn loop_location(function: &Function, lp: &Loop) -> String {
    let preheader_loc = lp
        .preheader
        .and_then(|pre| function.block(pre).instructions.last().copied())
        .and_then(|term| function.loc_of(term));
    let header_loc = || {
        lp.header.and_then(|header| {
            function
                .block(header)
                .instructions
                .iter()
                .find_map(|&id| function.loc_of(id))
        })
    };
    preheader_loc
        .or_else(header_loc)
        .map(|loc| loc.to_string())
        .unwrap_or_else(|| UNKNOWN_LOCATION.to_string())
}

fn array_accesses(function: &Function, records: &[ArrayAccessRecord]) -> Vec<ArrayAccess> {
    records
        .iter()
        .map(|r| ArrayAccess {
            base: r.base.name().to_string(),
            index: describe_index(function, r.index),
            location: location_string(function, r.access),
        })
        .collect()
}

fn base_names<'a>(bases: impl IntoIterator<Item = &'a ArrayBase>) -> Vec<String> {
    bases.into_iter().map(|b| b.name().to_string()).collect()
}

/// 一つのループを解析
///
/// プリヘッダ・ヘッダ・誘導変数のいずれかがなければスキップし、
/// ハザードを持たないスキップ結果を返します。
pub fn analyze_loop(
    function: &Function,
    lp: &Loop,
    dom: &dyn DominanceInfo,
    config: &AnalysisConfig,
) -> LoopReport {
    let location = loop_location(function, lp);
    let header_name = lp.header.map(|h| function.block(h).name.clone());

    let preheader = match lp.preheader {
        Some(preheader) => preheader,
        None => return LoopReport::skipped(location, header_name, SkipReason::MissingPreheader),
    };
    let header = match lp.header {
        Some(header) => header,
        None => return LoopReport::skipped(location, header_name, SkipReason::MissingHeader),
    };
    let iv = match find_induction_variable(function, header) {
        Ok(iv) => iv,
        Err(reason) => return LoopReport::skipped(location, header_name, reason),
    };
    debug!("ループ {} の誘導変数: {}", location, iv.name(function));

    // 配列アクセスを先に追跡し、アドレス計算を読み書きの分類から除外する
    let tracker = ArrayTracker::track(function, &lp.blocks, iv.location);
    let mut access = AccessSet::new();
    access.collect_defined_before(function, preheader, dom);
    access.classify(function, &lp.blocks, iv.location, &tracker);

    let mut hazards = audit_calls(function, &lp.blocks, config);
    hazards.extend(check_shared_variables(&access));
    let (array_hazards, hazard_bases) = check_array_indices(function, &tracker);
    hazards.extend(array_hazards);
    if config.strict_indices {
        hazards.extend(check_irregular_indices(function, &tracker));
    }

    LoopReport {
        location,
        header: header_name,
        induction_variable: Some(iv.name(function).to_string()),
        status: LoopStatus::Analyzed,
        reads: names(&access.reads),
        writes: names(&access.writes),
        defined_before: names(&access.defined_before),
        array_reads: array_accesses(function, &tracker.reads),
        array_writes: array_accesses(function, &tracker.writes),
        irregular_read_bases: base_names(&tracker.irregular_reads),
        irregular_write_bases: base_names(&tracker.irregular_writes),
        array_hazards: base_names(&hazard_bases),
        parallelizable: hazards.is_empty(),
        hazards,
    }
}

/// ループの判定結果を診断情報として出力
fn emit_loop_diagnostics(function: &Function, report: &LoopReport, sink: &mut dyn DiagnosticSink) {
    if let Some(reason) = report.skip_reason() {
        warn!("関数 @{} のループ ({}): {}", function.name, report.location, reason);
        sink.report(
            Diagnostic::warning(format!("関数 @{} のループ: {}", function.name, reason))
                .with_code(reason.code())
                .with_location(report.location.clone()),
        );
        return;
    }

    for hazard in &report.hazards {
        sink.report(
            Diagnostic::warning(hazard.to_string())
                .with_code(hazard.code())
                .with_location(hazard.location().unwrap_or(&report.location)),
        );
    }

    let verdict = if report.parallelizable {
        "並列化可能です"
    } else {
        "並列化できません"
    };
    info!(
        "関数 @{} のループ ({}) は{}",
        function.name, report.location, verdict
    );
    sink.report(
        Diagnostic::note(format!("関数 @{} のループは{}", function.name, verdict))
            .with_code(codes::VERDICT)
            .with_location(report.location.clone()),
    );
}

/// ループ並列化判定パス
#[derive(Debug, Clone, Default)]
pub struct LoopParallelizationPass {
    config: AnalysisConfig,
}

impl LoopParallelizationPass {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// 関数内のループを順に解析
    pub fn run(&self, function: &Function, sink: &mut dyn DiagnosticSink) -> PassResult {
        let analyses = FunctionAnalyses::compute(function);
        let loops: Vec<&Loop> = if self.config.include_nested_loops {
            analyses.loops.all()
        } else {
            analyses.loops.top_level().collect()
        };

        let mut report = FunctionReport::new(function.name.clone());
        for lp in loops {
            let loop_report = analyze_loop(function, lp, &analyses.dominators, &self.config);
            emit_loop_diagnostics(function, &loop_report, sink);
            report.loops.push(loop_report);
        }

        PassResult {
            report,
            preserved: PreservedAnalyses::all(),
        }
    }
}

/// モジュール内のすべての関数を解析
///
/// 並列解析では関数ごとに診断バッファを持ち、最後に関数の順で出力します。
pub fn analyze_module(
    module: &Module,
    config: &AnalysisConfig,
    sink: &mut dyn DiagnosticSink,
) -> ModuleReport {
    let pass = LoopParallelizationPass::new(config.clone());

    let run_one = |function: &Function| {
        let mut buffer: Vec<Diagnostic> = Vec::new();
        let result = pass.run(function, &mut buffer);
        (result.report, buffer)
    };

    let results: Vec<(FunctionReport, Vec<Diagnostic>)> =
        if config.parallel_functions && module.functions.len() > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(config.thread_count())
                .build()
            {
                Ok(pool) => {
                    debug!("{} スレッドで関数を並列解析します", config.thread_count());
                    pool.install(|| module.functions.par_iter().map(&run_one).collect())
                }
                Err(e) => {
                    warn!("スレッドプールを作成できないため順次解析します: {}", e);
                    module.functions.iter().map(&run_one).collect()
                }
            }
        } else {
            module.functions.iter().map(&run_one).collect()
        };

    let mut functions = Vec::with_capacity(results.len());
    for (report, diagnostics) in results {
        for diagnostic in diagnostics {
            sink.report(diagnostic);
        }
        functions.push(report);
    }

    ModuleReport {
        module: module.name.clone(),
        functions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticEmitter;
    use crate::middleend::analysis::{ControlFlowGraph, DominatorTree};
    use crate::middleend::ir::{BlockId, FunctionBuilder, ValueId};

    /// for (i = 0; i < n; i++) { <body> } の骨組み
    struct LoopSkeleton {
        b: FunctionBuilder,
        i: ValueId,
        entry: BlockId,
        cond: BlockId,
        body: BlockId,
        inc: BlockId,
    }

    impl LoopSkeleton {
        fn new(name: &str) -> Self {
            let mut b = FunctionBuilder::new(name).with_source("/work", "loop.c");
            let n = b.param("n");
            let entry = b.block("entry");
            let cond = b.create_block("for.cond");
            let body = b.create_block("for.body");
            let inc = b.create_block("for.inc");
            let exit = b.create_block("for.end");
            let i = b.alloca("i");
            let zero = b.const_int(0);
            b.at(2);
            b.store(zero, i);

            b.position_at_end(cond);
            let li = b.load(i, "");
            let cmp = b.icmp("slt", li, n, "cmp");
            b.cond_br(cmp, body, exit);

            b.position_at_end(inc);
            b.at(9);
            let li = b.load(i, "");
            let one = b.const_int(1);
            let next = b.add(li, one, "inc");
            b.store(next, i);
            b.br(cond);

            b.position_at_end(exit);
            b.ret(None);

            b.position_at_end(body);
            b.no_loc();
            Self {
                b,
                i,
                entry,
                cond,
                body,
                inc,
            }
        }

        /// ループ前（entry）に命令を追加
        fn preamble<T>(&mut self, build: impl FnOnce(&mut FunctionBuilder) -> T) -> T {
            let saved = self.b.current_block();
            self.b.position_at_end(self.entry);
            let result = build(&mut self.b);
            if let Some(saved) = saved {
                self.b.position_at_end(saved);
            }
            result
        }

        fn finish(mut self) -> Function {
            self.b.position_at_end(self.entry);
            self.b.at(2);
            self.b.br(self.cond);
            self.b.position_at_end(self.body);
            self.b.br(self.inc);
            self.b.finish()
        }
    }

    fn analyze(f: &Function, config: &AnalysisConfig) -> (FunctionReport, DiagnosticEmitter) {
        let mut emitter = DiagnosticEmitter::new();
        let result = LoopParallelizationPass::new(config.clone()).run(f, &mut emitter);
        assert!(result.preserved.are_all_preserved());
        (result.report, emitter)
    }

    #[test]
    fn test_sum_reduction_is_shared_variable_hazard() {
        let mut s = LoopSkeleton::new("sum");
        let sum = s.preamble(|b| {
            let sum = b.alloca("sum");
            let zero = b.const_int(0);
            b.store(zero, sum);
            sum
        });
        let data = s.b.global("data");
        let zero = s.b.const_int(0);
        s.b.at(5);
        let lsum = s.b.load(sum, "");
        let li = s.b.load(s.i, "");
        let idx = s.b.sext(li, "idxprom");
        let addr = s.b.gep(data, &[zero, idx], "arrayidx");
        let elem = s.b.load(addr, "");
        let add = s.b.add(lsum, elem, "add");
        s.b.store(add, sum);
        let f = s.finish();

        let (report, emitter) = analyze(&f, &AnalysisConfig::default());
        let l = &report.loops[0];
        assert_eq!(l.status, LoopStatus::Analyzed);
        assert_eq!(l.induction_variable.as_deref(), Some("i"));
        assert_eq!(l.location, "/work/loop.c:2");
        assert!(l.defined_before.contains(&"sum".to_string()));
        assert_eq!(l.reads, vec!["sum"]);
        assert_eq!(l.writes, vec!["sum"]);
        assert!(!l.parallelizable);
        assert!(matches!(&l.hazards[0], Hazard::SharedVariable { name, .. } if name == "sum"));
        assert_eq!(emitter.count_code(codes::SHARED_VARIABLE), 1);
        assert_eq!(emitter.count_code(codes::VERDICT), 1);
    }

    #[test]
    fn test_elementwise_loop_is_parallelizable() {
        let mut s = LoopSkeleton::new("scale");
        let input = s.b.global("in");
        let output = s.b.global("out");
        let zero = s.b.const_int(0);
        let two = s.b.const_int(2);
        s.b.at(5);
        let l1 = s.b.load(s.i, "");
        let idx1 = s.b.sext(l1, "idxprom");
        let src = s.b.gep(input, &[zero, idx1], "arrayidx");
        let v = s.b.load(src, "");
        let scaled = s.b.mul(v, two, "mul");
        let l2 = s.b.load(s.i, "");
        let idx2 = s.b.sext(l2, "idxprom1");
        let dst = s.b.gep(output, &[zero, idx2], "arrayidx2");
        s.b.store(scaled, dst);
        let f = s.finish();

        let (report, emitter) = analyze(&f, &AnalysisConfig::default());
        let l = &report.loops[0];
        assert!(l.parallelizable, "{:?}", l.hazards);
        assert!(l.hazards.is_empty());
        assert!(l.reads.is_empty());
        assert!(l.writes.is_empty());
        assert_eq!(l.array_reads.len(), 1);
        assert_eq!(l.array_writes[0].base, "out");
        assert!(!emitter.has_warnings());
        assert!(report.all_parallelizable());
    }

    #[test]
    fn test_shifted_index_is_array_hazard() {
        // b[i] = 1; x = b[i - 1];
        let mut s = LoopSkeleton::new("shift");
        let arr = s.b.global("b");
        let x = s.preamble(|b| b.alloca("x"));
        let zero = s.b.const_int(0);
        let one = s.b.const_int(1);
        s.b.at(6);
        let l1 = s.b.load(s.i, "");
        let idx = s.b.sext(l1, "idxprom");
        let dst = s.b.gep(arr, &[zero, idx], "arrayidx");
        s.b.store(one, dst);
        s.b.at(7);
        let l2 = s.b.load(s.i, "");
        let prev = s.b.sub(l2, one, "sub");
        let idx2 = s.b.sext(prev, "idxprom1");
        let src = s.b.gep(arr, &[zero, idx2], "arrayidx2");
        let v = s.b.load(src, "");
        s.b.store(v, x);
        let f = s.finish();

        let (report, emitter) = analyze(&f, &AnalysisConfig::default());
        let l = &report.loops[0];
        assert!(!l.parallelizable);
        assert_eq!(l.array_hazards, vec!["b"]);
        assert_eq!(emitter.count_code(codes::ARRAY_INDEX), 1);
        // x はループ前に定義されていないので共有変数ではない
        assert_eq!(l.writes, vec!["x"]);
        assert_eq!(emitter.count_code(codes::SHARED_VARIABLE), 0);
    }

    #[test]
    fn test_call_makes_loop_non_parallelizable() {
        let mut s = LoopSkeleton::new("print");
        s.b.at(4);
        let li = s.b.load(s.i, "");
        s.b.call("printf", &[li], "call");
        let f = s.finish();

        let (report, emitter) = analyze(&f, &AnalysisConfig::default());
        let l = &report.loops[0];
        assert!(!l.parallelizable);
        assert_eq!(
            l.hazards,
            vec![Hazard::Call {
                callee: "printf".to_string(),
                location: "/work/loop.c:4".to_string()
            }]
        );
        assert_eq!(emitter.count_code(codes::CALL), 1);
    }

    #[test]
    fn test_missing_preheader_skips_without_hazards() {
        // entry が条件分岐で直接ヘッダへ入るためプリヘッダがない
        let mut b = FunctionBuilder::new("f");
        b.block("entry");
        let header = b.create_block("header");
        let exit = b.create_block("exit");
        let i = b.alloca("i");
        let c = b.const_int(1);
        b.cond_br(c, header, exit);
        b.position_at_end(header);
        b.load(i, "");
        b.call("printf", &[], "");
        b.cond_br(c, header, exit);
        b.position_at_end(exit);
        b.ret(None);
        let f = b.finish();

        let (report, emitter) = analyze(&f, &AnalysisConfig::default());
        let l = &report.loops[0];
        assert_eq!(l.status, LoopStatus::Skipped(SkipReason::MissingPreheader));
        assert!(l.hazards.is_empty());
        assert!(!l.parallelizable);
        assert_eq!(emitter.count_code(codes::MISSING_PREHEADER), 1);
        assert_eq!(emitter.count_code(codes::CALL), 0);
        assert_eq!(emitter.count_code(codes::VERDICT), 0);
    }

    #[test]
    fn test_header_without_load_has_no_induction_variable() {
        let mut b = FunctionBuilder::new("f");
        let entry = b.block("entry");
        let header = b.create_block("header");
        let exit = b.create_block("exit");
        let zero = b.const_int(0);
        b.br(header);
        b.position_at_end(header);
        let phi = b.phi(&[(zero, entry)], "i");
        let one = b.const_int(1);
        let next = b.add(phi, one, "next");
        b.add_incoming(phi, next, header);
        b.cond_br(one, header, exit);
        b.position_at_end(exit);
        b.ret(None);
        let f = b.finish();

        let (report, _) = analyze(&f, &AnalysisConfig::default());
        assert_eq!(
            report.loops[0].skip_reason(),
            Some(SkipReason::NoInductionVariable)
        );
    }

    #[test]
    fn test_missing_header_and_empty_header() {
        let mut b = FunctionBuilder::new("f");
        let entry = b.block("entry");
        let header = b.create_block("header");
        b.br(header);
        let f = b.finish();

        let cfg = ControlFlowGraph::build(&f);
        let dom = DominatorTree::build(&cfg);
        let config = AnalysisConfig::default();

        let no_header = Loop::new(None, Some(entry), vec![header]);
        assert_eq!(
            analyze_loop(&f, &no_header, &dom, &config).skip_reason(),
            Some(SkipReason::MissingHeader)
        );

        let empty = Loop::new(Some(header), Some(entry), vec![header]);
        let report = analyze_loop(&f, &empty, &dom, &config);
        assert_eq!(report.skip_reason(), Some(SkipReason::EmptyHeader));
        assert_eq!(report.header.as_deref(), Some("header"));
    }

    #[test]
    fn test_verdict_is_per_loop() {
        // 一つ目のループは呼び出しで並列化不可、二つ目は並列化可能
        let mut b = FunctionBuilder::new("two").with_source("/work", "two.c");
        b.block("entry");
        let c1 = b.create_block("c1");
        let b1 = b.create_block("b1");
        let mid = b.create_block("mid");
        let c2 = b.create_block("c2");
        let b2 = b.create_block("b2");
        let exit = b.create_block("exit");
        let i = b.alloca("i");
        let j = b.alloca("j");
        let zero = b.const_int(0);
        let one = b.const_int(1);
        b.br(c1);

        b.position_at_end(c1);
        let li = b.load(i, "");
        b.cond_br(li, b1, mid);
        b.position_at_end(b1);
        b.call("rand", &[], "");
        let li2 = b.load(i, "");
        let ni = b.add(li2, one, "inc");
        b.store(ni, i);
        b.br(c1);

        b.position_at_end(mid);
        b.store(zero, j);
        b.br(c2);
        b.position_at_end(c2);
        let lj = b.load(j, "");
        b.cond_br(lj, b2, exit);
        b.position_at_end(b2);
        let lj2 = b.load(j, "");
        let nj = b.add(lj2, one, "inc2");
        b.store(nj, j);
        b.br(c2);
        b.position_at_end(exit);
        b.ret(None);
        let f = b.finish();

        let (report, _) = analyze(&f, &AnalysisConfig::default());
        assert_eq!(report.loops.len(), 2);
        assert!(!report.loops[0].parallelizable);
        assert!(report.loops[1].parallelizable);
        assert!(report.loops[1].hazards.is_empty());
        assert!(!report.all_parallelizable());
        assert!(report.has_hazards());
    }

    #[test]
    fn test_strict_indices_reports_irregular_writes() {
        let mut s = LoopSkeleton::new("scatter");
        let arr = s.b.global("a");
        let two = s.b.const_int(2);
        s.b.at(5);
        let li = s.b.load(s.i, "");
        let scaled = s.b.mul(li, two, "mul");
        let dst = s.b.gep(arr, &[scaled], "arrayidx");
        s.b.store(two, dst);
        let f = s.finish();

        let (relaxed, _) = analyze(&f, &AnalysisConfig::default());
        assert!(relaxed.loops[0].parallelizable);
        assert_eq!(relaxed.loops[0].irregular_write_bases, vec!["a"]);

        let strict = AnalysisConfig {
            strict_indices: true,
            ..AnalysisConfig::default()
        };
        let (report, emitter) = analyze(&f, &strict);
        assert!(!report.loops[0].parallelizable);
        assert_eq!(emitter.count_code(codes::IRREGULAR_INDEX), 1);
    }

    #[test]
    fn test_module_analysis_parallel_matches_sequential() {
        let mut module = Module::new("m");
        for name in ["a", "b", "c", "d"] {
            let mut s = LoopSkeleton::new(name);
            s.b.at(4);
            s.b.call("puts", &[], "");
            module.add_function(s.finish());
        }

        let sequential = AnalysisConfig::default();
        let parallel = AnalysisConfig {
            parallel_functions: true,
            threads: Some(2),
            ..AnalysisConfig::default()
        };
        let mut seq_diags: Vec<Diagnostic> = Vec::new();
        let mut par_diags: Vec<Diagnostic> = Vec::new();
        let seq = analyze_module(&module, &sequential, &mut seq_diags);
        let par = analyze_module(&module, &parallel, &mut par_diags);
        assert_eq!(seq, par);
        assert_eq!(seq_diags, par_diags);
        assert_eq!(seq.loop_count(), 4);
        assert_eq!(seq.parallelizable_count(), 0);
    }

    #[test]
    fn test_empty_loop_is_parallelizable() {
        let f = LoopSkeleton::new("empty").finish();
        let (report, _) = analyze(&f, &AnalysisConfig::default());
        let l = &report.loops[0];
        assert_eq!(l.header.as_deref(), Some("for.cond"));
        assert_eq!(l.defined_before, vec!["i"]);
        assert!(l.parallelizable);
    }
}
