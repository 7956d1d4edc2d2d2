// 誘導変数の特定と、誘導変数に基づくインデックスの判定

use crate::middleend::ir::{BlockId, Function, InstKind, ValueId};

use super::report::SkipReason;

/// ループの誘導変数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InductionVariable {
    /// 誘導変数の格納場所
    pub location: ValueId,
}

impl InductionVariable {
    pub fn name<'f>(&self, function: &'f Function) -> &'f str {
        function.name_of(self.location).unwrap_or("")
    }
}

/// ヘッダの先頭命令から誘導変数を特定
///
/// 先頭命令が名前付き格納場所の読み込みであれば、その格納場所を誘導変数とします。
pub fn find_induction_variable(
    function: &Function,
    header: BlockId,
) -> Result<InductionVariable, SkipReason> {
    let first = function
        .block(header)
        .first_instruction()
        .ok_or(SkipReason::EmptyHeader)?;

    match function.inst(first) {
        Some(InstKind::Load { ptr }) if function.name_of(*ptr).is_some() => {
            Ok(InductionVariable { location: *ptr })
        }
        _ => Err(SkipReason::NoInductionVariable),
    }
}

/// `value` が誘導変数の読み込みか
fn is_read_of(function: &Function, value: ValueId, iv: ValueId) -> bool {
    matches!(function.inst(value), Some(InstKind::Load { ptr }) if *ptr == iv)
}

/// インデックス式が誘導変数に基づいているか
///
/// 拡張キャストを一段だけ外したうえで、次のいずれかなら真です。
/// - 誘導変数の格納場所そのもの
/// - 誘導変数の読み込み
/// - どちらかのオペランドが誘導変数の読み込みである加減算
pub fn is_induction_relative(function: &Function, index: Option<ValueId>, iv: ValueId) -> bool {
    let mut index = match index {
        Some(index) => index,
        None => return false,
    };

    if let Some(InstKind::Cast { op, operand }) = function.inst(index) {
        if op.is_widening() {
            index = *operand;
        }
    }

    if index == iv || is_read_of(function, index, iv) {
        return true;
    }

    match function.inst(index) {
        Some(InstKind::Binary { op, lhs, rhs }) if op.is_additive() => {
            is_read_of(function, *lhs, iv) || is_read_of(function, *rhs, iv)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleend::ir::{CastOp, FunctionBuilder};

    #[test]
    fn test_find_induction_variable() {
        let mut b = FunctionBuilder::new("f");
        b.block("entry");
        let i = b.alloca("i");
        let slot = b.alloca("");
        let header = b.block("header");
        b.load(i, "");
        let empty = b.block("empty");
        let other = b.block("other");
        let one = b.const_int(1);
        b.add(one, one, "x");
        let unnamed_slot = b.block("unnamed");
        b.load(slot, "");
        let f = b.finish();

        assert_eq!(find_induction_variable(&f, header), Ok(InductionVariable { location: i }));
        assert_eq!(find_induction_variable(&f, empty), Err(SkipReason::EmptyHeader));
        assert_eq!(find_induction_variable(&f, other), Err(SkipReason::NoInductionVariable));
        assert_eq!(find_induction_variable(&f, unnamed_slot), Err(SkipReason::NoInductionVariable));
    }

    #[test]
    fn test_induction_relative_shapes() {
        let mut b = FunctionBuilder::new("f");
        b.block("entry");
        let i = b.alloca("i");
        let j = b.alloca("j");
        let li = b.load(i, "");
        let lj = b.load(j, "");
        let one = b.const_int(1);
        let two = b.const_int(2);
        let ext = b.sext(li, "idxprom");
        let zext = b.cast(CastOp::ZExt, li, "z");
        let trunc = b.cast(CastOp::Trunc, li, "t");
        let plus = b.add(li, one, "plus");
        let minus = b.sub(li, one, "minus");
        let plus_ext = b.sext(plus, "plus.ext");
        let times = b.mul(li, two, "times");
        let double_ext = b.sext(ext, "ext2");
        let offset_twice = b.add(plus, one, "plus2");
        let other = b.add(lj, one, "other");
        let f = b.finish();

        let rel = |v| is_induction_relative(&f, Some(v), i);
        assert!(rel(i));
        assert!(rel(li));
        assert!(rel(ext));
        assert!(rel(zext));
        assert!(rel(plus));
        assert!(rel(minus));
        assert!(rel(plus_ext));

        assert!(!rel(trunc));
        assert!(!rel(times));
        assert!(!rel(double_ext));
        assert!(!rel(offset_twice));
        assert!(!rel(other));
        assert!(!rel(one));
        assert!(!is_induction_relative(&f, None, i));
    }
}
