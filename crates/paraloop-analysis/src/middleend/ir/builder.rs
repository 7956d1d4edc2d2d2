// ParaLoop IRビルダー
//
// 関数をプログラムから組み立てるためのユーティリティです。
// 現在の挿入ブロックと現在のソース行を保持し、作成する命令に付与します。

use super::representation::{
    stable_name, BinaryOp, BlockId, CastOp, DebugLoc, Function, InstKind, ValueId,
};

/// 関数ビルダー
pub struct FunctionBuilder {
    function: Function,
    current: Option<BlockId>,
    directory: String,
    file: String,
    line: Option<u32>,
}

impl FunctionBuilder {
    /// 新しいビルダーを作成
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            function: Function::new(name),
            current: None,
            directory: String::new(),
            file: String::new(),
            line: None,
        }
    }

    /// ソースファイル情報を設定
    pub fn with_source(mut self, directory: impl Into<String>, file: impl Into<String>) -> Self {
        self.directory = directory.into();
        self.file = file.into();
        self
    }

    /// 以降の命令に付与するソース行を設定
    pub fn at(&mut self, line: u32) -> &mut Self {
        self.line = Some(line);
        self
    }

    /// ソース行の付与をやめる
    pub fn no_loc(&mut self) -> &mut Self {
        self.line = None;
        self
    }

    pub fn param(&mut self, name: &str) -> ValueId {
        self.function.add_param(name)
    }

    /// ブロックを作成（挿入位置は変えない）
    pub fn create_block(&mut self, name: &str) -> BlockId {
        self.function.add_block(name)
    }

    /// ブロックを作成して挿入位置をその末尾に移す
    pub fn block(&mut self, name: &str) -> BlockId {
        let id = self.function.add_block(name);
        self.current = Some(id);
        id
    }

    pub fn position_at_end(&mut self, block: BlockId) {
        self.current = Some(block);
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.current
    }

    fn current_loc(&self) -> Option<DebugLoc> {
        self.line
            .map(|line| DebugLoc::new(self.directory.clone(), self.file.clone(), line))
    }

    fn insert(&mut self, name: &str, kind: InstKind) -> ValueId {
        let loc = self.current_loc();
        let name = stable_name(name);
        match self.current {
            Some(block) => self.function.append_instruction(block, name, kind, loc),
            None => {
                // 挿入ブロックがない場合はブロックに属さない値として作成
                let id = self.function.reserve_value(name);
                self.function.replace_instruction(id, kind);
                id
            }
        }
    }

    pub fn const_int(&mut self, value: i64) -> ValueId {
        self.function.const_int(value)
    }

    pub fn const_float(&mut self, value: f64) -> ValueId {
        self.function.const_float(value)
    }

    pub fn global(&mut self, name: &str) -> ValueId {
        self.function.global(name)
    }

    pub fn alloca(&mut self, name: &str) -> ValueId {
        self.insert(name, InstKind::Alloca)
    }

    pub fn load(&mut self, ptr: ValueId, name: &str) -> ValueId {
        self.insert(name, InstKind::Load { ptr })
    }

    pub fn store(&mut self, value: ValueId, ptr: ValueId) -> ValueId {
        self.insert("", InstKind::Store { value, ptr })
    }

    pub fn gep(&mut self, base: ValueId, indices: &[ValueId], name: &str) -> ValueId {
        self.insert(
            name,
            InstKind::ElementAddr {
                base,
                indices: indices.to_vec(),
            },
        )
    }

    pub fn cast(&mut self, op: CastOp, operand: ValueId, name: &str) -> ValueId {
        self.insert(name, InstKind::Cast { op, operand })
    }

    pub fn sext(&mut self, operand: ValueId, name: &str) -> ValueId {
        self.cast(CastOp::SExt, operand, name)
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.insert(name, InstKind::Binary { op, lhs, rhs })
    }

    pub fn add(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.binary(BinaryOp::Add, lhs, rhs, name)
    }

    pub fn sub(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.binary(BinaryOp::Sub, lhs, rhs, name)
    }

    pub fn mul(&mut self, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.binary(BinaryOp::Mul, lhs, rhs, name)
    }

    pub fn icmp(&mut self, predicate: &str, lhs: ValueId, rhs: ValueId, name: &str) -> ValueId {
        self.insert(
            name,
            InstKind::Cmp {
                float: false,
                predicate: predicate.to_string(),
                lhs,
                rhs,
            },
        )
    }

    pub fn phi(&mut self, incoming: &[(ValueId, BlockId)], name: &str) -> ValueId {
        self.insert(
            name,
            InstKind::Phi {
                incoming: incoming.to_vec(),
            },
        )
    }

    /// ファイ関数に入力を追加（ループの後方辺用）
    pub fn add_incoming(&mut self, phi: ValueId, value: ValueId, block: BlockId) {
        if let Some(InstKind::Phi { incoming }) = self.function.inst(phi).cloned() {
            let mut incoming = incoming;
            incoming.push((value, block));
            self.function.replace_instruction(phi, InstKind::Phi { incoming });
        }
    }

    /// 名前付き関数の呼び出し
    pub fn call(&mut self, callee: &str, args: &[ValueId], name: &str) -> ValueId {
        let callee = self.function.function_ref(callee);
        self.insert(
            name,
            InstKind::Call {
                callee,
                args: args.to_vec(),
            },
        )
    }

    /// 関数ポインタ経由の呼び出し
    pub fn call_indirect(&mut self, target: ValueId, args: &[ValueId], name: &str) -> ValueId {
        self.insert(
            name,
            InstKind::Call {
                callee: target,
                args: args.to_vec(),
            },
        )
    }

    pub fn br(&mut self, target: BlockId) -> ValueId {
        self.insert("", InstKind::Br { target })
    }

    pub fn cond_br(&mut self, cond: ValueId, then_bb: BlockId, else_bb: BlockId) -> ValueId {
        self.insert("", InstKind::CondBr { cond, then_bb, else_bb })
    }

    pub fn ret(&mut self, value: Option<ValueId>) -> ValueId {
        self.insert("", InstKind::Ret { value })
    }

    /// 組み立て途中の関数を参照
    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn finish(self) -> Function {
        self.function
    }
}
