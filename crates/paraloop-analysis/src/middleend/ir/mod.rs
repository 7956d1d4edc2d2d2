// ParaLoop IRモジュール
// ホストコンパイラの中間表現と、そのテキスト形式の読み書きを提供します。

pub mod builder;
pub mod parser;
pub mod representation;

pub use builder::FunctionBuilder;
pub use parser::{parse_file, parse_module, parse_module_named};
pub use representation::{
    is_stable_name, stable_name, BasicBlock, BinaryOp, BlockId, CastOp, DebugLoc, Function,
    InstKind, Module, Opcode, Value, ValueId, ValueKind,
};
