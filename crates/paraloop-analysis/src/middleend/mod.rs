// ParaLoop ミドルエンドモジュール
//
// ホストコンパイラの中間表現を受け取り、ループの並列化可能性を判定します。
// - ir: 中間表現とテキスト形式の読み込み
// - analysis: 制御フロー・支配関係・ループの解析
// - parallelization: ループ並列化判定パス

pub mod analysis;
pub mod ir;
pub mod parallelization;
