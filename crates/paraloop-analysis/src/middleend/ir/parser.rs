// ParaLoop テキストIRパーサ
//
// LLVM風の行指向テキスト形式を読み込み、Moduleを構築します。
// 前方参照（ファイ関数の後方辺、分岐先）を解決するため、関数ごとに
// 2パスで処理します。1パス目でラベルと結果名を登録し、2パス目で命令を定義します。

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::debug;
use regex::Regex;

use super::representation::{
    stable_name, BinaryOp, BlockId, CastOp, DebugLoc, Function, InstKind, Module, ValueId,
};
use crate::error::{ParaLoopError, Result};

/// パーサで使用する正規表現
struct Patterns {
    source_filename: Regex,
    source_directory: Regex,
    global: Regex,
    define: Regex,
    label: Regex,
    dbg: Regex,
    assign: Regex,
    phi_entry: Regex,
    call: Regex,
    int_literal: Regex,
    float_literal: Regex,
}

impl Patterns {
    fn new() -> Result<Self> {
        Ok(Self {
            source_filename: Regex::new(r#"^source_filename\s*=\s*"([^"]*)"$"#)?,
            source_directory: Regex::new(r#"^source_directory\s*=\s*"([^"]*)"$"#)?,
            global: Regex::new(r"^@([\w.$-]+)\s*=\s*(?:\w+\s+)*global\b")?,
            define: Regex::new(r"^define\s+(?:[\w*]+\s+)?@([\w.$-]+)\s*\(([^)]*)\)\s*\{$")?,
            label: Regex::new(r"^([\w.$-]+):$")?,
            dbg: Regex::new(r"\s*,?\s*!dbg\s+!?(\d+)\s*$")?,
            assign: Regex::new(r"^%([\w.$-]+)\s*=\s*(.+)$")?,
            phi_entry: Regex::new(r"\[\s*([^,\]]+?)\s*,\s*%([\w.$-]+)\s*\]")?,
            call: Regex::new(r"^(?:.*?\s)?([@%][\w.$-]+)\s*\((.*)\)$")?,
            int_literal: Regex::new(r"^-?\d+$")?,
            float_literal: Regex::new(r"^-?\d+\.\d*(?:[eE][-+]?\d+)?$")?,
        })
    }
}

/// ソース行（行番号付き）
struct SourceLine<'a> {
    number: usize,
    text: &'a str,
}

/// 関数本体のパース状態
struct FunctionParser<'p> {
    patterns: &'p Patterns,
    function: Function,
    locals: HashMap<String, ValueId>,
    blocks: HashMap<String, BlockId>,
    directory: String,
    file: String,
}

/// コメントを除去（文字列リテラル内の ';' は残す）
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_string = !in_string,
            ';' if !in_string => return &line[..i],
            _ => {}
        }
    }
    line
}

/// トップレベルのカンマで分割（括弧内のカンマは無視）
fn split_operands(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = s[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
        .into_iter()
        .filter(|p| !p.is_empty() && !p.starts_with("align"))
        .collect()
}

/// 型注釈などを除いた最後の語
fn last_word(s: &str) -> &str {
    s.split_whitespace().last().unwrap_or("")
}

impl<'p> FunctionParser<'p> {
    fn new(patterns: &'p Patterns, name: &str, directory: String, file: String) -> Self {
        Self {
            patterns,
            function: Function::new(name),
            locals: HashMap::new(),
            blocks: HashMap::new(),
            directory,
            file,
        }
    }

    fn add_params(&mut self, params: &str, line: usize) -> Result<()> {
        for part in split_operands(params) {
            let token = last_word(part);
            let name = token.strip_prefix('%').ok_or_else(|| {
                ParaLoopError::parse(line, format!("引数名が不正です: '{}'", part))
            })?;
            let id = self.function.add_param(name);
            if self.locals.insert(name.to_string(), id).is_some() {
                return Err(ParaLoopError::parse(line, format!("引数 %{} が重複しています", name)));
            }
        }
        Ok(())
    }

    /// 1パス目: ラベルと結果名を登録
    fn declare(&mut self, body: &[SourceLine<'_>]) -> Result<()> {
        let mut have_block = false;
        for line in body {
            if let Some(caps) = self.patterns.label.captures(line.text) {
                let label = caps[1].to_string();
                if self.blocks.contains_key(&label) {
                    return Err(ParaLoopError::parse(
                        line.number,
                        format!("ラベル '{}' が重複しています", label),
                    ));
                }
                let id = self.function.add_block(label.clone());
                self.blocks.insert(label, id);
                have_block = true;
                continue;
            }

            if !have_block {
                // ラベルのない先頭ブロック
                let id = self.function.add_block("entry");
                self.blocks.insert("entry".to_string(), id);
                have_block = true;
            }

            if let Some(caps) = self.patterns.assign.captures(line.text) {
                let name = caps[1].to_string();
                if self.locals.contains_key(&name) {
                    return Err(ParaLoopError::parse(
                        line.number,
                        format!("値 %{} が重複して定義されています", name),
                    ));
                }
                let id = self.function.reserve_value(stable_name(&name));
                self.locals.insert(name, id);
            }
        }
        Ok(())
    }

    /// 2パス目: 命令を定義
    fn define(&mut self, body: &[SourceLine<'_>]) -> Result<()> {
        let mut current = self.function.entry();
        for line in body {
            if let Some(caps) = self.patterns.label.captures(line.text) {
                current = self.blocks.get(&caps[1]).copied();
                continue;
            }
            let block = current.ok_or_else(|| ParaLoopError::parse(line.number, "命令がブロックの外にあります"))?;
            self.parse_instruction(line, block)?;
        }
        Ok(())
    }

    fn parse_instruction(&mut self, line: &SourceLine<'_>, block: BlockId) -> Result<()> {
        let mut text = line.text;
        let mut loc = None;
        if let Some(caps) = self.patterns.dbg.captures(text) {
            let number: u32 = caps[1]
                .parse()
                .map_err(|_| ParaLoopError::parse(line.number, "!dbg の行番号が不正です"))?;
            loc = Some(DebugLoc::new(self.directory.clone(), self.file.clone(), number));
            text = &text[..caps.get(0).map_or(text.len(), |m| m.start())];
        }

        let (result, rest) = match self.patterns.assign.captures(text) {
            Some(caps) => {
                let id = self.locals.get(&caps[1]).copied();
                let rest = caps.get(2).map_or("", |m| m.as_str());
                (id, rest)
            }
            None => (None, text),
        };

        let rest = rest.trim();
        let (mnemonic, args) = match rest.find(char::is_whitespace) {
            Some(pos) => (&rest[..pos], rest[pos..].trim()),
            None => (rest, ""),
        };

        let kind = self.parse_kind(line.number, mnemonic, args)?;
        match result {
            Some(id) => self.function.define_instruction(id, block, Some(kind), loc),
            None => {
                self.function.append_instruction(block, None, kind, loc);
            }
        }
        Ok(())
    }

    fn parse_kind(&mut self, line: usize, mnemonic: &str, args: &str) -> Result<InstKind> {
        if let Some(op) = BinaryOp::from_mnemonic(mnemonic) {
            let (lhs, rhs) = self.two_operands(line, mnemonic, args)?;
            return Ok(InstKind::Binary { op, lhs, rhs });
        }
        if let Some(op) = CastOp::from_mnemonic(mnemonic) {
            let operand_text = match args.find(" to ") {
                Some(pos) => &args[..pos],
                None => args,
            };
            let operand = self.value(line, last_word(operand_text))?;
            return Ok(InstKind::Cast { op, operand });
        }

        let kind = match mnemonic {
            "alloca" => InstKind::Alloca,
            "load" => {
                let parts = split_operands(args);
                let ptr = parts
                    .last()
                    .ok_or_else(|| ParaLoopError::parse(line, "load にオペランドがありません"))?;
                InstKind::Load {
                    ptr: self.value(line, last_word(ptr))?,
                }
            }
            "store" => {
                let (value, ptr) = self.two_operands(line, mnemonic, args)?;
                InstKind::Store { value, ptr }
            }
            "gep" | "getelementptr" => {
                let args = args.strip_prefix("inbounds").unwrap_or(args);
                let mut parts = split_operands(args);
                // 先頭の要素型（`[100 x i32]` など）は読み飛ばす
                if parts.len() > 1 && !self.looks_like_value(last_word(parts[0])) {
                    parts.remove(0);
                }
                let (base, indices) = parts
                    .split_first()
                    .ok_or_else(|| ParaLoopError::parse(line, "gep にベースがありません"))?;
                let base = self.value(line, last_word(base))?;
                let indices = indices
                    .iter()
                    .map(|p| self.value(line, last_word(p)))
                    .collect::<Result<Vec<_>>>()?;
                InstKind::ElementAddr { base, indices }
            }
            "icmp" | "fcmp" => {
                let (predicate, operands) = match args.find(char::is_whitespace) {
                    Some(pos) => (&args[..pos], &args[pos..]),
                    None => return Err(ParaLoopError::parse(line, "比較述語がありません")),
                };
                let (lhs, rhs) = self.two_operands(line, mnemonic, operands)?;
                InstKind::Cmp {
                    float: mnemonic == "fcmp",
                    predicate: predicate.to_string(),
                    lhs,
                    rhs,
                }
            }
            "phi" => {
                let mut incoming = Vec::new();
                let entries: Vec<(String, String)> = self
                    .patterns
                    .phi_entry
                    .captures_iter(args)
                    .map(|c| (c[1].to_string(), c[2].to_string()))
                    .collect();
                for (value, label) in entries {
                    let value = self.value(line, last_word(&value))?;
                    let block = self.block(line, &label)?;
                    incoming.push((value, block));
                }
                InstKind::Phi { incoming }
            }
            "call" => {
                let caps = self
                    .patterns
                    .call
                    .captures(args)
                    .ok_or_else(|| ParaLoopError::parse(line, format!("call の形式が不正です: '{}'", args)))?;
                let target = caps[1].to_string();
                let arg_text = caps[2].to_string();
                let callee = match target.strip_prefix('@') {
                    Some(name) => self.function.function_ref(name),
                    None => self.value(line, &target)?,
                };
                let args = split_operands(&arg_text)
                    .into_iter()
                    .map(|a| self.value(line, last_word(a)))
                    .collect::<Result<Vec<_>>>()?;
                InstKind::Call { callee, args }
            }
            "br" => {
                let parts = split_operands(args);
                match parts.as_slice() {
                    [target] => InstKind::Br {
                        target: self.label_operand(line, target)?,
                    },
                    [cond, then_bb, else_bb] => InstKind::CondBr {
                        cond: self.value(line, last_word(cond))?,
                        then_bb: self.label_operand(line, then_bb)?,
                        else_bb: self.label_operand(line, else_bb)?,
                    },
                    _ => return Err(ParaLoopError::parse(line, format!("br の形式が不正です: '{}'", args))),
                }
            }
            "ret" => {
                let token = last_word(args);
                if token.is_empty() || token == "void" {
                    InstKind::Ret { value: None }
                } else {
                    InstKind::Ret {
                        value: Some(self.value(line, token)?),
                    }
                }
            }
            "" => return Err(ParaLoopError::parse(line, "命令がありません")),
            other => {
                let mut operands = Vec::new();
                for part in split_operands(args) {
                    let token = last_word(part);
                    if self.looks_like_value(token) {
                        operands.push(self.value(line, token)?);
                    }
                }
                debug!("未知の命令 '{}' を Other として扱います", other);
                InstKind::Other {
                    mnemonic: other.to_string(),
                    operands,
                }
            }
        };
        Ok(kind)
    }

    fn two_operands(&mut self, line: usize, mnemonic: &str, args: &str) -> Result<(ValueId, ValueId)> {
        let parts = split_operands(args);
        match parts.as_slice() {
            [a, b] => Ok((self.value(line, last_word(a))?, self.value(line, last_word(b))?)),
            _ => Err(ParaLoopError::parse(
                line,
                format!("{} には2つのオペランドが必要です: '{}'", mnemonic, args),
            )),
        }
    }

    fn looks_like_value(&self, token: &str) -> bool {
        token.starts_with('%')
            || token.starts_with('@')
            || self.patterns.int_literal.is_match(token)
            || self.patterns.float_literal.is_match(token)
    }

    fn label_operand(&self, line: usize, text: &str) -> Result<BlockId> {
        let token = last_word(text);
        let label = token
            .strip_prefix('%')
            .ok_or_else(|| ParaLoopError::parse(line, format!("ラベルが不正です: '{}'", text)))?;
        self.block(line, label)
    }

    fn block(&self, line: usize, label: &str) -> Result<BlockId> {
        self.blocks
            .get(label)
            .copied()
            .ok_or_else(|| ParaLoopError::parse(line, format!("未定義のラベル %{}", label)))
    }

    fn value(&mut self, line: usize, token: &str) -> Result<ValueId> {
        if let Some(name) = token.strip_prefix('%') {
            return self
                .locals
                .get(name)
                .copied()
                .ok_or_else(|| ParaLoopError::parse(line, format!("未定義の値 %{}", name)));
        }
        if let Some(name) = token.strip_prefix('@') {
            return Ok(self.function.global(name));
        }
        match token {
            "true" => return Ok(self.function.const_int(1)),
            "false" => return Ok(self.function.const_int(0)),
            "undef" | "null" | "poison" => return Ok(self.function.undef()),
            _ => {}
        }
        if self.patterns.int_literal.is_match(token) {
            let v: i64 = token
                .parse()
                .map_err(|_| ParaLoopError::parse(line, format!("整数が範囲外です: {}", token)))?;
            return Ok(self.function.const_int(v));
        }
        if self.patterns.float_literal.is_match(token) {
            let v: f64 = token
                .parse()
                .map_err(|_| ParaLoopError::parse(line, format!("浮動小数点数が不正です: {}", token)))?;
            return Ok(self.function.const_float(v));
        }
        Err(ParaLoopError::parse(line, format!("オペランドが不正です: '{}'", token)))
    }
}

/// テキストIRをパース
pub fn parse_module(source: &str) -> Result<Module> {
    parse_module_named("module", source)
}

/// モジュール名を指定してテキストIRをパース
pub fn parse_module_named(name: &str, source: &str) -> Result<Module> {
    let patterns = Patterns::new()?;
    let mut module = Module::new(name);

    let lines: Vec<SourceLine<'_>> = source
        .lines()
        .enumerate()
        .map(|(i, l)| SourceLine {
            number: i + 1,
            text: strip_comment(l).trim(),
        })
        .filter(|l| !l.text.is_empty())
        .collect();

    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        if let Some(caps) = patterns.source_filename.captures(line.text) {
            module.source_filename = Some(caps[1].to_string());
        } else if let Some(caps) = patterns.source_directory.captures(line.text) {
            module.source_directory = Some(caps[1].to_string());
        } else if let Some(caps) = patterns.global.captures(line.text) {
            module.globals.push(caps[1].to_string());
        } else if let Some(caps) = patterns.define.captures(line.text) {
            let fname = caps[1].to_string();
            let params = caps[2].to_string();
            let start = i + 1;
            let end = lines[start..]
                .iter()
                .position(|l| l.text == "}")
                .map(|p| start + p)
                .ok_or_else(|| {
                    ParaLoopError::parse(line.number, format!("関数 @{} が閉じられていません", fname))
                })?;

            let directory = module.source_directory.clone().unwrap_or_default();
            let file = module
                .source_filename
                .clone()
                .unwrap_or_else(|| module.name.clone());
            let mut parser = FunctionParser::new(&patterns, &fname, directory, file);
            parser.add_params(&params, line.number)?;
            let body = &lines[start..end];
            parser.declare(body)?;
            parser.define(body)?;
            debug!(
                "関数 @{} を読み込みました（ブロック数: {}）",
                fname,
                parser.function.blocks.len()
            );
            module.add_function(parser.function);
            i = end;
        } else {
            return Err(ParaLoopError::parse(
                line.number,
                format!("解釈できない行です: '{}'", line.text),
            ));
        }
        i += 1;
    }

    Ok(module)
}

/// ファイルからテキストIRを読み込む
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Module> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|e| ParaLoopError::io(e, path))?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "module".to_string());
    parse_module_named(&name, &source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleend::ir::representation::ValueKind;

    const SIMPLE: &str = r#"
source_filename = "loop.c"
source_directory = "/work"
@table = global

define @f(%n) {
entry:
  %i = alloca
  store 0, %i !dbg 2
  br label %cond
cond:
  %0 = load %i !dbg 3
  %cmp = icmp slt %0, %n
  br %cmp, label %body, label %exit
body:
  %1 = load %i
  %inc = add nsw i32 %1, 1   ; 型注釈とフラグは無視される
  store %inc, %i
  br label %cond
exit:
  ret void
}
"#;

    #[test]
    fn test_parse_simple_function() {
        let module = parse_module(SIMPLE).expect("パースに失敗");
        assert_eq!(module.source_filename.as_deref(), Some("loop.c"));
        assert_eq!(module.globals, vec!["table".to_string()]);

        let f = module.get_function("f").expect("関数がありません");
        assert_eq!(f.blocks.len(), 4);
        assert_eq!(f.params.len(), 1);

        let cond = f.block_by_name("cond").unwrap();
        let first = f.block(cond).first_instruction().unwrap();
        assert!(f.name_of(first).is_none(), "%0 は無名値です");
        assert!(matches!(f.inst(first), Some(InstKind::Load { .. })));
        assert_eq!(f.loc_of(first).map(|l| l.to_string()), Some("/work/loop.c:3".to_string()));
    }

    #[test]
    fn test_forward_references_resolve() {
        let src = r#"
define @g() {
entry:
  br label %loop
loop:
  %x = phi [0, %entry], [%next, %loop]
  %next = add %x, 1
  br label %loop
}
"#;
        let module = parse_module(src).unwrap();
        let f = module.get_function("g").unwrap();
        let loop_bb = f.block_by_name("loop").unwrap();
        let phi = f.block(loop_bb).instructions[0];
        match f.inst(phi) {
            Some(InstKind::Phi { incoming }) => {
                assert_eq!(incoming.len(), 2);
                let (next, from) = incoming[1];
                assert_eq!(from, loop_bb);
                assert_eq!(f.name_of(next), Some("next"));
                assert!(f.value(next).is_instruction());
            }
            other => panic!("phiではありません: {:?}", other),
        }
    }

    #[test]
    fn test_call_and_globals() {
        let src = r#"
define @h() {
  %v = load @counter
  call void @printf(i32 %v, 7)
  ret
}
"#;
        let module = parse_module(src).unwrap();
        let f = module.get_function("h").unwrap();
        let entry = f.entry().unwrap();
        let call = f.block(entry).instructions[1];
        match f.inst(call) {
            Some(InstKind::Call { callee, args }) => {
                assert_eq!(f.value(*callee).kind, ValueKind::Function);
                assert_eq!(f.name_of(*callee), Some("printf"));
                assert_eq!(args.len(), 2);
            }
            other => panic!("callではありません: {:?}", other),
        }
    }

    #[test]
    fn test_undefined_value_is_error() {
        let src = "define @e() {\nentry:\n  %a = add %nope, 1\n  ret\n}\n";
        match parse_module(src) {
            Err(ParaLoopError::Parse { line, message }) => {
                assert_eq!(line, 3);
                assert!(message.contains("%nope"));
            }
            other => panic!("エラーになるはずです: {:?}", other.map(|m| m.functions.len())),
        }
    }

    #[test]
    fn test_unterminated_function_is_error() {
        let src = "define @e() {\nentry:\n  ret\n";
        assert!(matches!(parse_module(src), Err(ParaLoopError::Parse { line: 1, .. })));
    }

    #[test]
    fn test_duplicate_definition_is_error() {
        let src = "define @e() {\nentry:\n  %a = alloca\n  %a = alloca\n  ret\n}\n";
        assert!(matches!(parse_module(src), Err(ParaLoopError::Parse { line: 4, .. })));
    }

    #[test]
    fn test_dump_round_trip() {
        let module = parse_module(SIMPLE).unwrap();
        let dumped = module.to_string();
        let reparsed = parse_module(&dumped).expect("ダンプ結果を再パースできません");
        let a = module.get_function("f").unwrap();
        let b = reparsed.get_function("f").unwrap();
        assert_eq!(a.blocks.len(), b.blocks.len());
        assert_eq!(a.to_string(), b.to_string());
    }
}
