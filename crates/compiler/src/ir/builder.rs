//! Statement-level IR builder.
//!
//! Walks the AST at the statement level (blocks, `auto`/`extrn`
//! declarations, `if`/`while`/`switch`, `goto`/labels, `return`, rvalue
//! statements) and stitches the expression pipeline's quadruples with
//! control-flow quadruples. Function definitions are bracketed by
//! `LABEL __<name>` / `FUNC_START` … `FUNC_END`; branches expand with
//! fresh `_LN` labels through the `CMP`/`IF … GOTO` idiom, so no
//! fall-through happens without an intervening label.

use crate::ast::{AstNode, SymbolMap};
use crate::ir::object::{ObjectTable, Vector};
use crate::ir::temporary::expression_queue_to_instructions;
use crate::ir::{Instruction, Instructions, make_quadruple};
use crate::queue::queue_from_expression;
use crate::rvalue::ExpressionParser;
use credence_core::error::{CompileError, ErrorKind};
use credence_core::symbol::SymbolTable;
use credence_core::values::{
    Expression, Literal, null_data_type, word_data_type,
};

#[derive(Debug, Default)]
struct Counters {
    temporary: i32,
    label: i32,
    parameter_size: i32,
    parameter_ident: i32,
}

/// Result of lowering a translation unit: the master quadruple stream
/// plus the object table seeded with vectors, hoisted symbols and the
/// per-function declaration tables.
#[derive(Debug)]
pub struct BuildResult {
    pub instructions: Instructions,
    pub objects: ObjectTable,
}

pub struct IrBuilder<'a> {
    internal_symbols: &'a SymbolMap,
    globals: SymbolTable,
    objects: ObjectTable,
    counters: Counters,
}

impl<'a> IrBuilder<'a> {
    pub fn new(internal_symbols: &'a SymbolMap) -> Self {
        IrBuilder {
            internal_symbols,
            globals: SymbolTable::new(),
            objects: ObjectTable::new(),
            counters: Counters::default(),
        }
    }

    /// Lower a whole translation unit.
    pub fn build(mut self, ast: AstNode<'_>) -> Result<BuildResult, CompileError> {
        let mut instructions = Instructions::new();
        if ast.tag() == "function_definition" {
            instructions.extend(self.build_from_function_definition(&ast)?);
        } else {
            instructions.extend(self.build_from_definitions(&ast)?);
        }
        self.objects.hoisted_symbols = self.globals.clone();
        Ok(BuildResult {
            instructions,
            objects: self.objects,
        })
    }

    fn build_from_definitions(&mut self, node: &AstNode<'_>) -> Result<Instructions, CompileError> {
        let mut instructions = Instructions::new();
        for definition in node.left_list() {
            match definition.tag() {
                "function_definition" => {
                    instructions.extend(self.build_from_function_definition(&definition)?);
                }
                "vector_definition" => self.build_from_vector_definition(&definition)?,
                _ => {}
            }
        }
        Ok(instructions)
    }

    /// A file-scope vector: registered with the object table and
    /// hoisted for `extrn` import; emits no instructions.
    fn build_from_vector_definition(&mut self, node: &AstNode<'_>) -> Result<(), CompileError> {
        let name = node.root_str().to_string();
        let size = node.left().map(|n| n.root_int()).unwrap_or(0) as usize;
        if size > Vector::MAX_SIZE {
            return Err(CompileError::new(
                ErrorKind::OutOfRangeVector,
                format!("vector size '{}' exceeds the maximum of {}", size, Vector::MAX_SIZE),
                name,
            ));
        }
        let mut vector = Vector::new(name.clone(), size);
        for (index, value) in node.right_list().iter().enumerate() {
            let literal = match value.tag() {
                "number_literal" => Literal::Int(value.root_int()),
                "string_literal" => {
                    let raw = value.root_str();
                    let inner = raw
                        .strip_prefix('"')
                        .and_then(|s| s.strip_suffix('"'))
                        .unwrap_or(raw);
                    Literal::Str(crate::util::unescape_string(inner))
                }
                _ => continue,
            };
            vector.set_element(index.to_string(), literal.as_data_type());
        }
        self.objects.vectors.insert(name.clone(), vector);
        self.globals
            .set(name, ("0".to_string(), "byte".to_string(), size));
        Ok(())
    }

    fn build_from_function_definition(
        &mut self,
        node: &AstNode<'_>,
    ) -> Result<Instructions, CompileError> {
        let name = node.root_str();
        let label = format!("__{}", name);
        self.globals.set(label.clone(), word_data_type());

        // fresh temporaries, labels and argument slots per function
        self.counters = Counters::default();

        let mut symbols = SymbolTable::new();
        let mut parameters = Vec::new();
        let params = node.left_list();
        if !(params.len() == 1 && params[0].is_null()) {
            for ident in params {
                match ident.tag() {
                    "lvalue" => {
                        let param = ident.root_str().to_string();
                        symbols.set(param.clone(), word_data_type());
                        parameters.push(param);
                    }
                    "vector_lvalue" => {
                        let param = ident.root_str().to_string();
                        let size = ident.left().map(|n| n.root_int()).unwrap_or(0) as usize;
                        symbols.set(param.clone(), ("0".to_string(), "byte".to_string(), size));
                        parameters.push(param);
                    }
                    "indirect_lvalue" => {
                        let param = ident
                            .left()
                            .map(|inner| inner.root_str().to_string())
                            .unwrap_or_default();
                        symbols.set(param.clone(), word_data_type());
                        parameters.push(param);
                    }
                    _ => {}
                }
            }
        }

        let mut instructions = Instructions::new();
        instructions.push_back(make_quadruple(Instruction::Label, label.clone(), "", ""));
        instructions.push_back(make_quadruple(
            Instruction::FuncStart,
            "",
            parameters.join(","),
            "",
        ));
        if let Some(block) = node.right() {
            instructions.extend(self.build_from_statement(&mut symbols, &block)?);
        }
        instructions.push_back(make_quadruple(Instruction::FuncEnd, "", "", ""));

        // the declaration table seeds the frame in the context pass
        self.objects.declared.insert(label, symbols);
        Ok(instructions)
    }

    fn build_from_statement(
        &mut self,
        symbols: &mut SymbolTable,
        node: &AstNode<'_>,
    ) -> Result<Instructions, CompileError> {
        match node.root_str() {
            "block" => self.build_from_block_statement(symbols, node),
            "auto" => {
                self.build_from_auto_statement(symbols, node)?;
                Ok(Instructions::new())
            }
            "extrn" => {
                self.build_from_extrn_statement(symbols, node)?;
                Ok(Instructions::new())
            }
            "if" => self.build_from_if_statement(symbols, node),
            "while" => self.build_from_while_statement(symbols, node),
            "switch" => self.build_from_switch_statement(symbols, node),
            "goto" => self.build_from_goto_statement(node),
            "label" => self.build_from_label_statement(symbols, node),
            "return" => self.build_from_return_statement(symbols, node),
            "rvalue" => self.build_from_rvalue_statement(symbols, node),
            other => Err(CompileError::new(
                ErrorKind::InvalidRvalueType,
                format!("unknown statement `{}`", other),
                other,
            )),
        }
    }

    fn build_from_block_statement(
        &mut self,
        symbols: &mut SymbolTable,
        node: &AstNode<'_>,
    ) -> Result<Instructions, CompileError> {
        let mut instructions = Instructions::new();
        for statement in node.left_list() {
            instructions.extend(self.build_from_statement(symbols, &statement)?);
        }
        Ok(instructions)
    }

    /// `auto` registers locals: scalars as null storage, `*p` as a
    /// pointer-sized word, `v[n]` as vector storage plus an object-table
    /// vector entry.
    fn build_from_auto_statement(
        &mut self,
        symbols: &mut SymbolTable,
        node: &AstNode<'_>,
    ) -> Result<(), CompileError> {
        for ident in node.left_list() {
            match ident.tag() {
                "lvalue" => symbols.set(ident.root_str(), null_data_type()),
                "vector_lvalue" => {
                    let name = ident.root_str().to_string();
                    let size = ident.left().map(|n| n.root_int()).unwrap_or(0) as usize;
                    if size > Vector::MAX_SIZE {
                        return Err(CompileError::new(
                            ErrorKind::OutOfRangeVector,
                            format!(
                                "vector size '{}' exceeds the maximum of {}",
                                size,
                                Vector::MAX_SIZE
                            ),
                            name,
                        ));
                    }
                    symbols.set(name.clone(), ("0".to_string(), "byte".to_string(), size));
                    self.objects
                        .vectors
                        .insert(name.clone(), Vector::new(name, size));
                }
                "indirect_lvalue" => {
                    let name = ident
                        .left()
                        .map(|inner| inner.root_str().to_string())
                        .unwrap_or_default();
                    symbols.set(name, word_data_type());
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// `extrn` imports hoisted file-scope symbols into the block.
    fn build_from_extrn_statement(
        &mut self,
        symbols: &mut SymbolTable,
        node: &AstNode<'_>,
    ) -> Result<(), CompileError> {
        for ident in node.left_list() {
            let name = ident.root_str().to_string();
            if let Some(value) = self.globals.get(&name) {
                symbols.set(name, value.clone());
            } else if self.internal_symbols.is_function(&name) {
                self.globals.set(name.clone(), word_data_type());
                symbols.set(name, word_data_type());
            } else {
                return Err(CompileError::new(
                    ErrorKind::UndeclaredIdentifier,
                    "extrn identifier is not defined at file scope",
                    name.clone(),
                )
                .with_optional_span(self.internal_symbols.span(&name)));
            }
        }
        Ok(())
    }

    fn build_from_if_statement(
        &mut self,
        symbols: &mut SymbolTable,
        node: &AstNode<'_>,
    ) -> Result<Instructions, CompileError> {
        let condition = node.left().ok_or_else(|| statement_shape_error(node, "if"))?;
        let (mut instructions, result) = self.lower_condition(symbols, &condition)?;
        let false_label = self.next_label();
        let join_label = self.next_label();
        push_branch(&mut instructions, &result, &false_label);
        if let Some(body) = node.right() {
            instructions.extend(self.build_from_statement(symbols, &body)?);
        }
        instructions.push_back(make_quadruple(Instruction::Goto, join_label.clone(), "", ""));
        instructions.push_back(make_quadruple(Instruction::Label, false_label, "", ""));
        instructions.push_back(make_quadruple(Instruction::Label, join_label, "", ""));
        Ok(instructions)
    }

    fn build_from_while_statement(
        &mut self,
        symbols: &mut SymbolTable,
        node: &AstNode<'_>,
    ) -> Result<Instructions, CompileError> {
        let condition = node.left().ok_or_else(|| statement_shape_error(node, "while"))?;
        let head_label = self.next_label();
        let end_label = self.next_label();
        let mut instructions = Instructions::new();
        instructions.push_back(make_quadruple(Instruction::Label, head_label.clone(), "", ""));
        let (condition_instructions, result) = self.lower_condition(symbols, &condition)?;
        instructions.extend(condition_instructions);
        push_branch(&mut instructions, &result, &end_label);
        if let Some(body) = node.right() {
            instructions.extend(self.build_from_statement(symbols, &body)?);
        }
        instructions.push_back(make_quadruple(Instruction::Goto, head_label, "", ""));
        instructions.push_back(make_quadruple(Instruction::Label, end_label, "", ""));
        Ok(instructions)
    }

    /// `switch` degenerates to a chain of equality comparisons against
    /// each case constant.
    fn build_from_switch_statement(
        &mut self,
        symbols: &mut SymbolTable,
        node: &AstNode<'_>,
    ) -> Result<Instructions, CompileError> {
        let scrutinee = node.left().ok_or_else(|| statement_shape_error(node, "switch"))?;
        let (mut instructions, result) = self.lower_condition(symbols, &scrutinee)?;
        let cases = node
            .right()
            .map(|block| block.left_list())
            .unwrap_or_default();
        for case in cases {
            if case.root_str() != "case" {
                continue;
            }
            let constant = case.left().ok_or_else(|| statement_shape_error(node, "case"))?;
            let literal = match constant.tag() {
                "number_literal" => Literal::Int(constant.root_int()),
                "constant_literal" => {
                    Literal::Char(constant.root_str().bytes().next().unwrap_or(0))
                }
                _ => {
                    return Err(CompileError::new(
                        ErrorKind::InvalidRvalueType,
                        "switch case requires a constant",
                        constant.root_str(),
                    ));
                }
            };
            self.counters.temporary += 1;
            let comparison = format!("_t{}", self.counters.temporary);
            let skip_label = self.next_label();
            instructions.push_back(make_quadruple(
                Instruction::Variable,
                comparison.clone(),
                format!("{} == {}", result, literal.to_canonical()),
                "",
            ));
            push_branch(&mut instructions, &comparison, &skip_label);
            for statement in case.right_list() {
                instructions.extend(self.build_from_statement(symbols, &statement)?);
            }
            instructions.push_back(make_quadruple(Instruction::Label, skip_label, "", ""));
        }
        Ok(instructions)
    }

    fn build_from_goto_statement(
        &mut self,
        node: &AstNode<'_>,
    ) -> Result<Instructions, CompileError> {
        let target = node
            .left()
            .map(|n| n.root_str().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| statement_shape_error(node, "goto"))?;
        let mut instructions = Instructions::new();
        instructions.push_back(make_quadruple(Instruction::Goto, target, "", ""));
        Ok(instructions)
    }

    fn build_from_label_statement(
        &mut self,
        symbols: &mut SymbolTable,
        node: &AstNode<'_>,
    ) -> Result<Instructions, CompileError> {
        let name = node
            .left()
            .map(|n| n.root_str().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| statement_shape_error(node, "label"))?;
        let mut instructions = Instructions::new();
        instructions.push_back(make_quadruple(Instruction::Label, name, "", ""));
        if let Some(body) = node.right() {
            instructions.extend(self.build_from_statement(symbols, &body)?);
        }
        Ok(instructions)
    }

    fn build_from_return_statement(
        &mut self,
        symbols: &mut SymbolTable,
        node: &AstNode<'_>,
    ) -> Result<Instructions, CompileError> {
        let mut instructions = Instructions::new();
        let value = match node.left() {
            Some(expression) => {
                let (lowered, result) = self.lower_rvalue(symbols, &expression)?;
                instructions.extend(lowered);
                result.unwrap_or_default()
            }
            None => String::new(),
        };
        instructions.push_back(make_quadruple(Instruction::Return, value, "", ""));
        instructions.push_back(make_quadruple(Instruction::Leave, "", "", ""));
        Ok(instructions)
    }

    /// One rvalue statement: each expression line is parsed, shunted
    /// and lowered in source order.
    fn build_from_rvalue_statement(
        &mut self,
        symbols: &mut SymbolTable,
        node: &AstNode<'_>,
    ) -> Result<Instructions, CompileError> {
        let mut instructions = Instructions::new();
        for line in node.left_list() {
            // a line may itself be a list of expressions
            let expressions: Vec<AstNode<'_>> = match line.raw().as_array() {
                Some(items) => items.iter().map(AstNode::new).collect(),
                None => vec![line],
            };
            for expression in expressions {
                self.counters.parameter_size = 0;
                let (lowered, _) = self.lower_rvalue(symbols, &expression)?;
                instructions.extend(lowered);
            }
        }
        Ok(instructions)
    }

    /// Parse, shunt and lower one expression node.
    fn lower_rvalue(
        &mut self,
        symbols: &mut SymbolTable,
        node: &AstNode<'_>,
    ) -> Result<(Instructions, Option<String>), CompileError> {
        let expression = {
            let mut parser =
                ExpressionParser::new(self.internal_symbols, symbols, &mut self.globals);
            parser.parse(*node)?
        };
        let queue = queue_from_expression(
            &Expression::shared(expression),
            &mut self.counters.parameter_size,
            &mut self.counters.parameter_ident,
        );
        expression_queue_to_instructions(
            queue,
            &mut self.counters.temporary,
            &mut self.counters.label,
        )
    }

    /// Lower a branch condition, guaranteeing a result operand.
    fn lower_condition(
        &mut self,
        symbols: &mut SymbolTable,
        node: &AstNode<'_>,
    ) -> Result<(Instructions, String), CompileError> {
        let (instructions, result) = self.lower_rvalue(symbols, node)?;
        let result = result.ok_or_else(|| {
            CompileError::new(
                ErrorKind::InvalidRvalueType,
                "branch condition has no value",
                node.root_str(),
            )
        })?;
        Ok((instructions, result))
    }

    fn next_label(&mut self) -> String {
        self.counters.label += 1;
        format!("_L{}", self.counters.label)
    }
}

/// The `CMP` against zero plus the equality branch every control-flow
/// statement lowers through.
fn push_branch(instructions: &mut Instructions, condition: &str, target: &str) {
    instructions.push_back(make_quadruple(
        Instruction::Cmp,
        condition,
        "(0:int:4)",
        "",
    ));
    instructions.push_back(make_quadruple(
        Instruction::If,
        format!("{} == (0:int:4)", condition),
        target,
        "",
    ));
}

fn statement_shape_error(node: &AstNode<'_>, statement: &str) -> CompileError {
    CompileError::new(
        ErrorKind::InvalidRvalueType,
        format!("malformed `{}` statement", statement),
        node.root_str(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instructions_to_string;
    use serde_json::json;

    fn symbol_map(entries: serde_json::Value) -> SymbolMap {
        SymbolMap::from_value(entries).unwrap()
    }

    fn assignment(name: &str, value: serde_json::Value) -> serde_json::Value {
        json!({
            "node": "assignment_expression",
            "root": ["=", null],
            "left": {"node": "lvalue", "root": name},
            "right": value
        })
    }

    fn main_with(statements: Vec<serde_json::Value>) -> serde_json::Value {
        json!({
            "node": "function_definition",
            "root": "main",
            "left": [null],
            "right": {
                "node": "statement",
                "root": "block",
                "left": statements
            }
        })
    }

    fn build(ast: serde_json::Value, symbols: SymbolMap) -> BuildResult {
        let builder = IrBuilder::new(&symbols);
        builder.build(AstNode::new(&ast)).unwrap()
    }

    #[test]
    fn test_scalar_arithmetic_function() {
        // main() { auto x; x = 5 + 5 * 2; }
        let ast = main_with(vec![
            json!({"node": "statement", "root": "auto",
                   "left": [{"node": "lvalue", "root": "x"}]}),
            json!({"node": "statement", "root": "rvalue",
                   "left": [[assignment("x", json!({
                       "node": "relation_expression",
                       "root": ["+"],
                       "left": {"node": "number_literal", "root": 5},
                       "right": {
                           "node": "relation_expression",
                           "root": ["*"],
                           "left": {"node": "number_literal", "root": 5},
                           "right": {"node": "number_literal", "root": 2}
                       }
                   }))]]}),
        ]);
        let result = build(ast, symbol_map(json!({
            "main": {"type": "function_definition", "line": 1}
        })));
        assert_eq!(
            instructions_to_string(&result.instructions),
            "LABEL __main:\n\
             FUNC_START;\n\
             _t1 = (5:int:4) * (2:int:4);\n\
             _t2 = (5:int:4) + _t1;\n\
             x = _t2;\n\
             FUNC_END;\n"
        );
        assert!(result.objects.declared["__main"].is_defined("x"));
    }

    #[test]
    fn test_ternary_statement() {
        // main() { auto a, x; x = (a > 1) ? 2 : 3; }
        let ast = main_with(vec![
            json!({"node": "statement", "root": "auto",
                   "left": [{"node": "lvalue", "root": "a"},
                            {"node": "lvalue", "root": "x"}]}),
            json!({"node": "statement", "root": "rvalue",
                   "left": [[assignment("x", json!({
                       "node": "relation_expression",
                       "root": [">"],
                       "left": {"node": "lvalue", "root": "a"},
                       "right": {
                           "node": "ternary_expression",
                           "root": {"node": "number_literal", "root": 1},
                           "left": {"node": "number_literal", "root": 2},
                           "right": {"node": "number_literal", "root": 3}
                       }
                   }))]]}),
        ]);
        let result = build(ast, symbol_map(json!({
            "main": {"type": "function_definition", "line": 1}
        })));
        let text = instructions_to_string(&result.instructions);
        assert!(text.contains("_t1 = a > (1:int:4);"));
        assert!(text.contains("IF _t1 == (0:int:4) GOTO _L1;"));
        assert!(text.contains("x = (2:int:4);"));
        assert!(text.contains("GOTO _L2;"));
        assert!(text.contains("LABEL _L1:"));
        assert!(text.contains("x = (3:int:4);"));
        assert!(text.contains("LABEL _L2:"));
    }

    #[test]
    fn test_while_statement() {
        // main() { auto i; while (i < 3) i = i + 1; }
        let ast = main_with(vec![
            json!({"node": "statement", "root": "auto",
                   "left": [{"node": "lvalue", "root": "i"}]}),
            json!({"node": "statement", "root": "while",
                   "left": {
                       "node": "relation_expression",
                       "root": ["<"],
                       "left": {"node": "lvalue", "root": "i"},
                       "right": {"node": "number_literal", "root": 3}
                   },
                   "right": {"node": "statement", "root": "rvalue",
                             "left": [[assignment("i", json!({
                                 "node": "relation_expression",
                                 "root": ["+"],
                                 "left": {"node": "lvalue", "root": "i"},
                                 "right": {"node": "number_literal", "root": 1}
                             }))]]}}),
        ]);
        let result = build(ast, symbol_map(json!({
            "main": {"type": "function_definition", "line": 1}
        })));
        let text = instructions_to_string(&result.instructions);
        assert!(text.contains("LABEL _L1:"));
        assert!(text.contains("_t1 = i < (3:int:4);"));
        assert!(text.contains("CMP _t1 (0:int:4);"));
        assert!(text.contains("IF _t1 == (0:int:4) GOTO _L2;"));
        assert!(text.contains("GOTO _L1;"));
        assert!(text.contains("LABEL _L2:"));
    }

    #[test]
    fn test_return_statement() {
        // main() { auto x; x = 42; return(x); }
        let ast = main_with(vec![
            json!({"node": "statement", "root": "auto",
                   "left": [{"node": "lvalue", "root": "x"}]}),
            json!({"node": "statement", "root": "rvalue",
                   "left": [[assignment("x", json!({"node": "number_literal", "root": 42}))]]}),
            json!({"node": "statement", "root": "return",
                   "left": {"node": "lvalue", "root": "x"}}),
        ]);
        let result = build(ast, symbol_map(json!({
            "main": {"type": "function_definition", "line": 1}
        })));
        let text = instructions_to_string(&result.instructions);
        assert!(text.contains("RET x;"));
        assert!(text.contains("LEAVE;"));
    }

    #[test]
    fn test_parameters_registered_in_order() {
        let ast = json!({
            "node": "function_definition",
            "root": "add",
            "left": [{"node": "lvalue", "root": "a"},
                     {"node": "lvalue", "root": "b"}],
            "right": {"node": "statement", "root": "block", "left": []}
        });
        let result = build(ast, symbol_map(json!({
            "add": {"type": "function_definition", "line": 1}
        })));
        let func_start = result
            .instructions
            .iter()
            .find(|q| q.op == Instruction::FuncStart)
            .unwrap();
        assert_eq!(func_start.b, "a,b");
        let declared = &result.objects.declared["__add"];
        assert_eq!(declared.get("a").unwrap().1, "word");
        assert_eq!(declared.get("b").unwrap().1, "word");
    }

    #[test]
    fn test_auto_vector_registers_object() {
        let ast = main_with(vec![json!({
            "node": "statement", "root": "auto",
            "left": [{"node": "vector_lvalue", "root": "v",
                      "left": {"node": "number_literal", "root": 10}}]
        })]);
        let result = build(ast, symbol_map(json!({
            "main": {"type": "function_definition", "line": 1}
        })));
        let vector = &result.objects.vectors["v"];
        assert_eq!(vector.size, 10);
        assert!(vector.data.contains_key("0"));
    }

    #[test]
    fn test_oversized_vector_rejected() {
        let ast = main_with(vec![json!({
            "node": "statement", "root": "auto",
            "left": [{"node": "vector_lvalue", "root": "v",
                      "left": {"node": "number_literal", "root": 1001}}]
        })]);
        let symbols = symbol_map(json!({
            "main": {"type": "function_definition", "line": 1}
        }));
        let builder = IrBuilder::new(&symbols);
        let err = builder.build(AstNode::new(&ast)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfRangeVector);
    }

    #[test]
    fn test_extrn_imports_global() {
        let definitions = json!({
            "node": "definitions",
            "root": "definitions",
            "left": [
                {"node": "vector_definition", "root": "table",
                 "left": {"node": "number_literal", "root": 4}},
                main_with(vec![
                    json!({"node": "statement", "root": "extrn",
                           "left": [{"node": "lvalue", "root": "table"}]}),
                ])
            ]
        });
        let result = build(definitions, symbol_map(json!({
            "main": {"type": "function_definition", "line": 1},
            "table": {"type": "vector_definition", "line": 1}
        })));
        assert!(result.objects.vectors.contains_key("table"));
        assert!(result.objects.declared["__main"].is_defined("table"));
    }

    #[test]
    fn test_extrn_unknown_symbol_fails() {
        let ast = main_with(vec![json!({
            "node": "statement", "root": "extrn",
            "left": [{"node": "lvalue", "root": "mystery"}]
        })]);
        let symbols = symbol_map(json!({
            "main": {"type": "function_definition", "line": 1}
        }));
        let builder = IrBuilder::new(&symbols);
        let err = builder.build(AstNode::new(&ast)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UndeclaredIdentifier);
    }

    #[test]
    fn test_switch_chains_comparisons() {
        // main() { auto x; switch (x) { case 1: x = 2; case 2: x = 3; } }
        let ast = main_with(vec![
            json!({"node": "statement", "root": "auto",
                   "left": [{"node": "lvalue", "root": "x"}]}),
            json!({"node": "statement", "root": "switch",
                   "left": {"node": "lvalue", "root": "x"},
                   "right": {"node": "statement", "root": "block", "left": [
                       {"node": "statement", "root": "case",
                        "left": {"node": "number_literal", "root": 1},
                        "right": [{"node": "statement", "root": "rvalue",
                                   "left": [[assignment("x", json!({"node": "number_literal", "root": 2}))]]}]},
                       {"node": "statement", "root": "case",
                        "left": {"node": "number_literal", "root": 2},
                        "right": [{"node": "statement", "root": "rvalue",
                                   "left": [[assignment("x", json!({"node": "number_literal", "root": 3}))]]}]}
                   ]}}),
        ]);
        let result = build(ast, symbol_map(json!({
            "main": {"type": "function_definition", "line": 1}
        })));
        let text = instructions_to_string(&result.instructions);
        assert!(text.contains("_t1 = x == (1:int:4);"));
        assert!(text.contains("_t2 = x == (2:int:4);"));
        assert!(text.contains("IF _t1 == (0:int:4) GOTO _L1;"));
        assert!(text.contains("IF _t2 == (0:int:4) GOTO _L2;"));
    }

    #[test]
    fn test_goto_and_label() {
        let ast = main_with(vec![
            json!({"node": "statement", "root": "label",
                   "left": {"node": "lvalue", "root": "top"}}),
            json!({"node": "statement", "root": "goto",
                   "left": {"node": "lvalue", "root": "top"}}),
        ]);
        let result = build(ast, symbol_map(json!({
            "main": {"type": "function_definition", "line": 1}
        })));
        let text = instructions_to_string(&result.instructions);
        assert!(text.contains("LABEL top:"));
        assert!(text.contains("GOTO top;"));
    }
}
