//! AST and symbol-map loading.
//!
//! The front end is external: a LALR(1) grammar in Python (the
//! `augur.parser` module) produces the AST and a companion symbol map as
//! JSON. This module wraps those documents with typed accessors. An AST
//! node is an object carrying at minimum `{"node": ..., "root": ...}`
//! with optional `left`/`right` children; the symbol map keys identifier
//! and function names to their source positions.

use credence_core::error::{CompileError, ErrorKind, SourceSpan};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

/// Borrowed accessor over one JSON AST node.
#[derive(Debug, Clone, Copy)]
pub struct AstNode<'a> {
    value: &'a Value,
}

impl<'a> AstNode<'a> {
    pub fn new(value: &'a Value) -> Self {
        AstNode { value }
    }

    pub fn raw(&self) -> &'a Value {
        self.value
    }

    /// The `node` tag, e.g. `assignment_expression`.
    pub fn tag(&self) -> &'a str {
        self.value["node"].as_str().unwrap_or("")
    }

    pub fn root(&self) -> &'a Value {
        &self.value["root"]
    }

    pub fn root_str(&self) -> &'a str {
        self.value["root"].as_str().unwrap_or("")
    }

    pub fn root_int(&self) -> i64 {
        self.value["root"].as_i64().unwrap_or(0)
    }

    /// The first element of an operator array `root`, e.g. `["=", null]`.
    pub fn root_operator(&self) -> Option<&'a str> {
        match &self.value["root"] {
            Value::Array(items) => items.first().and_then(Value::as_str),
            Value::String(op) => Some(op.as_str()),
            _ => None,
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.value.get(key).map(|v| !v.is_null()).unwrap_or(false)
    }

    pub fn child(&self, key: &str) -> Option<AstNode<'a>> {
        match self.value.get(key) {
            Some(v) if !v.is_null() => Some(AstNode::new(v)),
            _ => None,
        }
    }

    pub fn left(&self) -> Option<AstNode<'a>> {
        self.child("left")
    }

    pub fn right(&self) -> Option<AstNode<'a>> {
        self.child("right")
    }

    /// A child that is a JSON array of nodes; a bare node yields a
    /// single-element list.
    pub fn child_list(&self, key: &str) -> Vec<AstNode<'a>> {
        match self.value.get(key) {
            Some(Value::Array(items)) => items.iter().map(AstNode::new).collect(),
            Some(v) if !v.is_null() => vec![AstNode::new(v)],
            _ => Vec::new(),
        }
    }

    pub fn left_list(&self) -> Vec<AstNode<'a>> {
        self.child_list("left")
    }

    pub fn right_list(&self) -> Vec<AstNode<'a>> {
        self.child_list("right")
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }
}

/// One record of the source symbol map.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SymbolInfo {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub line: u64,
    #[serde(default)]
    pub start_pos: u64,
    #[serde(default)]
    pub column: u64,
    #[serde(default)]
    pub end_pos: u64,
    #[serde(default)]
    pub end_column: u64,
}

/// The internal source symbol map: identifier and function names with
/// their provenance. Consulted for diagnostics and for hoisting forward
/// function references, never for declaredness.
#[derive(Debug, Clone, Default)]
pub struct SymbolMap {
    entries: HashMap<String, SymbolInfo>,
    raw: Value,
}

impl SymbolMap {
    pub fn from_value(value: Value) -> Result<Self, CompileError> {
        let entries: HashMap<String, SymbolInfo> =
            serde_json::from_value(value.clone()).map_err(|e| {
                CompileError::new(
                    ErrorKind::InvalidPath,
                    format!("could not parse symbol table: {}", e),
                    "",
                )
            })?;
        Ok(SymbolMap { entries, raw: value })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&SymbolInfo> {
        self.entries.get(name)
    }

    pub fn is_function(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .map(|info| info.kind == "function_definition")
            .unwrap_or(false)
    }

    pub fn span(&self, name: &str) -> Option<SourceSpan> {
        self.entries.get(name).map(|info| SourceSpan {
            line: info.line,
            column: info.column,
            start_pos: info.start_pos,
            end_pos: info.end_pos,
            end_column: info.end_column,
        })
    }

    /// The untyped document, kept for `--debug` symbol-table dumps.
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

/// A loaded translation unit: the AST root and its symbol map.
#[derive(Debug, Clone)]
pub struct LoadedProgram {
    pub ast: Value,
    pub symbols: SymbolMap,
}

/// Read a pre-serialized `{"symbols": ..., "ast": ...}` document.
pub fn load_from_json(source: &str) -> Result<LoadedProgram, CompileError> {
    let document: Value = serde_json::from_str(source).map_err(|e| {
        CompileError::new(
            ErrorKind::InvalidPath,
            format!("could not parse ast document: {}", e),
            "",
        )
    })?;
    let symbols = SymbolMap::from_value(document["symbols"].clone())?;
    let ast = document["ast"].clone();
    if ast.is_null() {
        return Err(CompileError::new(
            ErrorKind::InvalidPath,
            "could not construct ast, document has no \"ast\" member",
            "",
        ));
    }
    Ok(LoadedProgram { ast, symbols })
}

const PYTHON_LOADER: &str = r#"
import json, sys
import augur.parser as parser
source = open(sys.argv[1]).read()
print(json.dumps({
    "symbols": json.loads(parser.get_source_program_symbol_table_as_json(source)),
    "ast": json.loads(parser.get_source_program_ast_as_json(source)),
}))
"#;

/// Shell out to the `augur.parser` front end for the AST and symbol map.
pub fn load_via_python(source_path: &Path) -> Result<LoadedProgram, CompileError> {
    let output = Command::new("python3")
        .arg("-c")
        .arg(PYTHON_LOADER)
        .arg(source_path)
        .output()
        .map_err(|e| {
            CompileError::new(
                ErrorKind::InvalidPath,
                format!("failed to run the python ast loader: {}", e),
                source_path.display().to_string(),
            )
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CompileError::new(
            ErrorKind::InvalidPath,
            format!("the python ast loader failed: {}", stderr.trim()),
            source_path.display().to_string(),
        ));
    }
    load_from_json(&String::from_utf8_lossy(&output.stdout))
}

/// Ask the front end for the pretty-printed parse tree (`--target syntax`).
pub fn load_syntax_tree(source_path: &Path) -> Result<String, CompileError> {
    let script = r#"
import sys
import augur.parser as parser
print(parser.parse_source_program_as_string(open(sys.argv[1]).read(), pretty=True))
"#;
    let output = Command::new("python3")
        .arg("-c")
        .arg(script)
        .arg(source_path)
        .output()
        .map_err(|e| {
            CompileError::new(
                ErrorKind::InvalidPath,
                format!("failed to run the python ast loader: {}", e),
                source_path.display().to_string(),
            )
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CompileError::new(
            ErrorKind::InvalidPath,
            format!("the python ast loader failed: {}", stderr.trim()),
            source_path.display().to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ast_node_accessors() {
        let value = json!({
            "node": "assignment_expression",
            "root": ["=", null],
            "left": {"node": "lvalue", "root": "x"},
            "right": {"node": "number_literal", "root": 5}
        });
        let node = AstNode::new(&value);
        assert_eq!(node.tag(), "assignment_expression");
        assert_eq!(node.root_operator(), Some("="));
        assert_eq!(node.left().unwrap().root_str(), "x");
        assert_eq!(node.right().unwrap().root_int(), 5);
        assert!(!node.has("other"));
    }

    #[test]
    fn test_child_list() {
        let value = json!({
            "node": "statement",
            "root": "auto",
            "left": [
                {"node": "lvalue", "root": "x"},
                {"node": "lvalue", "root": "y"}
            ]
        });
        let node = AstNode::new(&value);
        let idents = node.left_list();
        assert_eq!(idents.len(), 2);
        assert_eq!(idents[1].root_str(), "y");
    }

    #[test]
    fn test_symbol_map() {
        let map = SymbolMap::from_value(json!({
            "main": {"type": "function_definition", "line": 1, "start_pos": 0,
                     "column": 1, "end_pos": 4, "end_column": 5},
            "x": {"type": "number_literal", "line": 2, "start_pos": 12,
                  "column": 3, "end_pos": 13, "end_column": 4}
        }))
        .unwrap();
        assert!(map.is_function("main"));
        assert!(!map.is_function("x"));
        let span = map.span("x").unwrap();
        assert_eq!(span.line, 2);
        assert_eq!(span.column, 3);
        assert!(map.span("missing").is_none());
    }

    #[test]
    fn test_load_from_json() {
        let document = json!({
            "symbols": {"main": {"type": "function_definition"}},
            "ast": {"node": "definitions", "root": "definitions", "left": []}
        });
        let program = load_from_json(&document.to_string()).unwrap();
        assert!(program.symbols.is_function("main"));
        assert_eq!(AstNode::new(&program.ast).root_str(), "definitions");
    }

    #[test]
    fn test_load_from_json_missing_ast() {
        let err = load_from_json("{\"symbols\": {}}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidPath);
    }
}
