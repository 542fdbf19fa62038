//! Expression parser.
//!
//! Top-down parse of rvalue AST nodes into the algebraic `Expression`
//! model. This is a pure tree-to-tree rewrite; the only side effect is
//! hoisting forward-referenced function names into the global table as
//! pointer-sized `word` entries.

use crate::ast::{AstNode, SymbolMap};
use crate::util::unescape_string;
use credence_core::error::{CompileError, ErrorKind};
use credence_core::operators::{Operator, binary_operator_from_symbol};
use credence_core::symbol::SymbolTable;
use credence_core::values::{Expression, LValue, Literal, word_data_type};

const UNARY_TAGS: [&str; 5] = [
    "pre_inc_dec_expression",
    "post_inc_dec_expression",
    "address_of_expression",
    "unary_indirection",
    "unary_expression",
];

pub struct ExpressionParser<'a> {
    internal_symbols: &'a SymbolMap,
    symbols: &'a mut SymbolTable,
    globals: &'a mut SymbolTable,
}

impl<'a> ExpressionParser<'a> {
    pub fn new(
        internal_symbols: &'a SymbolMap,
        symbols: &'a mut SymbolTable,
        globals: &'a mut SymbolTable,
    ) -> Self {
        ExpressionParser {
            internal_symbols,
            symbols,
            globals,
        }
    }

    /// Whether an lvalue node's name is declared in the active tables.
    pub fn is_symbol(&self, node: &AstNode<'_>) -> bool {
        let name = lvalue_base_name(node);
        self.symbols.is_defined(&name) || self.globals.is_defined(&name)
    }

    /// Whether the source symbol map knows this name at all.
    pub fn is_defined(&self, label: &str) -> bool {
        self.internal_symbols.contains(label)
    }

    pub fn parse(&mut self, node: AstNode<'_>) -> Result<Expression, CompileError> {
        match node.tag() {
            "constant_literal" | "number_literal" | "string_literal" => {
                Ok(Expression::Literal(self.from_constant_expression(&node)?))
            }
            "lvalue" | "vector_lvalue" | "indirect_lvalue" => {
                Ok(Expression::LValue(self.from_lvalue_expression(&node)?))
            }
            "function_expression" => self.from_function_expression(&node),
            "evaluated_expression" => self.from_evaluated_expression(&node),
            "relation_expression" => self.from_relation_expression(&node),
            "ternary_expression" => self.from_standalone_ternary(&node),
            "assignment_expression" => self.from_assignment_expression(&node),
            tag if UNARY_TAGS.contains(&tag) => self.from_unary_expression(&node),
            tag => Err(CompileError::new(
                ErrorKind::InvalidRvalueType,
                format!("invalid rvalue type `{}`", tag),
                node.root_str(),
            )),
        }
    }

    fn from_constant_expression(&self, node: &AstNode<'_>) -> Result<Literal, CompileError> {
        match node.tag() {
            "number_literal" => Ok(Literal::Int(node.root_int())),
            "constant_literal" => {
                let text = node.root_str();
                let byte = text.bytes().next().unwrap_or(0);
                Ok(Literal::Char(byte))
            }
            "string_literal" => {
                let raw = node.root_str();
                let stripped = raw
                    .strip_prefix('"')
                    .and_then(|s| s.strip_suffix('"'))
                    .unwrap_or(raw);
                Ok(Literal::Str(unescape_string(stripped)))
            }
            tag => Err(CompileError::new(
                ErrorKind::InvalidRvalueType,
                format!("invalid constant expression `{}`", tag),
                node.root_str(),
            )),
        }
    }

    /// Resolve an lvalue node, hoisting function names the symbol map
    /// knows about and rejecting anything else undeclared.
    fn from_lvalue_expression(&mut self, node: &AstNode<'_>) -> Result<LValue, CompileError> {
        let base = lvalue_base_name(node);
        if !self.symbols.is_defined(&base) && !self.globals.is_defined(&base) {
            if self.internal_symbols.is_function(&base) {
                self.globals.set(base.clone(), word_data_type());
            } else {
                return Err(CompileError::new(
                    ErrorKind::UndeclaredIdentifier,
                    "identifier not defined, did you forget to declare with auto or extrn? \
                     No symbol found",
                    base.clone(),
                )
                .with_optional_span(self.internal_symbols.span(&base)));
            }
        }
        let value = self
            .symbols
            .get(&base)
            .or_else(|| self.globals.get(&base))
            .cloned()
            .unwrap_or_else(word_data_type);

        let name = match node.tag() {
            "indirect_lvalue" => format!("*{}", base),
            "vector_lvalue" => match node.left() {
                Some(offset) => format!("{}[{}]", base, subscript_text(&offset)),
                None => base,
            },
            _ => base,
        };
        Ok(LValue::with_value(name, value))
    }

    fn from_function_expression(&mut self, node: &AstNode<'_>) -> Result<Expression, CompileError> {
        let callee_node = node.left().ok_or_else(|| {
            CompileError::new(
                ErrorKind::InvalidRvalueType,
                "function expression has no callee",
                node.root_str(),
            )
        })?;
        let callee = self.from_lvalue_expression(&callee_node)?;
        let params = node.right_list();
        // a call whose only parameter is the null token takes no arguments
        let mut arguments = Vec::new();
        if !(params.len() == 1 && params[0].is_null()) {
            for param in params {
                arguments.push(self.parse(param)?.shared());
            }
        }
        Ok(Expression::Function(callee, arguments))
    }

    fn from_evaluated_expression(&mut self, node: &AstNode<'_>) -> Result<Expression, CompileError> {
        let inner = AstNode::new(node.root());
        Ok(Expression::Pointer(self.parse(inner)?.shared()))
    }

    fn from_relation_expression(&mut self, node: &AstNode<'_>) -> Result<Expression, CompileError> {
        if let Some(right) = node.right()
            && right.tag() == "ternary_expression"
        {
            return self.from_ternary_expression(node);
        }
        let symbol = node.root_operator().unwrap_or("");
        let op = binary_operator_from_symbol(symbol).ok_or_else(|| {
            CompileError::new(
                ErrorKind::InvalidBinaryOperator,
                format!("invalid binary operator `{}`", symbol),
                symbol,
            )
        })?;
        let left = node.left().ok_or_else(|| relation_shape_error(node))?;
        let right = node.right().ok_or_else(|| relation_shape_error(node))?;
        Ok(Expression::Relation(
            op,
            vec![self.parse(left)?.shared(), self.parse(right)?.shared()],
        ))
    }

    /// A relation whose right child is a ternary: four-element relation
    /// `[condition-lhs, condition-rhs, then-value, else-value]` keyed by
    /// the condition's relational operator.
    fn from_ternary_expression(&mut self, node: &AstNode<'_>) -> Result<Expression, CompileError> {
        let symbol = node.root_operator().unwrap_or("");
        let op = binary_operator_from_symbol(symbol).ok_or_else(|| {
            CompileError::new(
                ErrorKind::InvalidBinaryOperator,
                format!("invalid binary operator `{}`", symbol),
                symbol,
            )
        })?;
        let ternary = node.right().ok_or_else(|| relation_shape_error(node))?;
        let condition_lhs = node.left().ok_or_else(|| relation_shape_error(node))?;
        let condition_rhs = AstNode::new(ternary.root());
        let then_value = ternary.left().ok_or_else(|| relation_shape_error(node))?;
        let else_value = ternary.right().ok_or_else(|| relation_shape_error(node))?;
        Ok(Expression::Relation(
            op,
            vec![
                self.parse(condition_lhs)?.shared(),
                self.parse(condition_rhs)?.shared(),
                self.parse(then_value)?.shared(),
                self.parse(else_value)?.shared(),
            ],
        ))
    }

    /// A bare ternary whose condition is not a relation: the condition
    /// is compared against zero, B truthiness.
    fn from_standalone_ternary(&mut self, node: &AstNode<'_>) -> Result<Expression, CompileError> {
        let condition = node.left().ok_or_else(|| relation_shape_error(node))?;
        let values = node.right().ok_or_else(|| relation_shape_error(node))?;
        let then_value = values.left().ok_or_else(|| relation_shape_error(node))?;
        let else_value = values.right().ok_or_else(|| relation_shape_error(node))?;
        Ok(Expression::Relation(
            Operator::Ne,
            vec![
                self.parse(condition)?.shared(),
                Expression::Literal(Literal::Int(0)).shared(),
                self.parse(then_value)?.shared(),
                self.parse(else_value)?.shared(),
            ],
        ))
    }

    fn from_unary_expression(&mut self, node: &AstNode<'_>) -> Result<Expression, CompileError> {
        let symbol = node.root_operator().unwrap_or("");
        let (op, operand) = match node.tag() {
            "pre_inc_dec_expression" => {
                let op = match symbol {
                    "++" => Operator::PreInc,
                    "--" => Operator::PreDec,
                    other => return Err(unary_operator_error(other)),
                };
                (op, node.left())
            }
            "post_inc_dec_expression" => {
                let op = match symbol {
                    "++" => Operator::PostInc,
                    "--" => Operator::PostDec,
                    other => return Err(unary_operator_error(other)),
                };
                (op, node.right())
            }
            "address_of_expression" => {
                if symbol != "&" {
                    return Err(unary_operator_error(symbol));
                }
                (Operator::AddrOf, node.left())
            }
            "unary_indirection" => (Operator::Indirection, node.left()),
            _ => {
                let op = match symbol {
                    "!" => Operator::Not,
                    "~" => Operator::Complement,
                    "-" => Operator::UnaryMinus,
                    "+" => Operator::UnaryPlus,
                    "*" => Operator::Indirection,
                    "&" => Operator::AddrOf,
                    other => return Err(unary_operator_error(other)),
                };
                (op, node.left())
            }
        };
        let operand = operand.ok_or_else(|| {
            CompileError::new(
                ErrorKind::InvalidUnaryOperator,
                "unary expression has no operand",
                symbol,
            )
        })?;
        Ok(Expression::Unary(op, self.parse(operand)?.shared()))
    }

    fn from_assignment_expression(
        &mut self,
        node: &AstNode<'_>,
    ) -> Result<Expression, CompileError> {
        let left = node.left().ok_or_else(|| relation_shape_error(node))?;
        let right = node.right().ok_or_else(|| relation_shape_error(node))?;
        if !self.is_symbol(&left) {
            let name = lvalue_base_name(&left);
            return Err(CompileError::new(
                ErrorKind::UndeclaredIdentifier,
                "identifier of assignment not declared with 'auto' or 'extrn'",
                name.clone(),
            )
            .with_optional_span(self.internal_symbols.span(&name)));
        }
        let lvalue = self.from_lvalue_expression(&left)?;
        let rvalue = self.parse(right)?.shared();
        Ok(Expression::Symbol(lvalue, rvalue))
    }
}

/// The identifier an lvalue-shaped node names, before any `*`/`[]`
/// decoration.
fn lvalue_base_name(node: &AstNode<'_>) -> String {
    match node.tag() {
        "indirect_lvalue" => node
            .left()
            .map(|inner| inner.root_str().to_string())
            .unwrap_or_default(),
        _ => node.root_str().to_string(),
    }
}

fn subscript_text(offset: &AstNode<'_>) -> String {
    match offset.tag() {
        "number_literal" => offset.root_int().to_string(),
        _ => offset.root_str().to_string(),
    }
}

fn relation_shape_error(node: &AstNode<'_>) -> CompileError {
    CompileError::new(
        ErrorKind::InvalidRvalueType,
        format!("malformed `{}` node", node.tag()),
        node.root_str(),
    )
}

fn unary_operator_error(symbol: &str) -> CompileError {
    CompileError::new(
        ErrorKind::InvalidUnaryOperator,
        format!("invalid unary operator `{}`", symbol),
        symbol,
    )
}
