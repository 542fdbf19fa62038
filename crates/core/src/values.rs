//! Value representation.
//!
//! Literal values, lvalues and the recursive expression model, plus the
//! canonical textual form `(value:type:bytes)` that quadruple operand
//! strings carry between passes:
//!
//!   42     → `(42:int:4)`
//!   3.14   → `(3.14:double:8)`
//!   "hi"   → `("hi":string:2)`
//!
//! The canonical form is the wire format between the temporary emitter,
//! the context pass, the type checker and the backends; the helpers at
//! the bottom of this module parse and classify it.

use crate::operators::Operator;
use std::fmt;
use std::rc::Rc;

/// Pointer size on every supported target.
pub const WORD_SIZE: usize = 8;

/// Vector (and pointer offset) hard limit.
pub const VECTOR_MAX_SIZE: usize = 1000;

/// `(value, type-name, byte-size)`, the symbol storage format.
pub type DataType = (String, String, usize);

/// Unary operator tokens as they appear inside rvalue strings.
pub const UNARY_TOKENS: [&str; 8] = ["++", "--", "*", "&", "-", "+", "~", "!"];

/// Types a numeric unary operator may apply to.
pub const INTEGRAL_TYPES: [&str; 4] = ["int", "double", "float", "long"];

/// The storage for an uninitialized symbol.
pub fn null_data_type() -> DataType {
    ("NULL".to_string(), "null".to_string(), WORD_SIZE)
}

/// Pointer-sized storage for addresses and function references.
pub fn word_data_type() -> DataType {
    ("__WORD__".to_string(), "word".to_string(), WORD_SIZE)
}

/// A literal value with its inferred type.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Byte(u8),
    Char(u8),
    Null,
    /// Opaque pointer marker.
    Word,
    Str(String),
}

impl Literal {
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Int(_) => "int",
            Literal::Long(_) => "long",
            Literal::Float(_) => "float",
            Literal::Double(_) => "double",
            Literal::Bool(_) => "bool",
            Literal::Byte(_) => "byte",
            Literal::Char(_) => "char",
            Literal::Null => "null",
            Literal::Word => "word",
            Literal::Str(_) => "string",
        }
    }

    /// Byte size of the literal's storage. Strings take their decoded
    /// length; `word` and `null` are pointer-sized.
    pub fn size(&self) -> usize {
        match self {
            Literal::Int(_) | Literal::Float(_) => 4,
            Literal::Long(_) | Literal::Double(_) => WORD_SIZE,
            Literal::Bool(_) | Literal::Byte(_) | Literal::Char(_) => 1,
            Literal::Null | Literal::Word => WORD_SIZE,
            Literal::Str(s) => s.len(),
        }
    }

    fn value_text(&self) -> String {
        match self {
            Literal::Int(i) => i.to_string(),
            Literal::Long(i) => i.to_string(),
            Literal::Float(v) => v.to_string(),
            Literal::Double(v) => v.to_string(),
            Literal::Bool(b) => b.to_string(),
            Literal::Byte(b) => b.to_string(),
            Literal::Char(c) => format!("'{}'", *c as char),
            Literal::Null => "null".to_string(),
            Literal::Word => "__WORD__".to_string(),
            Literal::Str(s) => format!("\"{}\"", s),
        }
    }

    /// Canonical `(value:type:bytes)` rendering.
    pub fn to_canonical(&self) -> String {
        format!("({}:{}:{})", self.value_text(), self.type_name(), self.size())
    }

    /// The `(value, type, size)` triple stored in symbol tables.
    pub fn as_data_type(&self) -> DataType {
        match self {
            Literal::Null => null_data_type(),
            Literal::Word => word_data_type(),
            Literal::Str(s) => (s.clone(), "string".to_string(), s.len()),
            other => (
                other.value_text(),
                other.type_name().to_string(),
                other.size(),
            ),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical())
    }
}

/// A named storage location. Names may be plain identifiers,
/// dereferenced identifiers (prefixed `*`), or subscript forms
/// `name[offset]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LValue {
    pub name: String,
    pub value: DataType,
}

impl LValue {
    pub fn new(name: impl Into<String>) -> Self {
        LValue {
            name: name.into(),
            value: null_data_type(),
        }
    }

    pub fn with_value(name: impl Into<String>, value: DataType) -> Self {
        LValue {
            name: name.into(),
            value,
        }
    }
}

/// Shared handle to an expression subtree. Subtrees appear in both the
/// postfix deque and the operand stack during lowering, and are never
/// mutated in place.
pub type ExpressionRef = Rc<Expression>;

/// The recursive expression model the AST is parsed into.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    Array(Vec<Literal>),
    LValue(LValue),
    Unary(Operator, ExpressionRef),
    /// Two children form a binary relation; four encode a ternary as
    /// `[condition-lhs, condition-rhs, then-value, else-value]` keyed by
    /// the condition's relational operator.
    Relation(Operator, Vec<ExpressionRef>),
    Function(LValue, Vec<ExpressionRef>),
    /// An assignment `lvalue = rvalue`.
    Symbol(LValue, ExpressionRef),
    /// An evaluation-grouped subexpression (parenthesized in source).
    Pointer(ExpressionRef),
}

impl Expression {
    pub fn shared(self) -> ExpressionRef {
        Rc::new(self)
    }

    /// Operand text for leaves: the canonical literal form, or the
    /// lvalue name. Grouped expressions defer to their inner node.
    pub fn leaf_text(&self) -> Option<String> {
        match self {
            Expression::Literal(lit) => Some(lit.to_canonical()),
            Expression::LValue(lv) => Some(lv.name.clone()),
            Expression::Array(items) => items.first().map(Literal::to_canonical),
            Expression::Pointer(inner) => inner.leaf_text(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------
// Canonical rvalue-string helpers
// ---------------------------------------------------------------------

fn colon_count(rvalue: &str) -> usize {
    rvalue.matches(':').count()
}

/// Check that a symbol is in the canonical `(value:type:bytes)` form.
pub fn is_rvalue_data_type(rvalue: &str) -> bool {
    colon_count(rvalue) == 2 && rvalue.starts_with('(') && rvalue.ends_with(')')
}

/// Parse `(10:int:4)` into `("10", "int", 4)`. String values keep their
/// inner text without the surrounding quotes.
pub fn data_type_from_rvalue(rvalue: &str) -> Option<DataType> {
    if !is_rvalue_data_type(rvalue) {
        return None;
    }
    let inner = &rvalue[1..rvalue.len() - 1];
    let size_at = inner.rfind(':')?;
    let size: usize = inner[size_at + 1..].parse().ok()?;
    let type_at = inner[..size_at].rfind(':')?;
    let type_name = inner[type_at + 1..size_at].to_string();
    let mut value = inner[..type_at].to_string();
    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        value = value[1..value.len() - 1].to_string();
    }
    Some((value, type_name, size))
}

/// Render a `DataType` triple back into the canonical wire form.
pub fn data_type_to_rvalue(data: &DataType) -> String {
    if data.1 == "string" {
        format!("(\"{}\":{}:{})", data.0, data.1, data.2)
    } else {
        format!("({}:{}:{})", data.0, data.1, data.2)
    }
}

pub fn is_rvalue_data_type_string(rvalue: &str) -> bool {
    data_type_from_rvalue(rvalue).is_some_and(|d| d.1 == "string")
}

pub fn is_rvalue_data_type_word(rvalue: &str) -> bool {
    data_type_from_rvalue(rvalue).is_some_and(|d| d.1 == "word")
}

/// Check if a symbol is a temporary, i.e. `_t1`.
pub fn is_temporary(rvalue: &str) -> bool {
    let rest = match rvalue.strip_prefix("_t") {
        Some(rest) => rest,
        None => return false,
    };
    !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit())
}

/// Check if a symbol is a synthetic call-argument slot, i.e. `_p1_2`.
pub fn is_parameter_slot(rvalue: &str) -> bool {
    let rest = match rvalue.strip_prefix("_p") {
        Some(rest) => rest,
        None => return false,
    };
    let mut halves = rest.splitn(2, '_');
    let first = halves.next().unwrap_or("");
    let second = halves.next().unwrap_or("");
    !first.is_empty()
        && !second.is_empty()
        && first.bytes().all(|b| b.is_ascii_digit())
        && second.bytes().all(|b| b.is_ascii_digit())
}

/// A binary rvalue has the `lhs <op> rhs` shape with single spaces.
pub fn is_binary_expression(rvalue: &str) -> bool {
    rvalue.matches(' ').count() == 2
}

/// Split `lhs <op> rhs` into its three parts.
pub fn from_rvalue_binary_expression(rvalue: &str) -> (String, String, String) {
    let lhs_end = rvalue.find(' ').unwrap_or(rvalue.len());
    let rhs_start = rvalue.rfind(' ').map(|i| i + 1).unwrap_or(0);
    let lhs = rvalue[..lhs_end].to_string();
    let rhs = rvalue[rhs_start..].to_string();
    let op = if lhs_end + 1 < rhs_start {
        rvalue[lhs_end + 1..rhs_start - 1].to_string()
    } else {
        String::new()
    };
    (lhs, rhs, op)
}

/// A unary rvalue is `<op>name` or `name<op>`, e.g. `&x` or `x++`.
/// Canonical literals and binary expressions are not unary.
pub fn is_unary_expression(rvalue: &str) -> bool {
    if rvalue.is_empty() || rvalue.matches(' ').count() >= 2 || is_rvalue_data_type(rvalue) {
        return false;
    }
    if is_temporary(rvalue) || is_parameter_slot(rvalue) {
        return false;
    }
    UNARY_TOKENS
        .iter()
        .any(|op| rvalue.starts_with(op) || rvalue.ends_with(op))
}

/// Extract the operator token of a unary rvalue string.
pub fn get_unary_operator(rvalue: &str) -> Option<&'static str> {
    // two-character tokens first so `++x` is not read as `+`
    UNARY_TOKENS
        .iter()
        .find(|op| rvalue.starts_with(**op) || rvalue.ends_with(**op))
        .copied()
}

/// Strip unary operator characters and whitespace from the ends of an
/// rvalue string, leaving the referenced lvalue: `&x` → `x`, `y++` → `y`.
pub fn get_unary_rvalue_reference(rvalue: &str) -> String {
    rvalue
        .trim_matches(|c: char| c.is_whitespace() || "+-*&~!".contains(c))
        .to_string()
}

/// `*p`, an indirection on either side of an assignment.
pub fn is_dereference_expression(rvalue: &str) -> bool {
    rvalue.starts_with('*') && rvalue.len() > 1
}

/// A subscripted lvalue, `v[10]` or `v[ident]`.
pub fn is_vector_lvalue(rvalue: &str) -> bool {
    rvalue.contains('[') && rvalue.contains(']') && !rvalue.starts_with('[')
}

/// `v[19]` → `v`; `sidno[errno]` → `sidno`.
pub fn from_lvalue_offset(rvalue: &str) -> String {
    match rvalue.find('[') {
        Some(at) => rvalue[..at].to_string(),
        None => rvalue.to_string(),
    }
}

/// `v[20]` → `20`; `sidno[errno]` → `errno`.
pub fn from_decay_offset(rvalue: &str) -> String {
    match (rvalue.find('['), rvalue.find(']')) {
        (Some(open), Some(close)) if open < close => rvalue[open + 1..close].to_string(),
        _ => String::new(),
    }
}

pub fn is_numeric(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}
