//! Credence Core
//!
//! Shared data model for the Credence B compiler: the operator table,
//! the literal/expression value model, the symbol table, and the
//! compile-error type threaded through every pass.
//!
//! The compiler crate builds on these types to lower an abstract syntax
//! tree into a linear, typed intermediate representation of quadruples.

pub mod error;
pub mod operators;
pub mod symbol;
pub mod values;

pub use error::{CompileError, ErrorKind, SourceSpan};
pub use operators::{Associativity, Operator};
pub use symbol::SymbolTable;
pub use values::{DataType, Expression, ExpressionRef, LValue, Literal};
