//! Credence Compiler Library
//!
//! Middle-end and back-end for the historical B programming language.
//! The front end is external: it hands over a parsed AST plus a source
//! symbol map as JSON. From there the pipeline runs in stages, each
//! producing its output entirely before the next consumes it:
//!
//! 1. Expression parsing: AST nodes become algebraic `Expression`
//!    trees, then a postfix operator/operand queue (shunting-yard),
//!    then flat quadruples with fresh `_tN` temporaries.
//! 2. IR building: the statement walker stitches expression quadruples
//!    with control-flow quadruples (`LABEL`, `GOTO`, `IF`, `CMP`, …).
//! 3. Context pass: per-function frames with label sets, locals,
//!    temporaries, return slots and byte-accurate allocation.
//! 4. Type checking: every assignment validated against the frame;
//!    vector bounds, pointer targets and null dereferences enforced.
//! 5. Code generation: the validated IR is handed to a target through
//!    the `IrVisitor` boundary (x86-64 or ARM64).
//!
//! Example program:
//!
//!   main() {
//!     auto x;
//!     x = 42;
//!     return(x);
//!   }

pub mod ast;
pub mod ir;
pub mod queue;
pub mod rvalue;
pub mod target;
pub mod util;

pub use ast::{AstNode, LoadedProgram, SymbolMap};
pub use ir::builder::IrBuilder;
pub use ir::checker::TypeChecker;
pub use ir::context::ContextPass;
pub use ir::object::{Frame, ObjectTable, Vector};
pub use ir::{Instruction, Instructions, Quadruple};
pub use rvalue::ExpressionParser;
pub use target::{IrVisitor, RegisterTraits};

use credence_core::error::CompileError;
use tracing::debug;

/// A fully validated translation unit: the cleaned quadruple stream
/// plus the object table owning its frames, vectors and strings.
#[derive(Debug)]
pub struct CompiledUnit {
    pub objects: ObjectTable,
    pub instructions: Instructions,
}

/// Run the full middle-end over a loaded program.
pub fn compile(program: &LoadedProgram) -> Result<CompiledUnit, CompileError> {
    let builder = IrBuilder::new(&program.symbols);
    let built = builder.build(AstNode::new(&program.ast))?;
    debug!(quadruples = built.instructions.len(), "ir built");

    let mut objects = built.objects;
    let instructions =
        ir::context::contextualize(&mut objects, &program.symbols, built.instructions)?;
    debug!(functions = objects.functions.len(), "frames assembled");

    ir::checker::check_types(&mut objects, &program.symbols, &instructions)?;
    debug!("type check passed");

    Ok(CompiledUnit {
        objects,
        instructions,
    })
}

/// Compile and render the IR textual form, one quadruple per line.
pub fn compile_to_ir(program: &LoadedProgram) -> Result<String, CompileError> {
    let unit = compile(program)?;
    Ok(ir::instructions_to_string(&unit.instructions))
}

/// Compile and lower to x86-64 assembly.
pub fn compile_to_x86_64(program: &LoadedProgram) -> Result<String, CompileError> {
    let unit = compile(program)?;
    target::x86_64::emit(&unit.objects, &unit.instructions)
}

/// Compile and lower to ARM64 assembly.
pub fn compile_to_arm64(program: &LoadedProgram) -> Result<String, CompileError> {
    let unit = compile(program)?;
    target::arm64::emit(&unit.objects, &unit.instructions)
}
