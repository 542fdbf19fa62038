//! Code-generation boundary.
//!
//! The validated IR and its frames are handed to a target through the
//! [`IrVisitor`] capability; each architecture implements the visitor
//! to emit its own ISA. The core never depends on the implementations.
//!
//! Example, visiting two assignments:
//!
//!   IR:        x = 5;  (x is the first local)
//!              y = x + 10;  (y is the second)
//!
//! Visitor calls:
//!   1. `from_mov_ita({lvalue: "x", rvalue: "5"})`
//!   2. `from_mov_ita({lvalue: "y", rvalue: "x + 10"})`
//!
//! x86-64 emits:  mov dword ptr [rbp - 8], 5
//!                mov eax, dword ptr [rbp - 8]
//!                add eax, 10
//!                mov dword ptr [rbp - 16], eax
//!
//! ARM64 emits:   mov w9, #5
//!                add w8, w9, #10
//!                str w8, [x29, #-16]

pub mod arm64;
pub mod x86_64;

use crate::ir::{Instruction, Instructions, Quadruple};
use credence_core::error::CompileError;

/// Per-opcode visitor a target implements to lower the IR.
pub trait IrVisitor {
    fn from_func_start_ita(&mut self, name: &str) -> Result<(), CompileError>;
    fn from_func_end_ita(&mut self) -> Result<(), CompileError>;
    fn from_cmp_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError>;
    fn from_mov_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError>;
    fn from_return_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError>;
    fn from_leave_ita(&mut self) -> Result<(), CompileError>;
    fn from_label_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError>;
    fn from_call_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError>;
    fn from_goto_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError>;
    fn from_if_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError>;
    fn from_jmp_e_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError>;
    fn from_push_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError>;
    fn from_locl_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError>;
    fn from_pop_ita(&mut self) -> Result<(), CompileError>;
}

/// Architecture-specific size→register mapping, so the shared lowering
/// never hard-codes register names.
pub trait RegisterTraits {
    type Register: Copy + std::fmt::Display;

    fn default_accumulator() -> Self::Register;
    fn accumulator_for(size: usize) -> Self::Register;
    fn second_register_for(size: usize) -> Self::Register;
}

/// Drive a visitor over a validated stream. The function label rides
/// immediately before `FUNC_START`, so plain labels inside a function
/// body dispatch to `from_label_ita` while function brackets dispatch
/// to `from_func_start_ita`.
pub fn visit_instructions(
    visitor: &mut dyn IrVisitor,
    instructions: &Instructions,
) -> Result<(), CompileError> {
    let mut pending_label: Option<&Quadruple> = None;
    for (index, instruction) in instructions.iter().enumerate() {
        match instruction.op {
            Instruction::Label => {
                let next_is_func_start = instructions
                    .get(index + 1)
                    .map(|next| next.op == Instruction::FuncStart)
                    .unwrap_or(false);
                if next_is_func_start {
                    pending_label = Some(instruction);
                } else {
                    visitor.from_label_ita(instruction)?;
                }
            }
            Instruction::FuncStart => {
                let name = pending_label.take().map(|q| q.a.as_str()).unwrap_or("");
                visitor.from_func_start_ita(name)?;
            }
            Instruction::FuncEnd => visitor.from_func_end_ita()?,
            Instruction::Cmp => visitor.from_cmp_ita(instruction)?,
            Instruction::Variable => visitor.from_mov_ita(instruction)?,
            Instruction::Return => visitor.from_return_ita(instruction)?,
            Instruction::Leave => visitor.from_leave_ita()?,
            Instruction::Call => visitor.from_call_ita(instruction)?,
            Instruction::Goto => visitor.from_goto_ita(instruction)?,
            Instruction::If => visitor.from_if_ita(instruction)?,
            Instruction::Push => visitor.from_push_ita(instruction)?,
            Instruction::Pop => visitor.from_pop_ita()?,
            Instruction::Eol | Instruction::Noop => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::make_quadruple;

    #[derive(Default)]
    struct RecordingVisitor {
        calls: Vec<String>,
    }

    impl IrVisitor for RecordingVisitor {
        fn from_func_start_ita(&mut self, name: &str) -> Result<(), CompileError> {
            self.calls.push(format!("func_start {}", name));
            Ok(())
        }
        fn from_func_end_ita(&mut self) -> Result<(), CompileError> {
            self.calls.push("func_end".to_string());
            Ok(())
        }
        fn from_cmp_ita(&mut self, _: &Quadruple) -> Result<(), CompileError> {
            self.calls.push("cmp".to_string());
            Ok(())
        }
        fn from_mov_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError> {
            self.calls.push(format!("mov {}", inst.a));
            Ok(())
        }
        fn from_return_ita(&mut self, _: &Quadruple) -> Result<(), CompileError> {
            self.calls.push("return".to_string());
            Ok(())
        }
        fn from_leave_ita(&mut self) -> Result<(), CompileError> {
            self.calls.push("leave".to_string());
            Ok(())
        }
        fn from_label_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError> {
            self.calls.push(format!("label {}", inst.a));
            Ok(())
        }
        fn from_call_ita(&mut self, _: &Quadruple) -> Result<(), CompileError> {
            self.calls.push("call".to_string());
            Ok(())
        }
        fn from_goto_ita(&mut self, _: &Quadruple) -> Result<(), CompileError> {
            self.calls.push("goto".to_string());
            Ok(())
        }
        fn from_if_ita(&mut self, _: &Quadruple) -> Result<(), CompileError> {
            self.calls.push("if".to_string());
            Ok(())
        }
        fn from_jmp_e_ita(&mut self, _: &Quadruple) -> Result<(), CompileError> {
            self.calls.push("jmp_e".to_string());
            Ok(())
        }
        fn from_push_ita(&mut self, _: &Quadruple) -> Result<(), CompileError> {
            self.calls.push("push".to_string());
            Ok(())
        }
        fn from_locl_ita(&mut self, _: &Quadruple) -> Result<(), CompileError> {
            self.calls.push("locl".to_string());
            Ok(())
        }
        fn from_pop_ita(&mut self) -> Result<(), CompileError> {
            self.calls.push("pop".to_string());
            Ok(())
        }
    }

    #[test]
    fn test_function_label_routed_to_func_start() {
        let mut instructions = Instructions::new();
        instructions.push_back(make_quadruple(Instruction::Label, "__main", "", ""));
        instructions.push_back(make_quadruple(Instruction::FuncStart, "", "", ""));
        instructions.push_back(make_quadruple(Instruction::Label, "_L1", "", ""));
        instructions.push_back(make_quadruple(Instruction::FuncEnd, "", "", ""));

        let mut visitor = RecordingVisitor::default();
        visit_instructions(&mut visitor, &instructions).unwrap();
        assert_eq!(
            visitor.calls,
            vec!["func_start __main", "label _L1", "func_end"]
        );
    }
}
