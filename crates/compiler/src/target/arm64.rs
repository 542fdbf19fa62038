//! ARM64 assembly emission (AAPCS64 frames).
//!
//! Locals live below the frame pointer `x29` in 8-byte slots.
//! Expression results flow through the `x8`/`x9` scratch family; the
//! register width is selected per operand size through
//! `RegisterTraits` (`w8` for sub-word storage), with the operand size
//! resolved against the frame by the checker's size query. `CMP`/`IF`
//! pairs lower to `cmp`/`b.eq`. Frames whose address range holds no
//! `CALL` take a leaf prologue that skips saving the link register.

use crate::ir::checker;
use crate::ir::object::{Frame, ObjectTable};
use crate::ir::{Instructions, Quadruple};
use crate::target::{IrVisitor, RegisterTraits};
use credence_core::error::{CompileError, ErrorKind};
use credence_core::values::{self, WORD_SIZE};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    X8,
    W8,
    X9,
    W9,
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Register::X8 => "x8",
            Register::W8 => "w8",
            Register::X9 => "x9",
            Register::W9 => "w9",
        };
        write!(f, "{}", name)
    }
}

pub struct Arm64RegisterTraits;

impl RegisterTraits for Arm64RegisterTraits {
    type Register = Register;

    fn default_accumulator() -> Register {
        Register::X8
    }

    fn accumulator_for(size: usize) -> Register {
        if size == 8 { Register::X8 } else { Register::W8 }
    }

    fn second_register_for(size: usize) -> Register {
        if size == 8 { Register::X9 } else { Register::W9 }
    }
}

fn load_mnemonic(size: usize) -> &'static str {
    if size == 1 { "ldrb" } else { "ldr" }
}

fn store_mnemonic(size: usize) -> &'static str {
    if size == 1 { "strb" } else { "str" }
}

fn return_register(size: usize) -> &'static str {
    if size == 8 { "x0" } else { "w0" }
}

fn scratch_third(size: usize) -> &'static str {
    if size == 8 { "x10" } else { "w10" }
}

pub struct CodeGenerator<'a> {
    objects: &'a ObjectTable,
    output: Vec<String>,
    current_frame: Option<String>,
    offsets: HashMap<String, i64>,
    string_labels: HashMap<String, String>,
    call_frames: BTreeSet<String>,
    frame_reserve: u32,
    frame_is_leaf: bool,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(objects: &'a ObjectTable, instructions: &Instructions) -> Self {
        let string_labels = objects
            .strings
            .iter()
            .enumerate()
            .map(|(index, text)| (text.clone(), format!(".Lstr{}", index)))
            .collect();
        // frames whose address range holds a CALL must save the link
        // register; the rest take the leaf prologue
        let call_frames = objects
            .functions
            .keys()
            .filter(|label| objects.frame_contains_call(label, instructions))
            .cloned()
            .collect();
        CodeGenerator {
            objects,
            output: vec![".text".to_string()],
            current_frame: None,
            offsets: HashMap::new(),
            string_labels,
            call_frames,
            frame_reserve: 16,
            frame_is_leaf: true,
        }
    }

    pub fn finish(mut self) -> String {
        if !self.string_labels.is_empty() {
            self.output.push(".data".to_string());
            let mut labels: Vec<_> = self.string_labels.iter().collect();
            labels.sort_by(|a, b| a.1.cmp(b.1));
            for (text, label) in labels {
                self.output.push(format!("{}:", label));
                self.output
                    .push(format!("    .asciz \"{}\"", text.escape_default()));
            }
        }
        let mut assembly = self.output.join("\n");
        assembly.push('\n');
        assembly
    }

    fn emit(&mut self, line: impl Into<String>) {
        self.output.push(format!("    {}", line.into()));
    }

    fn emit_label(&mut self, label: &str) {
        self.output.push(format!("{}:", label));
    }

    fn frame(&self) -> Option<&Frame> {
        self.current_frame
            .as_deref()
            .and_then(|label| self.objects.frame(label))
    }

    fn assign_offsets(&mut self, label: &str) {
        self.offsets.clear();
        if let Some(frame) = self.objects.frame(label) {
            for (index, name) in frame.locals.names().enumerate() {
                self.offsets
                    .insert(name.clone(), -(8 * (index as i64 + 1)));
            }
        }
    }

    fn offset_of(&self, name: &str) -> Result<i64, CompileError> {
        self.offsets.get(name).copied().ok_or_else(|| {
            CompileError::new(
                ErrorKind::UndeclaredIdentifier,
                "symbol has no stack slot",
                name,
            )
        })
    }

    /// Storage size of an operand: canonical literals carry it, names
    /// resolve through the frame via the checker's size query. String
    /// literals and addresses are pointer-sized.
    fn operand_size(&self, operand: &str) -> usize {
        if let Some(data) = values::data_type_from_rvalue(operand) {
            if data.1 == "string" {
                return WORD_SIZE;
            }
            return data.2;
        }
        if operand == "RET" || operand.starts_with('&') {
            return WORD_SIZE;
        }
        match self.frame() {
            Some(frame) => checker::get_size_from_local_lvalue(self.objects, frame, operand)
                .unwrap_or(WORD_SIZE),
            None => WORD_SIZE,
        }
    }

    /// Load an operand into the scratch register selected for its
    /// size. Returns the register the value landed in.
    fn load_operand(
        &mut self,
        operand: &str,
        size: usize,
        second: bool,
    ) -> Result<Register, CompileError> {
        let register = if second {
            Arm64RegisterTraits::second_register_for(size)
        } else {
            Arm64RegisterTraits::accumulator_for(size)
        };
        if let Some(data) = values::data_type_from_rvalue(operand) {
            if data.1 == "string" {
                let full = if second { Register::X9 } else { Register::X8 };
                let label = self
                    .string_labels
                    .get(&data.0)
                    .cloned()
                    .unwrap_or_else(|| ".Lstr0".to_string());
                self.emit(format!("adrp {}, {}", full, label));
                self.emit(format!("add {}, {}, :lo12:{}", full, full, label));
                return Ok(full);
            }
            self.emit(format!("mov {}, #{}", register, immediate(&data.0)));
            return Ok(register);
        }
        if operand == "RET" {
            self.emit(format!("mov {}, {}", register, return_register(size)));
            return Ok(register);
        }
        if let Some(reference) = operand.strip_prefix('*') {
            let address = if second { Register::X9 } else { Register::X8 };
            let offset = self.offset_of(reference)?;
            self.emit(format!("ldr {}, [x29, #{}]", address, offset));
            self.emit(format!(
                "{} {}, [{}]",
                load_mnemonic(size),
                register,
                address
            ));
            return Ok(register);
        }
        if let Some(reference) = operand.strip_prefix('&') {
            let full = if second { Register::X9 } else { Register::X8 };
            let offset = self.offset_of(reference)?;
            self.emit(format!("sub {}, x29, #{}", full, -offset));
            return Ok(full);
        }
        let name = values::from_lvalue_offset(operand);
        let offset = self.offset_of(&name)?;
        self.emit(format!(
            "{} {}, [x29, #{}]",
            load_mnemonic(size),
            register,
            offset
        ));
        Ok(register)
    }

    fn store_accumulator(&mut self, lvalue: &str, size: usize) -> Result<(), CompileError> {
        let accumulator = Arm64RegisterTraits::accumulator_for(size);
        if let Some(reference) = lvalue.strip_prefix('*') {
            let offset = self.offset_of(reference)?;
            self.emit(format!("ldr x9, [x29, #{}]", offset));
            self.emit(format!("{} {}, [x9]", store_mnemonic(size), accumulator));
            return Ok(());
        }
        let name = values::from_lvalue_offset(lvalue);
        let offset = self.offset_of(&name)?;
        self.emit(format!(
            "{} {}, [x29, #{}]",
            store_mnemonic(size),
            accumulator,
            offset
        ));
        Ok(())
    }

    fn binary_operation(&mut self, op: &str, size: usize) -> Result<(), CompileError> {
        let accumulator = Arm64RegisterTraits::accumulator_for(size);
        let second = Arm64RegisterTraits::second_register_for(size);
        match op {
            "+" => self.emit(format!("add {0}, {0}, {1}", accumulator, second)),
            "-" => self.emit(format!("sub {0}, {0}, {1}", accumulator, second)),
            "*" => self.emit(format!("mul {0}, {0}, {1}", accumulator, second)),
            "/" => self.emit(format!("sdiv {0}, {0}, {1}", accumulator, second)),
            "%" => {
                let third = scratch_third(size);
                self.emit(format!("sdiv {}, {}, {}", third, accumulator, second));
                self.emit(format!(
                    "msub {0}, {1}, {2}, {0}",
                    accumulator, third, second
                ));
            }
            "&" => self.emit(format!("and {0}, {0}, {1}", accumulator, second)),
            "|" => self.emit(format!("orr {0}, {0}, {1}", accumulator, second)),
            "^" => self.emit(format!("eor {0}, {0}, {1}", accumulator, second)),
            "<<" => self.emit(format!("lsl {0}, {0}, {1}", accumulator, second)),
            ">>" => self.emit(format!("asr {0}, {0}, {1}", accumulator, second)),
            "==" | "!=" | "<" | "<=" | ">" | ">=" | "&&" | "||" => {
                self.emit(format!("cmp {}, {}", accumulator, second));
                let condition = match op {
                    "==" => "eq",
                    "!=" => "ne",
                    "<" => "lt",
                    "<=" => "le",
                    ">" => "gt",
                    ">=" => "ge",
                    _ => "ne",
                };
                self.emit(format!("cset {}, {}", accumulator, condition));
            }
            other => {
                return Err(CompileError::new(
                    ErrorKind::InvalidBinaryOperator,
                    format!("unsupported binary operator `{}`", other),
                    other,
                ));
            }
        }
        Ok(())
    }

    fn emit_epilogue(&mut self) {
        if self.frame_is_leaf {
            self.emit(format!("ldr x29, [sp], #{}", self.frame_reserve));
        } else {
            self.emit(format!("ldp x29, x30, [sp], #{}", self.frame_reserve));
        }
        self.emit("ret");
    }
}

fn immediate(value: &str) -> String {
    if let Some(inner) = value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')) {
        return (inner.bytes().next().unwrap_or(0) as i64).to_string();
    }
    match value {
        "true" => "1".to_string(),
        "false" | "null" | "NULL" => "0".to_string(),
        other => other.to_string(),
    }
}

fn align16(size: u32) -> u32 {
    size.div_ceil(16) * 16
}

impl IrVisitor for CodeGenerator<'_> {
    fn from_func_start_ita(&mut self, name: &str) -> Result<(), CompileError> {
        self.current_frame = Some(name.to_string());
        self.assign_offsets(name);
        let base = self
            .objects
            .frame(name)
            .map(|frame| ((frame.locals.len() as u32) * 8).max(frame.allocation))
            .unwrap_or(0);
        self.frame_reserve = align16(base) + 16;
        self.frame_is_leaf = !self.call_frames.contains(name);
        self.output.push(format!(".globl {}", name));
        self.emit_label(name);
        if self.frame_is_leaf {
            self.emit(format!("str x29, [sp, #-{}]!", self.frame_reserve));
        } else {
            self.emit(format!("stp x29, x30, [sp, #-{}]!", self.frame_reserve));
        }
        self.emit("mov x29, sp");
        Ok(())
    }

    fn from_func_end_ita(&mut self) -> Result<(), CompileError> {
        self.current_frame = None;
        self.emit_epilogue();
        Ok(())
    }

    fn from_cmp_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError> {
        let size = self.operand_size(&inst.a);
        let accumulator = self.load_operand(&inst.a, size, false)?;
        if let Some(data) = values::data_type_from_rvalue(&inst.b) {
            self.emit(format!("cmp {}, #{}", accumulator, immediate(&data.0)));
        } else {
            let second = self.load_operand(&inst.b, size, true)?;
            self.emit(format!("cmp {}, {}", accumulator, second));
        }
        Ok(())
    }

    fn from_mov_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError> {
        let rvalue = &inst.b;
        if values::is_binary_expression(rvalue) {
            let (lhs, rhs, op) = values::from_rvalue_binary_expression(rvalue);
            let size = self.operand_size(&lhs);
            self.load_operand(&lhs, size, false)?;
            self.load_operand(&rhs, size, true)?;
            self.binary_operation(&op, size)?;
            return self.store_accumulator(&inst.a, size);
        }
        if values::is_unary_expression(rvalue) && !inst.c.is_empty() {
            let operator = values::get_unary_operator(rvalue).unwrap_or("");
            let size = self.operand_size(&inst.c);
            match operator {
                "++" | "--" => {
                    let accumulator = self.load_operand(&inst.c, size, false)?;
                    let mnemonic = if operator == "++" { "add" } else { "sub" };
                    self.emit(format!("{0} {1}, {1}, #1", mnemonic, accumulator));
                    return self.store_accumulator(&inst.c, size);
                }
                "-" => {
                    let accumulator = self.load_operand(&inst.c, size, false)?;
                    self.emit(format!("neg {0}, {0}", accumulator));
                }
                "~" => {
                    let accumulator = self.load_operand(&inst.c, size, false)?;
                    self.emit(format!("mvn {0}, {0}", accumulator));
                }
                "!" => {
                    let accumulator = self.load_operand(&inst.c, size, false)?;
                    self.emit(format!("cmp {}, #0", accumulator));
                    self.emit(format!("cset {}, eq", accumulator));
                }
                _ => {
                    // `&x` and `*p` resolve inside load_operand
                    let size = self.operand_size(rvalue);
                    self.load_operand(rvalue, size, false)?;
                    return self.store_accumulator(&inst.a, size);
                }
            }
            return self.store_accumulator(&inst.a, size);
        }
        let size = self.operand_size(rvalue);
        self.load_operand(rvalue, size, false)?;
        self.store_accumulator(&inst.a, size)
    }

    fn from_return_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError> {
        if !inst.a.is_empty() {
            let size = self.operand_size(&inst.a);
            let accumulator = self.load_operand(&inst.a, size, false)?;
            self.emit(format!("mov {}, {}", return_register(size), accumulator));
        }
        Ok(())
    }

    fn from_leave_ita(&mut self) -> Result<(), CompileError> {
        self.emit_epilogue();
        Ok(())
    }

    fn from_label_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError> {
        self.emit_label(&inst.a);
        Ok(())
    }

    fn from_call_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError> {
        let mangled = format!("__{}", inst.a);
        if self.objects.functions.contains_key(&mangled) {
            self.emit(format!("bl {}", mangled));
        } else {
            self.emit(format!("bl {}", inst.a));
        }
        Ok(())
    }

    fn from_goto_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError> {
        self.emit(format!("b {}", inst.a));
        Ok(())
    }

    fn from_if_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError> {
        self.emit(format!("b.eq {}", inst.b));
        Ok(())
    }

    fn from_jmp_e_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError> {
        self.emit(format!("b.eq {}", inst.b));
        Ok(())
    }

    fn from_push_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError> {
        // arguments ride the stack at full word width
        self.load_operand(&inst.a, WORD_SIZE, false)?;
        self.emit("str x8, [sp, #-16]!");
        Ok(())
    }

    fn from_locl_ita(&mut self, _inst: &Quadruple) -> Result<(), CompileError> {
        Ok(())
    }

    fn from_pop_ita(&mut self) -> Result<(), CompileError> {
        self.emit("ldr x8, [sp], #16");
        Ok(())
    }
}

/// Lower a validated stream to ARM64 assembly text.
pub fn emit(
    objects: &ObjectTable,
    instructions: &crate::ir::Instructions,
) -> Result<String, CompileError> {
    let mut generator = CodeGenerator::new(objects, instructions);
    crate::target::visit_instructions(&mut generator, instructions)?;
    Ok(generator.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Instruction, Instructions, make_quadruple};

    #[test]
    fn test_register_traits() {
        assert_eq!(Arm64RegisterTraits::default_accumulator(), Register::X8);
        assert_eq!(Arm64RegisterTraits::accumulator_for(4), Register::W8);
        assert_eq!(Arm64RegisterTraits::accumulator_for(8), Register::X8);
        assert_eq!(Arm64RegisterTraits::second_register_for(4), Register::W9);
    }

    #[test]
    fn test_emit_function_frame() {
        let mut objects = ObjectTable::new();
        let mut frame = Frame::new("__main");
        frame.locals.set("x", ("5".to_string(), "int".to_string(), 4));
        frame.allocation = 4;
        objects.functions.insert("__main".to_string(), frame);

        let mut instructions = Instructions::new();
        instructions.push_back(make_quadruple(Instruction::Label, "__main", "", ""));
        instructions.push_back(make_quadruple(Instruction::FuncStart, "", "", ""));
        instructions.push_back(make_quadruple(Instruction::Variable, "x", "(5:int:4)", ""));
        instructions.push_back(make_quadruple(Instruction::Return, "x", "", ""));
        instructions.push_back(make_quadruple(Instruction::Leave, "", "", ""));
        instructions.push_back(make_quadruple(Instruction::FuncEnd, "", "", ""));

        let assembly = emit(&objects, &instructions).unwrap();
        assert!(assembly.contains(".globl __main"));
        // a leaf frame saves only the frame pointer, and 4-byte int
        // storage moves through w8
        assert!(assembly.contains("str x29, [sp, #-32]!"));
        assert!(assembly.contains("mov w8, #5"));
        assert!(assembly.contains("str w8, [x29, #-8]"));
        assert!(assembly.contains("ldr w8, [x29, #-8]"));
        assert!(assembly.contains("mov w0, w8"));
        assert!(assembly.contains("ldr x29, [sp], #32"));
        assert!(assembly.contains("ret"));
    }

    #[test]
    fn test_non_leaf_frame_saves_link_register() {
        let mut objects = ObjectTable::new();
        let mut frame = Frame::new("__main");
        frame.address_location = [0, 3];
        objects.functions.insert("__main".to_string(), frame);

        let mut instructions = Instructions::new();
        instructions.push_back(make_quadruple(Instruction::Label, "__main", "", ""));
        instructions.push_back(make_quadruple(Instruction::FuncStart, "", "", ""));
        instructions.push_back(make_quadruple(Instruction::Call, "putchar", "", ""));
        instructions.push_back(make_quadruple(Instruction::FuncEnd, "", "", ""));

        let assembly = emit(&objects, &instructions).unwrap();
        assert!(assembly.contains("stp x29, x30, [sp, #-16]!"));
        assert!(assembly.contains("ldp x29, x30, [sp], #16"));
        assert!(assembly.contains("bl putchar"));
    }

    #[test]
    fn test_branch_lowering() {
        let mut objects = ObjectTable::new();
        let mut frame = Frame::new("__main");
        frame.locals.set("_t1", ("x".to_string(), "int".to_string(), 4));
        objects.functions.insert("__main".to_string(), frame);

        let mut instructions = Instructions::new();
        instructions.push_back(make_quadruple(Instruction::Label, "__main", "", ""));
        instructions.push_back(make_quadruple(Instruction::FuncStart, "", "", ""));
        instructions.push_back(make_quadruple(Instruction::Cmp, "_t1", "(0:int:4)", ""));
        instructions.push_back(make_quadruple(
            Instruction::If,
            "_t1 == (0:int:4)",
            "_L1",
            "",
        ));
        instructions.push_back(make_quadruple(Instruction::Goto, "_L2", "", ""));
        instructions.push_back(make_quadruple(Instruction::Label, "_L1", "", ""));
        instructions.push_back(make_quadruple(Instruction::Label, "_L2", "", ""));
        instructions.push_back(make_quadruple(Instruction::FuncEnd, "", "", ""));

        let assembly = emit(&objects, &instructions).unwrap();
        assert!(assembly.contains("cmp w8, #0"));
        assert!(assembly.contains("b.eq _L1"));
        assert!(assembly.contains("b _L2"));
    }

    #[test]
    fn test_long_operands_use_x_registers() {
        let mut objects = ObjectTable::new();
        let mut frame = Frame::new("__main");
        frame.locals.set("q", ("0".to_string(), "long".to_string(), 8));
        objects.functions.insert("__main".to_string(), frame);

        let mut instructions = Instructions::new();
        instructions.push_back(make_quadruple(Instruction::Label, "__main", "", ""));
        instructions.push_back(make_quadruple(Instruction::FuncStart, "", "", ""));
        instructions.push_back(make_quadruple(Instruction::Variable, "q", "(7:long:8)", ""));
        instructions.push_back(make_quadruple(Instruction::FuncEnd, "", "", ""));

        let assembly = emit(&objects, &instructions).unwrap();
        assert!(assembly.contains("mov x8, #7"));
        assert!(assembly.contains("str x8, [x29, #-8]"));
    }
}
