//! x86-64 assembly emission (Intel syntax, System V frames).
//!
//! Locals live below `rbp` in 8-byte slots. Expression results flow
//! through the accumulator family; the register width is selected per
//! operand size through `RegisterTraits` (`al`/`eax`/`rax`), with the
//! operand size resolved against the frame by the checker's size
//! query. `CMP`/`IF` pairs lower to `cmp`/`je`. Frames whose address
//! range holds no `CALL` take a leaf prologue without the 16-byte call
//! alignment.

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
    Rax,
    Eax,
    Al,
    Rcx,
    Ecx,
    Cl,
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Register::Rax => "rax",
            Register::Eax => "eax",
            Register::Al => "al",
            Register::Rcx => "rcx",
            Register::Ecx => "ecx",
            Register::Cl => "cl",
        };
        write!(f, "{}", name)
    }
}

pub struct X86RegisterTraits;

impl RegisterTraits for X86RegisterTraits {
    type Register = Register;

    fn default_accumulator() -> Register {
        Register::Rax
    }

    fn accumulator_for(size: usize) -> Register {
        match size {
            1 => Register::Al,
            8 => Register::Rax,
            _ => Register::Eax,
        }
    }

    fn second_register_for(size: usize) -> Register {
        match size {
            1 => Register::Cl,
            8 => Register::Rcx,
            _ => Register::Ecx,
        }
    }
}

fn ptr_directive(size: usize) -> &'static str {
    match size {
        1 => "byte ptr",
        8 => "qword ptr",
        _ => "dword ptr",
    }
}

pub struct CodeGenerator<'a> {
    objects: &'a ObjectTable,
    output: Vec<String>,
    current_frame: Option<String>,
    offsets: HashMap<String, i64>,
    string_labels: HashMap<String, String>,
    call_frames: BTreeSet<String>,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(objects: &'a ObjectTable, instructions: &Instructions) -> Self {
        let string_labels = objects
            .strings
            .iter()
            .enumerate()
            .map(|(index, text)| (text.clone(), format!(".Lstr{}", index)))
            .collect();
        // frames whose address range holds a CALL need the aligned,
        // non-leaf prologue
        let call_frames = objects
            .functions
            .keys()
            .filter(|label| objects.frame_contains_call(label, instructions))
            .cloned()
            .collect();
        CodeGenerator {
            objects,
            output: vec![".intel_syntax noprefix".to_string(), ".text".to_string()],
            current_frame: None,
            offsets: HashMap::new(),
            string_labels,
            call_frames,
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

    /// Slot assignment for the frame's locals, 8 bytes per name.
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

    fn slot(&self, name: &str, size: usize) -> Result<String, CompileError> {
        let offset = self.offset_of(name)?;
        Ok(format!("{} [rbp - {}]", ptr_directive(size), -offset))
    }

    fn address_of(&self, name: &str) -> Result<String, CompileError> {
        let offset = self.offset_of(name)?;
        Ok(format!("[rbp - {}]", -offset))
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

    /// Load an operand into the accumulator (or the second working
    /// register), width-selected for the operand size. Returns the
    /// register the value landed in.
    fn load_operand(
        &mut self,
        operand: &str,
        size: usize,
        second: bool,
    ) -> Result<Register, CompileError> {
        let register = if second {
            X86RegisterTraits::second_register_for(size)
        } else {
            X86RegisterTraits::accumulator_for(size)
        };
        if let Some(data) = values::data_type_from_rvalue(operand) {
            if data.1 == "string" {
                let full = if second { Register::Rcx } else { Register::Rax };
                let label = self
                    .string_labels
                    .get(&data.0)
                    .cloned()
                    .unwrap_or_else(|| ".Lstr0".to_string());
                self.emit(format!("lea {}, [rip + {}]", full, label));
                return Ok(full);
            }
            self.emit(format!("mov {}, {}", register, immediate(&data.0)));
            return Ok(register);
        }
        if operand == "RET" {
            // the call left its value in the accumulator family
            if second {
                let accumulator = X86RegisterTraits::accumulator_for(size);
                self.emit(format!("mov {}, {}", register, accumulator));
            }
            return Ok(register);
        }
        if let Some(reference) = operand.strip_prefix('*') {
            let address = if second { Register::Rcx } else { Register::Rax };
            let slot = self.slot(reference, WORD_SIZE)?;
            self.emit(format!("mov {}, {}", address, slot));
            self.emit(format!(
                "mov {}, {} [{}]",
                register,
                ptr_directive(size),
                address
            ));
            return Ok(register);
        }
        if let Some(reference) = operand.strip_prefix('&') {
            let full = if second { Register::Rcx } else { Register::Rax };
            let address = self.address_of(reference)?;
            self.emit(format!("lea {}, {}", full, address));
            return Ok(full);
        }
        let name = values::from_lvalue_offset(operand);
        let slot = self.slot(&name, size)?;
        self.emit(format!("mov {}, {}", register, slot));
        Ok(register)
    }

    fn store_accumulator(&mut self, lvalue: &str, size: usize) -> Result<(), CompileError> {
        let accumulator = X86RegisterTraits::accumulator_for(size);
        if let Some(reference) = lvalue.strip_prefix('*') {
            let slot = self.slot(reference, WORD_SIZE)?;
            self.emit(format!("mov rcx, {}", slot));
            self.emit(format!("mov {} [rcx], {}", ptr_directive(size), accumulator));
            return Ok(());
        }
        let name = values::from_lvalue_offset(lvalue);
        let slot = self.slot(&name, size)?;
        self.emit(format!("mov {}, {}", slot, accumulator));
        Ok(())
    }

    fn binary_operation(&mut self, op: &str, size: usize) -> Result<(), CompileError> {
        let accumulator = X86RegisterTraits::accumulator_for(size);
        let second = X86RegisterTraits::second_register_for(size);
        match op {
            "+" => self.emit(format!("add {}, {}", accumulator, second)),
            "-" => self.emit(format!("sub {}, {}", accumulator, second)),
            "*" => self.emit(format!("imul {}, {}", accumulator, second)),
            "/" => {
                if size == 8 {
                    self.emit("cqo");
                    self.emit("idiv rcx");
                } else {
                    self.emit("cdq");
                    self.emit("idiv ecx");
                }
            }
            "%" => {
                if size == 8 {
                    self.emit("cqo");
                    self.emit("idiv rcx");
                    self.emit("mov rax, rdx");
                } else {
                    self.emit("cdq");
                    self.emit("idiv ecx");
                    self.emit("mov eax, edx");
                }
            }
            "&" => self.emit(format!("and {}, {}", accumulator, second)),
            "|" => self.emit(format!("or {}, {}", accumulator, second)),
            "^" => self.emit(format!("xor {}, {}", accumulator, second)),
            "<<" => self.emit(format!("shl {}, cl", accumulator)),
            ">>" => self.emit(format!("sar {}, cl", accumulator)),
            "==" | "!=" | "<" | "<=" | ">" | ">=" | "&&" | "||" => {
                self.emit(format!("cmp {}, {}", accumulator, second));
                let set = match op {
                    "==" => "sete",
                    "!=" => "setne",
                    "<" => "setl",
                    "<=" => "setle",
                    ">" => "setg",
                    ">=" => "setge",
                    _ => "setne",
                };
                self.emit(format!("{} al", set));
                if size > 1 {
                    self.emit(format!("movzx {}, al", accumulator));
                }
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

fn align8(size: u32) -> u32 {
    size.div_ceil(8) * 8
}

fn align16(size: u32) -> u32 {
    size.div_ceil(16) * 16
}

impl IrVisitor for CodeGenerator<'_> {
    fn from_func_start_ita(&mut self, name: &str) -> Result<(), CompileError> {
        self.current_frame = Some(name.to_string());
        self.assign_offsets(name);
        self.output.push(format!(".globl {}", name));
        self.emit_label(name);
        self.emit("push rbp");
        self.emit("mov rbp, rsp");
        let base = self
            .objects
            .frame(name)
            .map(|frame| ((frame.locals.len() as u32) * 8).max(frame.allocation))
            .unwrap_or(0);
        // leaf frames skip the call-site alignment
        let reserve = if self.call_frames.contains(name) {
            align16(base)
        } else {
            align8(base)
        };
        if reserve > 0 {
            self.emit(format!("sub rsp, {}", reserve));
        }
        Ok(())
    }

    fn from_func_end_ita(&mut self) -> Result<(), CompileError> {
        self.current_frame = None;
        self.emit("leave");
        self.emit("ret");
        Ok(())
    }

    fn from_cmp_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError> {
        let size = self.operand_size(&inst.a);
        let accumulator = self.load_operand(&inst.a, size, false)?;
        if let Some(data) = values::data_type_from_rvalue(&inst.b) {
            self.emit(format!("cmp {}, {}", accumulator, immediate(&data.0)));
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
                    let slot = self.slot(&inst.c, size)?;
                    let mnemonic = if operator == "++" { "inc" } else { "dec" };
                    self.emit(format!("{} {}", mnemonic, slot));
                    return Ok(());
                }
                "-" => {
                    let accumulator = self.load_operand(&inst.c, size, false)?;
                    self.emit(format!("neg {}", accumulator));
                }
                "~" => {
                    let accumulator = self.load_operand(&inst.c, size, false)?;
                    self.emit(format!("not {}", accumulator));
                }
                "!" => {
                    let accumulator = self.load_operand(&inst.c, size, false)?;
                    self.emit(format!("cmp {}, 0", accumulator));
                    self.emit("sete al");
                    if size > 1 {
                        self.emit(format!("movzx {}, al", accumulator));
                    }
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
            self.load_operand(&inst.a, size, false)?;
        }
        Ok(())
    }

    fn from_leave_ita(&mut self) -> Result<(), CompileError> {
        self.emit("leave");
        self.emit("ret");
        Ok(())
    }

    fn from_label_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError> {
        self.emit_label(&inst.a);
        Ok(())
    }

    fn from_call_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError> {
        let mangled = format!("__{}", inst.a);
        if self.objects.functions.contains_key(&mangled) {
            self.emit(format!("call {}", mangled));
        } else {
            self.emit(format!("call {}", inst.a));
        }
        Ok(())
    }

    fn from_goto_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError> {
        self.emit(format!("jmp {}", inst.a));
        Ok(())
    }

    fn from_if_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError> {
        // the preceding CMP set the flags; the condition text encodes
        // the relation against zero
        self.emit(format!("je {}", inst.b));
        Ok(())
    }

    fn from_jmp_e_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError> {
        self.emit(format!("je {}", inst.b));
        Ok(())
    }

    fn from_push_ita(&mut self, inst: &Quadruple) -> Result<(), CompileError> {
        // arguments ride the stack at full word width
        self.load_operand(&inst.a, WORD_SIZE, false)?;
        self.emit("push rax");
        Ok(())
    }

    fn from_locl_ita(&mut self, _inst: &Quadruple) -> Result<(), CompileError> {
        Ok(())
    }

    fn from_pop_ita(&mut self) -> Result<(), CompileError> {
        self.emit("pop rax");
        Ok(())
    }
}

/// Lower a validated stream to x86-64 assembly text.
pub fn emit(
    objects: &ObjectTable,
    instructions: &crate::ir::Instructions,
) -> Result<String, CompileError> {
    let mut generator = CodeGenerator::new(objects, instructions);
    crate::target::visit_instructions(&mut generator, instructions)?;
    Ok(generator.finish())
}
