//! Context/frame pass.
//!
//! A single linear scan over the assembled quadruple stream that builds
//! per-function frames: symbol and label sets, parameter order, the
//! temporary map, byte-accurate allocation totals and the return slot.
//! Trivially dead consecutive `GOTO`s are dropped on the way through.
//!
//! `FUNC_START` reads the function's label from the immediately
//! preceding quadruple; the pass asserts that coupling instead of
//! silently accepting a reordered stream.

use crate::ast::SymbolMap;
use crate::ir::object::{Frame, ObjectTable};
use crate::ir::{Instruction, Instructions, Quadruple};
use credence_core::error::{CompileError, ErrorKind};
use credence_core::values::{
    self, DataType, INTEGRAL_TYPES, WORD_SIZE, null_data_type, word_data_type,
};

pub struct ContextPass<'a> {
    objects: &'a mut ObjectTable,
    internal_symbols: &'a SymbolMap,
}

impl<'a> ContextPass<'a> {
    pub fn new(objects: &'a mut ObjectTable, internal_symbols: &'a SymbolMap) -> Self {
        ContextPass {
            objects,
            internal_symbols,
        }
    }

    /// Walk the master stream, building frames and dropping dead
    /// `GOTO`s. Returns the cleaned stream.
    pub fn run(mut self, instructions: Instructions) -> Result<Instructions, CompileError> {
        let mut output = Instructions::new();
        let mut last_instruction = Instruction::Noop;

        for (index, instruction) in instructions.iter().enumerate() {
            let mut skip = false;
            match instruction.op {
                Instruction::FuncStart => {
                    self.from_func_start(&instructions, index, output.len())?;
                }
                Instruction::FuncEnd => {
                    self.from_func_end(instruction, output.len() + 1);
                }
                Instruction::Label => self.from_label(instruction)?,
                Instruction::Variable => self.from_variable(instruction)?,
                Instruction::Return => self.from_return(instruction)?,
                Instruction::Push => {
                    if let Some(frame) = self.objects.stack_frame_mut() {
                        frame.stack.push(instruction.a.clone());
                    }
                }
                Instruction::Goto => {
                    if last_instruction == Instruction::Goto {
                        skip = true;
                    }
                }
                _ => {}
            }
            if !skip {
                output.push_back(instruction.clone());
                if instruction.op != Instruction::FuncEnd
                    && let Some(frame) = self.objects.stack_frame_mut()
                {
                    frame.instructions.push_back(instruction.clone());
                }
            }
            last_instruction = instruction.op;
        }
        Ok(output)
    }

    fn from_func_start(
        &mut self,
        instructions: &Instructions,
        index: usize,
        output_position: usize,
    ) -> Result<(), CompileError> {
        let label = index
            .checked_sub(1)
            .and_then(|at| instructions.get(at))
            .filter(|quadruple| quadruple.op == Instruction::Label)
            .map(|quadruple| quadruple.a.clone())
            .ok_or_else(|| {
                CompileError::new(
                    ErrorKind::InvalidRvalueType,
                    "FUNC_START is not preceded by its function label",
                    "",
                )
            })?;

        if self.objects.functions.contains_key(&label) {
            return Err(self.context_frame_error(
                ErrorKind::DuplicateSymbol,
                "function symbol is already defined",
                label.trim_start_matches('_'),
            ));
        }

        let mut frame = Frame::new(label.clone());
        frame.address_location[0] = output_position.saturating_sub(1);

        // parameters ride on the FUNC_START quadruple in declaration
        // order; each is a pointer-sized word local
        let parameter_field = &instructions[index].b;
        if !parameter_field.is_empty() {
            for parameter in parameter_field.split(',') {
                frame.parameters.push(parameter.to_string());
                frame.locals.set(parameter, word_data_type());
                frame.assigned.insert(parameter.to_string());
                frame.allocation += WORD_SIZE as u32;
            }
        }

        // seed declared-but-unassigned names so later passes can see
        // `auto` scalars, pointers and vectors before first assignment
        if let Some(declared) = self.objects.declared.get(&label) {
            for (name, data) in declared.iter() {
                if !frame.locals.is_defined(name) {
                    frame.locals.set(name.clone(), data.clone());
                }
            }
        }

        self.objects.functions.insert(label.clone(), frame);
        self.objects.set_stack_frame(Some(label));
        Ok(())
    }

    fn from_func_end(&mut self, instruction: &Quadruple, output_position: usize) {
        if let Some(frame) = self.objects.stack_frame_mut() {
            frame.instructions.push_back(instruction.clone());
            frame.address_location[1] = output_position;
        }
        self.objects.set_stack_frame(None);
    }

    fn from_label(&mut self, instruction: &Quadruple) -> Result<(), CompileError> {
        let label = instruction.a.clone();
        if let Some(frame) = self.objects.stack_frame_mut() {
            if frame.labels.contains(&label) {
                return Err(self.context_frame_error(
                    ErrorKind::DuplicateSymbol,
                    "symbol of symbolic label is already defined",
                    &label,
                ));
            }
            frame.labels.insert(label);
        }
        Ok(())
    }

    fn from_return(&mut self, instruction: &Quadruple) -> Result<(), CompileError> {
        if let Some(label) = self.objects.stack_frame_symbol().map(str::to_string) {
            self.objects.set_frame_return_value(&label, &instruction.a)?;
        }
        Ok(())
    }

    /// Classify one assignment quadruple against the active frame.
    fn from_variable(&mut self, instruction: &Quadruple) -> Result<(), CompileError> {
        if !self.objects.is_stack_frame() {
            return Ok(());
        }
        let lhs = instruction.a.clone();
        let is_unary = values::is_unary_expression(&instruction.b) && !instruction.c.is_empty();
        let rhs = if is_unary {
            instruction.c.clone()
        } else {
            instruction.b.clone()
        };

        // subscripted and dereferenced destinations belong to the type
        // checker; they do not change the frame's scalar storage
        if values::is_vector_lvalue(&lhs) || values::is_dereference_expression(&lhs) {
            return Ok(());
        }

        if values::is_temporary(&lhs) || values::is_parameter_slot(&lhs) {
            let frame = self
                .objects
                .stack_frame_mut()
                .expect("active frame checked above");
            frame
                .temporaries
                .insert(lhs.clone(), instruction.b.clone());
            let size = frame.resolve_size(&lhs);
            let resolved = resolve_frame_data(frame, &instruction.b);
            self.register_local(&lhs, (instruction.b.clone(), resolved.1, size))?;
            return Ok(());
        }

        if instruction.b.starts_with("_t") {
            return self.from_temporary_assignment(&lhs, &instruction.b);
        }

        if self.objects.hoisted_symbols.is_defined(&instruction.b) {
            return self.from_symbol_reassignment(&lhs, &instruction.b);
        }

        let frame = self
            .objects
            .stack_frame()
            .expect("active frame checked above");
        let data = if is_unary {
            let unary_operator = values::get_unary_operator(&instruction.b).unwrap_or("");
            self.from_rvalue_unary_expression(&lhs, &rhs, unary_operator, &instruction.b)?
        } else if values::is_dereference_expression(&rhs) {
            self.from_rvalue_unary_expression(&lhs, &rhs, "*", &rhs)?
        } else if frame.locals.is_defined(&rhs) && !values::is_rvalue_data_type(&rhs) {
            frame.locals.get_or_null(&rhs)
        } else {
            self.resolve_rvalue_data(&rhs)?
        };
        self.register_local(&lhs, data)
    }

    /// `lhs = _tN`: resolve the temporary's encoding and register the
    /// destination with the resolved storage.
    fn from_temporary_assignment(&mut self, lhs: &str, rhs: &str) -> Result<(), CompileError> {
        let frame = self
            .objects
            .stack_frame()
            .expect("active frame checked by caller");
        let rvalue = frame
            .temporaries
            .get(rhs)
            .cloned()
            .unwrap_or_else(|| rhs.to_string());

        if values::is_unary_expression(&rvalue) {
            let unary_operator = values::get_unary_operator(&rvalue).unwrap_or("");
            let reference = values::get_unary_rvalue_reference(&rvalue);
            let data =
                self.from_rvalue_unary_expression(lhs, &reference, unary_operator, &rvalue)?;
            return self.register_local(lhs, data);
        }

        let frame = self
            .objects
            .stack_frame()
            .expect("active frame checked by caller");
        let size = frame.resolve_size(rhs);
        let data = resolve_frame_data(frame, &rvalue);
        self.register_local(lhs, (data.0, data.1, size))
    }

    /// Reassignment from a previously declared file-scope symbol.
    fn from_symbol_reassignment(&mut self, lhs: &str, rhs: &str) -> Result<(), CompileError> {
        if self.objects.hoisted_symbols.is_pointer(rhs) {
            let target = self
                .objects
                .hoisted_symbols
                .pointer_target(rhs)
                .unwrap_or_else(|| "NULL".to_string());
            let frame = self
                .objects
                .stack_frame_mut()
                .expect("active frame checked by caller");
            frame.locals.set_pointer(lhs, target);
            frame.allocation += WORD_SIZE as u32;
            return Ok(());
        }
        let data = self.objects.hoisted_symbols.get_or_null(rhs);
        self.register_local(lhs, data)
    }

    /// Resolve the storage of a unary rvalue against the frame.
    fn from_rvalue_unary_expression(
        &self,
        lvalue: &str,
        rvalue: &str,
        unary_operator: &str,
        full_rvalue: &str,
    ) -> Result<DataType, CompileError> {
        let (rvalue, unary_operator) = if full_rvalue.contains('*') {
            (full_rvalue.trim_start_matches('*').to_string(), "*")
        } else {
            (rvalue.to_string(), unary_operator)
        };
        let frame = self
            .objects
            .stack_frame()
            .expect("active frame checked by caller");
        match unary_operator {
            "*" => {
                if !frame.locals.is_pointer(&rvalue) {
                    return Err(self.context_frame_error(
                        ErrorKind::InvalidPointerAssignment,
                        format!(
                            "indirection on invalid lvalue, right-hand-side is not a pointer \
                             (`{}`)",
                            rvalue
                        ),
                        lvalue,
                    ));
                }
                let target = frame
                    .locals
                    .pointer_target(&rvalue)
                    .unwrap_or_else(|| "NULL".to_string());
                if target == "NULL" {
                    // a null indirection is the type checker's rejection
                    return Ok(null_data_type());
                }
                if !frame.locals.is_defined(&target) {
                    return Err(self.context_frame_error(
                        ErrorKind::InvalidPointerAssignment,
                        "invalid indirection assignment",
                        lvalue,
                    ));
                }
                Ok(frame.locals.get_or_null(&target))
            }
            "&" => {
                // address-of a literal passes through for the checker
                if !values::is_rvalue_data_type(&rvalue) && !frame.locals.is_defined(&rvalue) {
                    return Err(self.context_frame_error(
                        ErrorKind::InvalidPointerAssignment,
                        format!(
                            "invalid pointer assignment, right-hand-side is not initialized \
                             (`{}`)",
                            rvalue
                        ),
                        lvalue,
                    ));
                }
                Ok((full_rvalue.to_string(), "word".to_string(), WORD_SIZE))
            }
            "+" | "-" | "++" | "--" | "~" => self.from_integral_unary_expression(&rvalue),
            _ => Ok(frame.locals.get_or_null(lvalue)),
        }
    }

    /// `+`, `-`, `++`, `--`, `~` apply to numeric storage only.
    fn from_integral_unary_expression(&self, lvalue: &str) -> Result<DataType, CompileError> {
        // a canonical literal operand carries its own numeric storage
        if let Some(data) = values::data_type_from_rvalue(lvalue) {
            if !INTEGRAL_TYPES.contains(&data.1.as_str()) {
                return Err(self.context_frame_error(
                    ErrorKind::InvalidUnaryOperator,
                    "invalid numeric unary expression on lvalue, lvalue is not a numeric type",
                    lvalue,
                ));
            }
            return Ok(data);
        }
        let frame = self
            .objects
            .stack_frame()
            .expect("active frame checked by caller");
        if !frame.locals.is_defined(lvalue) {
            return Err(self.context_frame_error(
                ErrorKind::InvalidUnaryOperator,
                "invalid numeric unary expression, lvalue symbol is not initialized",
                lvalue,
            ));
        }
        let symbol = frame.locals.get_or_null(lvalue);
        if !INTEGRAL_TYPES.contains(&symbol.1.as_str()) {
            return Err(self.context_frame_error(
                ErrorKind::InvalidUnaryOperator,
                "invalid numeric unary expression on lvalue, lvalue is not a numeric type",
                lvalue,
            ));
        }
        Ok(symbol)
    }

    /// Parse the `(value:type:bytes)` canonical form; temporaries and
    /// the call return slot resolve to pointer-sized words.
    fn resolve_rvalue_data(&self, rvalue: &str) -> Result<DataType, CompileError> {
        if rvalue.starts_with("_t") || rvalue == "RET" {
            return Ok((rvalue.to_string(), "word".to_string(), WORD_SIZE));
        }
        if values::is_vector_lvalue(rvalue) {
            let frame = self
                .objects
                .stack_frame()
                .expect("active frame checked by caller");
            return self.objects.storage_at_lvalue(rvalue, frame);
        }
        values::data_type_from_rvalue(rvalue).ok_or_else(|| {
            self.clone_error(
                ErrorKind::UndeclaredIdentifier,
                "invalid lvalue assignment, right-hand-side is not initialized",
                rvalue,
            )
        })
    }

    /// Record a local, adjusting the frame's byte allocation. A
    /// declaration seed contributes nothing until its first assignment;
    /// reassignment releases the prior size first. Sizes beyond
    /// `u32::MAX` fail the compile.
    fn register_local(&mut self, lhs: &str, data: DataType) -> Result<(), CompileError> {
        let size = data.2;
        if size > u32::MAX as usize {
            return Err(self.context_frame_error(
                ErrorKind::AllocationOverflow,
                format!("exceeds maximum byte size ({})", data.0),
                lhs,
            ));
        }
        let frame = self
            .objects
            .stack_frame_mut()
            .expect("active frame checked by caller");
        if frame.assigned.contains(lhs) {
            let previous = frame.locals.get_or_null(lhs).2;
            frame.allocation = frame.allocation.saturating_sub(previous as u32);
        }
        frame.allocation = frame.allocation.checked_add(size as u32).ok_or_else(|| {
            CompileError::new(
                ErrorKind::AllocationOverflow,
                "stack frame allocation overflow",
                lhs,
            )
        })?;
        frame.locals.set(lhs, data);
        frame.assigned.insert(lhs.to_string());
        Ok(())
    }

    fn context_frame_error(
        &self,
        kind: ErrorKind,
        message: impl Into<String>,
        symbol: &str,
    ) -> CompileError {
        self.clone_error(kind, message, symbol)
    }

    fn clone_error(
        &self,
        kind: ErrorKind,
        message: impl Into<String>,
        symbol: &str,
    ) -> CompileError {
        let mut error = CompileError::new(kind, message, symbol)
            .with_optional_span(self.internal_symbols.span(symbol));
        if let Some(function) = self.objects.stack_frame_symbol() {
            error = error.in_function(function);
        }
        error
    }
}

/// Best-effort `(value, type, size)` resolution of an rvalue text
/// against a frame, for temporary registration.
fn resolve_frame_data(frame: &Frame, rvalue: &str) -> DataType {
    if let Some(data) = values::data_type_from_rvalue(rvalue) {
        return data;
    }
    if values::is_binary_expression(rvalue) {
        let (left, right, _) = values::from_rvalue_binary_expression(rvalue);
        for side in [&left, &right] {
            if let Some(data) = values::data_type_from_rvalue(side) {
                return (rvalue.to_string(), data.1, data.2);
            }
        }
        for side in [&left, &right] {
            if frame.locals.is_defined(side) {
                let data = frame.locals.get_or_null(side);
                return (rvalue.to_string(), data.1, data.2);
            }
        }
        return (rvalue.to_string(), "word".to_string(), WORD_SIZE);
    }
    if values::is_unary_expression(rvalue) {
        if values::get_unary_operator(rvalue) == Some("&") {
            return (rvalue.to_string(), "word".to_string(), WORD_SIZE);
        }
        let reference = values::get_unary_rvalue_reference(rvalue);
        if frame.locals.is_defined(&reference) {
            let data = frame.locals.get_or_null(&reference);
            return (rvalue.to_string(), data.1, data.2);
        }
        return (rvalue.to_string(), "word".to_string(), WORD_SIZE);
    }
    if frame.locals.is_defined(rvalue) {
        return frame.locals.get_or_null(rvalue);
    }
    (rvalue.to_string(), "word".to_string(), WORD_SIZE)
}

/// Run the context pass over a built stream.
pub fn contextualize(
    objects: &mut ObjectTable,
    internal_symbols: &SymbolMap,
    instructions: Instructions,
) -> Result<Instructions, CompileError> {
    ContextPass::new(objects, internal_symbols).run(instructions)
}
