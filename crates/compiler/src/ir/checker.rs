//! Type checker over the contextualized IR.
//!
//! Validates every assignment quadruple against the frame it executes
//! in, dispatching on the shape of `(lhs, rhs)`:
//!
//!   auto x, *p;
//!   auto arr[10];
//!   x = 5;           // scalar assignment
//!   arr[0] = x;      // vector assignment with bounds check
//!   p = &x;          // pointer assignment
//!
//! Checked here: type compatibility between the two sides, vector
//! boundary access (`arr[0..9]` valid, `arr[10]` rejected), forbidden
//! pointer targets (no `&"string"` pointers), and null dereferences.
//! Exactly one handler fires per assignment; each updates the frame's
//! local symbol table on success.

use crate::ast::SymbolMap;
use crate::ir::object::{Frame, ObjectTable};
use crate::ir::{Instruction, Instructions, Quadruple};
use credence_core::error::{CompileError, ErrorKind};
use credence_core::symbol::SymbolTable;
use credence_core::values::{self, DataType, VECTOR_MAX_SIZE};

pub struct TypeChecker<'a> {
    objects: &'a mut ObjectTable,
    internal_symbols: &'a SymbolMap,
}

impl<'a> TypeChecker<'a> {
    pub fn new(objects: &'a mut ObjectTable, internal_symbols: &'a SymbolMap) -> Self {
        TypeChecker {
            objects,
            internal_symbols,
        }
    }

    /// Check every assignment in the stream, tracking the active frame
    /// through the `LABEL`/`FUNC_START` brackets.
    pub fn check(mut self, instructions: &Instructions) -> Result<(), CompileError> {
        let mut last_label = String::new();
        for instruction in instructions {
            match instruction.op {
                Instruction::Label => last_label = instruction.a.clone(),
                Instruction::FuncStart => {
                    if self.objects.functions.contains_key(&last_label) {
                        self.objects.set_stack_frame(Some(last_label.clone()));
                    }
                }
                Instruction::FuncEnd => self.objects.set_stack_frame(None),
                Instruction::Variable => self.from_mov_instruction(instruction)?,
                _ => {}
            }
        }
        self.objects.set_stack_frame(None);
        Ok(())
    }

    fn from_mov_instruction(&mut self, instruction: &Quadruple) -> Result<(), CompileError> {
        if !self.objects.is_stack_frame() {
            return Ok(());
        }
        let lhs = instruction.a.clone();
        // temporary quadruples carry expression text; their operands
        // are validated where the temporary is consumed
        if values::is_temporary(&lhs) || values::is_parameter_slot(&lhs) {
            return Ok(());
        }

        let rhs = self.resolve_rhs(&instruction.b);
        if rhs == "RET" || values::is_binary_expression(&rhs) {
            return Ok(());
        }

        if rhs == "NULL" {
            return Err(self.type_check_error(
                ErrorKind::InvalidPointerAssignment,
                "invalid pointer dereference assignment, right-hand-side is a NULL pointer!",
                &lhs,
            ));
        }

        if self.is_trivial_vector_assignment(&lhs, &rhs) {
            return self.assign_trivial_vector(&lhs, &rhs);
        }

        // canonical non-string literals carry their own storage
        if let Some(data) = values::data_type_from_rvalue(&rhs)
            && data.1 != "string"
            && !values::is_dereference_expression(&lhs)
        {
            return self.assign_data_type(&lhs, &data);
        }

        if (self.is_pointer(&lhs) || self.is_pointer(&rhs))
            && !values::is_dereference_expression(&rhs)
            && !values::is_dereference_expression(&lhs)
        {
            return self.assign_pointer(&lhs, &rhs);
        }

        if self.is_vector(&lhs) || self.is_vector(&rhs) {
            return self.assign_vector(&lhs, &rhs);
        }

        if values::is_dereference_expression(&lhs) || values::is_dereference_expression(&rhs) {
            return self.assign_dereference(&lhs, &rhs);
        }

        self.assign_scalar(&lhs, &rhs)
    }

    /// Follow `_tN`/`_pN_M` spellings to the terminal rvalue text.
    fn resolve_rhs(&self, rhs: &str) -> String {
        match self.objects.stack_frame() {
            Some(frame) => frame.resolve_temporary(rhs),
            None => rhs.to_string(),
        }
    }

    // -----------------------------------------------------------------
    // predicates
    // -----------------------------------------------------------------

    pub fn is_vector(&self, rvalue: &str) -> bool {
        let base = values::from_lvalue_offset(rvalue);
        self.objects.vectors.contains_key(&base)
    }

    pub fn is_pointer(&self, rvalue: &str) -> bool {
        let locals = self.locals();
        locals.map(|l| l.is_pointer(rvalue)).unwrap_or(false)
            || rvalue.starts_with('&')
            || values::is_rvalue_data_type_string(rvalue)
    }

    /// Either side is a vector declared with exactly one element.
    fn is_trivial_vector_assignment(&self, lhs: &str, rhs: &str) -> bool {
        let trivial = |name: &str| {
            self.objects
                .vectors
                .get(name)
                .map(|vector| vector.size == 1)
                .unwrap_or(false)
        };
        trivial(lhs) || trivial(rhs)
    }

    fn local_contains(&self, lvalue: &str) -> bool {
        self.locals()
            .map(|locals| locals.is_defined(lvalue))
            .unwrap_or(false)
            && !values::is_vector_lvalue(lvalue)
    }

    fn locals(&self) -> Option<&SymbolTable> {
        self.objects.stack_frame().map(|frame| &frame.locals)
    }

    // -----------------------------------------------------------------
    // type and size queries (shared with the backends through the
    // frame-parametrized functions below)
    // -----------------------------------------------------------------

    /// The effective type of an lvalue in the active frame, resolving
    /// subscripts with a bounds check.
    pub fn get_type_from_rvalue_data_type(&self, lvalue: &str) -> Result<String, CompileError> {
        match self.objects.stack_frame() {
            Some(frame) => get_type_from_rvalue_data_type(self.objects, frame, lvalue)
                .map_err(|error| self.with_source_span(error)),
            None => Ok("null".to_string()),
        }
    }

    /// Verify a subscript against the active frame.
    pub fn is_boundary_out_of_range(&self, rvalue: &str) -> Result<(), CompileError> {
        match self.objects.stack_frame() {
            Some(frame) => is_boundary_out_of_range(self.objects, frame, rvalue)
                .map_err(|error| self.with_source_span(error)),
            None => Ok(()),
        }
    }

    fn with_source_span(&self, mut error: CompileError) -> CompileError {
        if error.span.is_none() {
            error.span = self.internal_symbols.span(&error.symbol);
        }
        error
    }

    // -----------------------------------------------------------------
    // assignment handlers
    // -----------------------------------------------------------------

    /// Canonical-literal rvalue into a scalar or indexed vector slot.
    fn assign_data_type(&mut self, lhs: &str, data: &DataType) -> Result<(), CompileError> {
        if values::is_vector_lvalue(lhs) {
            self.is_boundary_out_of_range(lhs)?;
            let element_type = self.get_type_from_rvalue_data_type(lhs)?;
            if element_type != "null" && element_type != data.1 {
                return Err(self.type_check_error(
                    ErrorKind::InvalidVectorAssignment,
                    format!(
                        "invalid lvalue assignment to a vector, left-hand-side '{}' with type \
                         '{}' is not the same type ({})",
                        lhs, element_type, data.1
                    ),
                    lhs,
                ));
            }
            let base = values::from_lvalue_offset(lhs);
            let offset = values::from_decay_offset(lhs);
            if let Some(vector) = self.objects.vectors.get_mut(&base) {
                vector.set_element(offset, data.clone());
            }
            return Ok(());
        }

        let lhs_type = self.get_type_from_rvalue_data_type(lhs)?;
        if self.locals().map(|l| l.is_pointer(lhs)).unwrap_or(false) {
            return Err(self.type_check_error(
                ErrorKind::InvalidPointerAssignment,
                "invalid lvalue assignment, left-hand-side is a pointer to non-pointer rvalue",
                lhs,
            ));
        }
        if lhs_type != "null" && lhs_type != data.1 {
            return Err(self.type_check_error(
                ErrorKind::InvalidRvalueType,
                format!(
                    "invalid lvalue assignment, left-hand-side '{}' with type '{}' is not the \
                     same type ({})",
                    lhs, lhs_type, data.1
                ),
                lhs,
            ));
        }
        if let Some(frame) = self.objects.stack_frame_mut() {
            frame.locals.set(lhs, data.clone());
        }
        Ok(())
    }

    /// Pointer and address-of assignments.
    fn assign_pointer(&mut self, lvalue: &str, rvalue: &str) -> Result<(), CompileError> {
        let lhs_is_pointer = self.is_pointer(lvalue);
        let lhs_is_null = self
            .locals()
            .map(|locals| locals.get_or_null(lvalue).1 == "null")
            .unwrap_or(false);

        // pointer to pointer copies the pointer relation
        if (lhs_is_pointer || lhs_is_null)
            && self
                .locals()
                .map(|locals| locals.is_pointer(rvalue))
                .unwrap_or(false)
        {
            let target = self
                .locals()
                .and_then(|locals| locals.pointer_target(rvalue))
                .unwrap_or_else(|| "NULL".to_string());
            if let Some(frame) = self.objects.stack_frame_mut() {
                frame.locals.set_pointer(lvalue, target);
            }
            return Ok(());
        }

        // pointer to address-of lvalue; `&"string"` and `&string[k]`
        // pointers are not allowed
        if (lhs_is_pointer || lhs_is_null) && values::get_unary_operator(rvalue) == Some("&") {
            let reference = values::get_unary_rvalue_reference(rvalue);
            let frame = self.objects.stack_frame().expect("active frame");
            let storage = self.objects.storage_at_lvalue(&reference, frame)?;
            if storage.1 == "string" {
                return Err(self.type_check_error(
                    ErrorKind::InvalidPointerAssignment,
                    format!(
                        "invalid pointer assignment, right-hand-side '{}' is a pointer to \
                         string pointer, which is not allowed",
                        rvalue
                    ),
                    lvalue,
                ));
            }
            if let Some(frame) = self.objects.stack_frame_mut() {
                frame
                    .locals
                    .set(lvalue, (rvalue.to_string(), "word".to_string(), values::WORD_SIZE));
            }
            return Ok(());
        }

        // pointer to string literal; the literal is interned
        if (lhs_is_pointer || lhs_is_null) && values::is_rvalue_data_type_string(rvalue) {
            let data = values::data_type_from_rvalue(rvalue).expect("string literal");
            self.objects.strings.insert(data.0.clone());
            if let Some(frame) = self.objects.stack_frame_mut() {
                frame.locals.set(lvalue, data);
            }
            return Ok(());
        }

        // pointer to string storage held in a vector
        if (lhs_is_pointer || lhs_is_null) && self.is_vector(rvalue) {
            let frame = self.objects.stack_frame().expect("active frame");
            let storage = self.objects.storage_at_lvalue(rvalue, frame)?;
            if storage.1 == "string" {
                if let Some(frame) = self.objects.stack_frame_mut() {
                    frame.locals.set(lvalue, storage);
                }
                return Ok(());
            }
        }

        let human_symbol = values::data_type_from_rvalue(rvalue)
            .map(|data| data.0)
            .unwrap_or_else(|| rvalue.to_string());
        if !lhs_is_pointer {
            Err(self.type_check_error(
                ErrorKind::InvalidPointerAssignment,
                format!(
                    "invalid pointer assignment, left-hand-side '{}' is not a pointer",
                    lvalue
                ),
                &human_symbol,
            ))
        } else {
            Err(self.type_check_error(
                ErrorKind::InvalidPointerAssignment,
                format!(
                    "invalid pointer assignment, right-hand-side '{}' is not a pointer",
                    human_symbol
                ),
                lvalue,
            ))
        }
    }

    /// One side is a one-element vector; the element at slot `0`
    /// carries the type.
    fn assign_trivial_vector(&mut self, lvalue: &str, rvalue: &str) -> Result<(), CompileError> {
        let lhs_vector = self.objects.vectors.contains_key(lvalue);
        let rhs_vector = self.objects.vectors.contains_key(rvalue);

        if lhs_vector && rhs_vector {
            let element = self.objects.vectors[rvalue].element("0");
            let target = self.objects.vectors[lvalue].element("0");
            if target.1 != "null" && target.1 != element.1 {
                return Err(self.trivial_mismatch_error(lvalue, &target.1, &element.1));
            }
            if let Some(vector) = self.objects.vectors.get_mut(lvalue) {
                vector.set_element("0", element);
            }
            return Ok(());
        }
        if lhs_vector && self.local_contains(rvalue) {
            let element = self.objects.vectors[lvalue].element("0");
            let data = self.locals().expect("active frame").get_or_null(rvalue);
            if element.1 != "null" && element.1 != data.1 {
                return Err(self.trivial_mismatch_error(lvalue, &element.1, &data.1));
            }
            if let Some(vector) = self.objects.vectors.get_mut(lvalue) {
                vector.set_element("0", data);
            }
            return Ok(());
        }
        if self.local_contains(lvalue) && rhs_vector {
            let element = self.objects.vectors[rvalue].element("0");
            let lhs_type = self.get_type_from_rvalue_data_type(lvalue)?;
            if lhs_type != "null" && lhs_type != element.1 {
                return Err(self.trivial_mismatch_error(lvalue, &lhs_type, &element.1));
            }
            if let Some(frame) = self.objects.stack_frame_mut() {
                frame.locals.set(lvalue, element);
            }
            return Ok(());
        }
        // a canonical literal into a one-element vector
        if lhs_vector && let Some(data) = values::data_type_from_rvalue(rvalue) {
            let element = self.objects.vectors[lvalue].element("0");
            if element.1 != "null" && element.1 != data.1 {
                return Err(self.trivial_mismatch_error(lvalue, &element.1, &data.1));
            }
            if let Some(vector) = self.objects.vectors.get_mut(lvalue) {
                vector.set_element("0", data);
            }
        }
        Ok(())
    }

    /// Vector-to-vector, vector-to-scalar and scalar-to-vector
    /// assignment through (possibly symbolic) subscripts.
    fn assign_vector(&mut self, lvalue: &str, rvalue: &str) -> Result<(), CompileError> {
        let lhs_indexed = values::is_vector_lvalue(lvalue);
        let rhs_indexed = values::is_vector_lvalue(rvalue);
        let lhs_base = values::from_lvalue_offset(lvalue);
        let rhs_base = values::from_lvalue_offset(rvalue);
        let lhs_offset = if lhs_indexed {
            values::from_decay_offset(lvalue)
        } else {
            "0".to_string()
        };
        let rhs_offset = if rhs_indexed {
            values::from_decay_offset(rvalue)
        } else {
            "0".to_string()
        };

        let lhs_vector = self.objects.vectors.contains_key(&lhs_base);
        let rhs_vector = self.objects.vectors.contains_key(&rhs_base);

        if lhs_vector && rhs_vector {
            if lhs_indexed {
                self.is_boundary_out_of_range(lvalue)?;
            }
            if rhs_indexed {
                self.is_boundary_out_of_range(rvalue)?;
            }
            let element = self.objects.vectors[&rhs_base].element(&rhs_offset);
            let target = self.objects.vectors[&lhs_base].element(&lhs_offset);
            if target.1 != "null" && target.1 != element.1 {
                return Err(self.type_check_error(
                    ErrorKind::InvalidVectorAssignment,
                    format!(
                        "invalid vector assignment, left-hand-side '{}' at index '{}' with type \
                         '{}' is not the same type as right-hand-side vector '{}' at index '{}' \
                         ({})",
                        lhs_base, lhs_offset, target.1, rhs_base, rhs_offset, element.1
                    ),
                    &lhs_base,
                ));
            }
            if let Some(vector) = self.objects.vectors.get_mut(&lhs_base) {
                vector.set_element(lhs_offset, element);
            }
            return Ok(());
        }

        if lhs_vector && self.local_contains(&rhs_base) {
            if lhs_indexed {
                self.is_boundary_out_of_range(lvalue)?;
            }
            let data = self.locals().expect("active frame").get_or_null(&rhs_base);
            let target = self.objects.vectors[&lhs_base].element(&lhs_offset);
            if target.1 != "null" && target.1 != data.1 {
                return Err(self.type_check_error(
                    ErrorKind::InvalidVectorAssignment,
                    format!(
                        "invalid vector assignment, left-hand-side '{}' with type '{}' is not \
                         the same type ({})",
                        lvalue, target.1, data.1
                    ),
                    &lhs_base,
                ));
            }
            if let Some(vector) = self.objects.vectors.get_mut(&lhs_base) {
                vector.set_element(lhs_offset, data);
            }
            return Ok(());
        }

        if self.local_contains(&lhs_base) && rhs_vector {
            if rhs_indexed {
                self.is_boundary_out_of_range(rvalue)?;
            }
            let element = self.objects.vectors[&rhs_base].element(&rhs_offset);
            let lhs_type = self.get_type_from_rvalue_data_type(&lhs_base)?;
            if lhs_type != "null" && lhs_type != element.1 {
                return Err(self.type_check_error(
                    ErrorKind::InvalidVectorAssignment,
                    format!(
                        "invalid lvalue assignment to a vector, left-hand-side '{}' with type \
                         '{}' is not the same type ({})",
                        lvalue, lhs_type, element.1
                    ),
                    &rhs_base,
                ));
            }
            if let Some(frame) = self.objects.stack_frame_mut() {
                frame.locals.set(&lhs_base, element);
            }
            return Ok(());
        }

        Err(self.type_check_error(
            ErrorKind::InvalidVectorAssignment,
            format!(
                "invalid vector assignment, vector identifier '{}' does not exist",
                if lhs_vector { rhs_base } else { lhs_base }
            ),
            lvalue,
        ))
    }

    /// `*p = e` and `p = *q`.
    fn assign_dereference(&mut self, lvalue: &str, rvalue: &str) -> Result<(), CompileError> {
        let lhs_reference = values::get_unary_rvalue_reference(lvalue);
        let rhs_reference = values::get_unary_rvalue_reference(rvalue);

        if values::is_dereference_expression(rvalue) {
            let frame = self.objects.stack_frame().expect("active frame");
            if !frame.locals.is_pointer(&rhs_reference) {
                return Err(self.type_check_error(
                    ErrorKind::InvalidPointerAssignment,
                    "invalid pointer dereference, right-hand-side is not a pointer",
                    lvalue,
                ));
            }
            let storage = self.objects.storage_at_lvalue(&rhs_reference, frame)?;
            if storage.1 == "null" {
                return Err(self.type_check_error(
                    ErrorKind::InvalidPointerAssignment,
                    "invalid pointer dereference, right-hand-side is a null pointer",
                    lvalue,
                ));
            }
        }

        if values::is_dereference_expression(lvalue) {
            let frame = self.objects.stack_frame().expect("active frame");
            if !frame.locals.is_pointer(&lhs_reference) {
                return Err(self.type_check_error(
                    ErrorKind::InvalidPointerAssignment,
                    "invalid pointer dereference, left-hand-side is not a pointer",
                    &lhs_reference,
                ));
            }
            if frame.locals.pointer_target(&lhs_reference).as_deref() == Some("NULL") {
                return Err(self.type_check_error(
                    ErrorKind::InvalidPointerAssignment,
                    "invalid pointer dereference, right-hand-side is a null pointer",
                    lvalue,
                ));
            }
            // the pointed-to storage takes the rvalue's type
            let target = frame
                .locals
                .pointer_target(&lhs_reference)
                .unwrap_or_else(|| "NULL".to_string());
            let target_storage = self.objects.storage_at_lvalue(&lhs_reference, frame)?;
            let data = self.rvalue_storage(rvalue)?;
            if target_storage.1 != "null" && target_storage.1 != data.1 {
                return Err(self.type_check_error(
                    ErrorKind::InvalidPointerAssignment,
                    format!(
                        "invalid dereference assignment, dereference rvalue of left-hand-side \
                         with type '{}' is not the same type ({})",
                        target_storage.1, data.1
                    ),
                    lvalue,
                ));
            }
            if let Some(frame) = self.objects.stack_frame_mut() {
                frame.locals.set(target, data);
            }
            return Ok(());
        }

        // plain lvalue receiving a dereferenced pointer
        let frame = self.objects.stack_frame().expect("active frame");
        let storage = self.objects.storage_at_lvalue(&rhs_reference, frame)?;
        let lhs_type = self.get_type_from_rvalue_data_type(&lhs_reference)?;
        if lhs_type != "null" && lhs_type != storage.1 {
            return Err(self.type_check_error(
                ErrorKind::InvalidPointerAssignment,
                format!(
                    "invalid dereference assignment, dereference rvalue of left-hand-side with \
                     type '{}' is not the same type ({})",
                    lhs_type, storage.1
                ),
                lvalue,
            ));
        }
        if let Some(frame) = self.objects.stack_frame_mut() {
            frame.locals.set(&lhs_reference, storage);
        }
        Ok(())
    }

    /// Scalar-to-scalar through declared symbols.
    fn assign_scalar(&mut self, lvalue: &str, rvalue: &str) -> Result<(), CompileError> {
        let Some(locals) = self.locals() else {
            return Ok(());
        };
        if !locals.is_defined(rvalue) {
            // expression text the context pass already resolved
            return Ok(());
        }
        let data = locals.get_or_null(rvalue);
        let lhs_type = self.get_type_from_rvalue_data_type(lvalue)?;
        if lhs_type != "null" && data.1 != "null" && lhs_type != data.1 {
            return Err(self.type_check_error(
                ErrorKind::InvalidRvalueType,
                format!(
                    "invalid assignment, right-hand-side '{}' with type '{}' is not the same \
                     type ({})",
                    rvalue, data.1, lhs_type
                ),
                lvalue,
            ));
        }
        if let Some(frame) = self.objects.stack_frame_mut() {
            frame.locals.set(lvalue, data);
        }
        Ok(())
    }

    /// Storage of an assignment rvalue: canonical literal, declared
    /// symbol, or dereferenced pointer.
    fn rvalue_storage(&self, rvalue: &str) -> Result<DataType, CompileError> {
        if let Some(data) = values::data_type_from_rvalue(rvalue) {
            return Ok(data);
        }
        let frame = self.objects.stack_frame().expect("active frame");
        self.objects.storage_at_lvalue(rvalue, frame)
    }

    fn trivial_mismatch_error(
        &self,
        lvalue: &str,
        lhs_type: &str,
        rhs_type: &str,
    ) -> CompileError {
        self.type_check_error(
            ErrorKind::InvalidVectorAssignment,
            format!(
                "invalid vector assignment, left-hand-side '{}' with type '{}' is not the same \
                 type ({})",
                lvalue, lhs_type, rhs_type
            ),
            lvalue,
        )
    }

    fn type_check_error(
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

// ---------------------------------------------------------------------
// frame-parametrized queries, shared between the checker and the
// backends (register sizing, operand widths)
// ---------------------------------------------------------------------

/// The effective type of an lvalue against a frame, resolving
/// subscripts with a bounds check.
pub fn get_type_from_rvalue_data_type(
    objects: &ObjectTable,
    frame: &Frame,
    lvalue: &str,
) -> Result<String, CompileError> {
    if lvalue.contains('[') {
        is_boundary_out_of_range(objects, frame, lvalue)?;
        let base = values::from_lvalue_offset(lvalue);
        let offset = values::from_decay_offset(lvalue);
        let vector = objects.vectors.get(&base).expect("bounds checked");
        return Ok(vector.element(&offset).1);
    }
    Ok(frame.locals.get_or_null(lvalue).1)
}

/// The byte size an operand occupies in a frame. Subscripts resolve
/// their element, dereferences and pointer-typed entries resolve
/// through their target.
pub fn get_size_from_local_lvalue(
    objects: &ObjectTable,
    frame: &Frame,
    lvalue: &str,
) -> Result<usize, CompileError> {
    if lvalue.contains('[') {
        is_boundary_out_of_range(objects, frame, lvalue)?;
        let base = values::from_lvalue_offset(lvalue);
        let offset = values::from_decay_offset(lvalue);
        let vector = objects.vectors.get(&base).expect("bounds checked");
        return Ok(vector.element(&offset).2);
    }
    if values::is_dereference_expression(lvalue) {
        return Ok(objects
            .storage_at_lvalue(lvalue, frame)
            .map(|storage| storage.2)
            .unwrap_or(values::WORD_SIZE));
    }
    let locals = &frame.locals;
    let reference = values::get_unary_rvalue_reference(lvalue);
    if locals.get_or_null(lvalue).1 == "word" && locals.is_defined(&reference) {
        if let Some(target) = locals.pointer_target(&reference)
            && locals.is_defined(&target)
        {
            return Ok(locals.get_or_null(&target).2);
        }
        return Ok(locals.get_or_null(&reference).2);
    }
    Ok(locals.get_or_null(lvalue).2)
}

/// Verify a subscript: the base names a vector, numeric offsets sit
/// inside the declared size and the hard cap, symbolic offsets name a
/// declared local or scalar parameter.
pub fn is_boundary_out_of_range(
    objects: &ObjectTable,
    frame: &Frame,
    rvalue: &str,
) -> Result<(), CompileError> {
    let base = values::from_lvalue_offset(rvalue);
    let offset = values::from_decay_offset(rvalue);
    let boundary_error = |kind: ErrorKind, message: String| {
        CompileError::new(kind, message, rvalue).in_function(frame.symbol.clone())
    };
    let Some(vector) = objects.vectors.get(&base) else {
        return Err(boundary_error(
            ErrorKind::InvalidVectorAssignment,
            format!(
                "invalid vector assignment, vector identifier '{}' does not exist",
                base
            ),
        ));
    };
    if values::is_numeric(&offset) {
        let index: usize = offset.parse().unwrap_or(usize::MAX);
        if index > VECTOR_MAX_SIZE {
            return Err(boundary_error(
                ErrorKind::OutOfRangeVector,
                format!("invalid rvalue, integer offset '{}' is a buffer-overflow", index),
            ));
        }
        if vector.size == 0 || index > vector.size - 1 {
            return Err(boundary_error(
                ErrorKind::OutOfRangeVector,
                format!(
                    "invalid out-of-range vector assignment '{}' at index '{}'",
                    base, index
                ),
            ));
        }
    } else if !frame.locals.is_defined(&offset) && !frame.is_scalar_parameter(&offset) {
        return Err(boundary_error(
            ErrorKind::OutOfRangeVector,
            format!("invalid vector offset '{}'", offset),
        ));
    }
    Ok(())
}

/// Check a contextualized stream against its object table.
pub fn check_types(
    objects: &mut ObjectTable,
    internal_symbols: &SymbolMap,
    instructions: &Instructions,
) -> Result<(), CompileError> {
    TypeChecker::new(objects, internal_symbols).check(instructions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::object::{Frame, Vector};
    use crate::ir::make_quadruple;
    use credence_core::values::{null_data_type, word_data_type};
    use serde_json::json;

    fn symbol_map() -> SymbolMap {
        SymbolMap::from_value(json!({})).unwrap()
    }

    fn objects_with_frame(frame: Frame) -> ObjectTable {
        let mut objects = ObjectTable::new();
        let label = frame.symbol.clone();
        objects.functions.insert(label.clone(), frame);
        objects.set_stack_frame(Some(label));
        objects
    }

    fn variable(lhs: &str, rhs: &str) -> Quadruple {
        make_quadruple(Instruction::Variable, lhs, rhs, "")
    }

    fn check_one(objects: &mut ObjectTable, quadruple: Quadruple) -> Result<(), CompileError> {
        let symbols = symbol_map();
        let mut checker = TypeChecker::new(objects, &symbols);
        checker.from_mov_instruction(&quadruple)
    }

    #[test]
    fn test_scalar_assignment_to_null_slot() {
        let mut frame = Frame::new("__main");
        frame.locals.set("x", null_data_type());
        let mut objects = objects_with_frame(frame);
        check_one(&mut objects, variable("x", "(5:int:4)")).unwrap();
        let locals = &objects.functions["__main"].locals;
        assert_eq!(locals.get("x").unwrap().1, "int");
    }

    #[test]
    fn test_scalar_type_mismatch() {
        let mut frame = Frame::new("__main");
        frame.locals.set("x", ("5".to_string(), "int".to_string(), 4));
        let mut objects = objects_with_frame(frame);
        let err = check_one(&mut objects, variable("x", "(2.5:double:8)")).unwrap_err();
        assert!(err.message.contains("is not the same type"));
    }

    #[test]
    fn test_vector_in_bounds() {
        let mut frame = Frame::new("__main");
        frame.locals.set("v", ("0".to_string(), "byte".to_string(), 10));
        let mut objects = objects_with_frame(frame);
        objects.vectors.insert("v".to_string(), Vector::new("v", 10));
        check_one(&mut objects, variable("v[9]", "(1:int:4)")).unwrap();
        assert_eq!(objects.vectors["v"].element("9").1, "int");
    }

    #[test]
    fn test_vector_out_of_range() {
        let mut frame = Frame::new("__main");
        frame.locals.set("v", ("0".to_string(), "byte".to_string(), 10));
        let mut objects = objects_with_frame(frame);
        objects.vectors.insert("v".to_string(), Vector::new("v", 10));
        let err = check_one(&mut objects, variable("v[10]", "(1:int:4)")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfRangeVector);
        assert!(err.message.contains("'v'"));
        assert!(err.message.contains("'10'"));
    }

    #[test]
    fn test_vector_offset_beyond_cap() {
        let mut frame = Frame::new("__main");
        frame.locals.set("v", ("0".to_string(), "byte".to_string(), 10));
        let mut objects = objects_with_frame(frame);
        objects.vectors.insert("v".to_string(), Vector::new("v", 10));
        let err = check_one(&mut objects, variable("v[2000]", "(1:int:4)")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfRangeVector);
        assert!(err.message.contains("buffer-overflow"));
    }

    #[test]
    fn test_symbolic_offset_requires_declaration() {
        let mut frame = Frame::new("__main");
        frame.locals.set("v", ("0".to_string(), "byte".to_string(), 10));
        let mut objects = objects_with_frame(frame);
        objects.vectors.insert("v".to_string(), Vector::new("v", 10));
        let err = check_one(&mut objects, variable("v[i]", "(1:int:4)")).unwrap_err();
        assert!(err.message.contains("invalid vector offset"));

        let mut frame = Frame::new("__main");
        frame.locals.set("v", ("0".to_string(), "byte".to_string(), 10));
        frame.locals.set("i", ("3".to_string(), "int".to_string(), 4));
        let mut objects = objects_with_frame(frame);
        objects.vectors.insert("v".to_string(), Vector::new("v", 10));
        check_one(&mut objects, variable("v[i]", "(1:int:4)")).unwrap();
    }

    #[test]
    fn test_pointer_to_string_pointer_rejected() {
        let mut frame = Frame::new("__main");
        frame.locals.set("p", word_data_type());
        frame
            .temporaries
            .insert("_t1".to_string(), "&(\"hi\":string:2)".to_string());
        let mut objects = objects_with_frame(frame);
        let err = check_one(&mut objects, variable("p", "_t1")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidPointerAssignment);
        assert!(err.message.contains("pointer to string pointer"));
    }

    #[test]
    fn test_null_dereference_rejected() {
        // auto *p; *p = 5;
        let mut frame = Frame::new("__main");
        frame.locals.set("p", word_data_type());
        let mut objects = objects_with_frame(frame);
        let err = check_one(&mut objects, variable("*p", "(5:int:4)")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidPointerAssignment);
        assert!(
            err.message
                .contains("invalid pointer dereference, right-hand-side is a null pointer")
        );
    }

    #[test]
    fn test_dereference_assignment_through_valid_pointer() {
        // auto x, *p; x = 5; p = &x; *p = 7;
        let mut frame = Frame::new("__main");
        frame.locals.set("x", ("5".to_string(), "int".to_string(), 4));
        frame.locals.set_pointer("p", "x");
        let mut objects = objects_with_frame(frame);
        check_one(&mut objects, variable("*p", "(7:int:4)")).unwrap();
        let locals = &objects.functions["__main"].locals;
        assert_eq!(locals.get("x").unwrap().0, "7");
    }

    #[test]
    fn test_pointer_copies_pointer() {
        let mut frame = Frame::new("__main");
        frame.locals.set("x", ("5".to_string(), "int".to_string(), 4));
        frame.locals.set_pointer("p", "x");
        frame.locals.set("q", word_data_type());
        let mut objects = objects_with_frame(frame);
        check_one(&mut objects, variable("q", "p")).unwrap();
        let locals = &objects.functions["__main"].locals;
        assert_eq!(locals.pointer_target("q").as_deref(), Some("x"));
    }

    #[test]
    fn test_string_literal_interned() {
        let mut frame = Frame::new("__main");
        frame.locals.set("p", word_data_type());
        let mut objects = objects_with_frame(frame);
        check_one(&mut objects, variable("p", "(\"hello\":string:5)")).unwrap();
        assert!(objects.strings.contains("hello"));
    }

    #[test]
    fn test_address_of_local_accepted() {
        let mut frame = Frame::new("__main");
        frame.locals.set("x", ("5".to_string(), "int".to_string(), 4));
        frame.locals.set("p", word_data_type());
        frame.temporaries.insert("_t1".to_string(), "&x".to_string());
        let mut objects = objects_with_frame(frame);
        check_one(&mut objects, variable("p", "_t1")).unwrap();
        let locals = &objects.functions["__main"].locals;
        assert!(locals.is_pointer("p"));
    }

    #[test]
    fn test_trivial_vector_assignment() {
        let mut frame = Frame::new("__main");
        frame.locals.set("x", ("5".to_string(), "int".to_string(), 4));
        let mut objects = objects_with_frame(frame);
        let mut vector = Vector::new("unit", 1);
        vector.set_element("0", ("1".to_string(), "int".to_string(), 4));
        objects.vectors.insert("unit".to_string(), vector);
        check_one(&mut objects, variable("x", "unit")).unwrap();

        let mut bad = Vector::new("unit2", 1);
        bad.set_element("0", ("s".to_string(), "string".to_string(), 1));
        objects.vectors.insert("unit2".to_string(), bad);
        let err = check_one(&mut objects, variable("x", "unit2")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidVectorAssignment);
    }

    #[test]
    fn test_vector_to_vector_indexed_copy() {
        let mut frame = Frame::new("__main");
        frame.locals.set("a", ("0".to_string(), "byte".to_string(), 4));
        frame.locals.set("b", ("0".to_string(), "byte".to_string(), 4));
        let mut objects = objects_with_frame(frame);
        let mut src = Vector::new("b", 4);
        src.set_element("2", ("9".to_string(), "int".to_string(), 4));
        objects.vectors.insert("b".to_string(), src);
        objects.vectors.insert("a".to_string(), Vector::new("a", 4));
        check_one(&mut objects, variable("a[1]", "b[2]")).unwrap();
        assert_eq!(objects.vectors["a"].element("1").0, "9");
    }

    #[test]
    fn test_size_query_for_backends() {
        let mut frame = Frame::new("__main");
        frame.locals.set("x", ("5".to_string(), "int".to_string(), 4));
        frame.locals.set_pointer("p", "x");
        frame.locals.set("c", ("'a'".to_string(), "char".to_string(), 1));
        let mut objects = objects_with_frame(frame);
        let mut vector = Vector::new("v", 4);
        vector.set_element("2", ("7".to_string(), "long".to_string(), 8));
        objects.vectors.insert("v".to_string(), vector);

        let frame = &objects.functions["__main"];
        assert_eq!(get_size_from_local_lvalue(&objects, frame, "x").unwrap(), 4);
        assert_eq!(get_size_from_local_lvalue(&objects, frame, "c").unwrap(), 1);
        // pointers and dereferences resolve through the target
        assert_eq!(get_size_from_local_lvalue(&objects, frame, "p").unwrap(), 4);
        assert_eq!(get_size_from_local_lvalue(&objects, frame, "*p").unwrap(), 4);
        assert_eq!(get_size_from_local_lvalue(&objects, frame, "v[2]").unwrap(), 8);
        assert_eq!(
            get_type_from_rvalue_data_type(&objects, frame, "v[2]").unwrap(),
            "long"
        );
        assert!(get_size_from_local_lvalue(&objects, frame, "v[9]").is_err());
    }

    #[test]
    fn test_null_rvalue_rejected() {
        let mut frame = Frame::new("__main");
        frame.locals.set("p", word_data_type());
        let mut objects = objects_with_frame(frame);
        let err = check_one(&mut objects, variable("p", "NULL")).unwrap_err();
        assert!(err.message.contains("NULL pointer"));
    }
}
