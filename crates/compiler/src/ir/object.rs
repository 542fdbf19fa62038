//! The per-translation-unit object table.
//!
//! Owns every function frame, vector and interned string literal for
//! the unit, plus the hoisted file-scope symbols. The context pass
//! fills it in; the type checker and the backends read and update it.

use crate::ir::{Instruction, Instructions};
use credence_core::error::{CompileError, ErrorKind};
use credence_core::symbol::SymbolTable;
use credence_core::values::{
    self, DataType, VECTOR_MAX_SIZE, WORD_SIZE, null_data_type,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Per-function stack frame, created on `FUNC_START` and sealed on
/// `FUNC_END`.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Mangled function label, e.g. `__main`.
    pub symbol: String,
    /// Symbolic labels defined inside the function.
    pub labels: BTreeSet<String>,
    pub locals: SymbolTable,
    /// Parameter names in declaration order.
    pub parameters: Vec<String>,
    /// Temporary lvalue → textual rvalue it was assigned.
    pub temporaries: BTreeMap<String, String>,
    /// `(value, symbol)` of the return statement, when one exists.
    pub ret: Option<(String, String)>,
    /// Running byte total of locals and temporaries.
    pub allocation: u32,
    /// Names that have received real storage (parameters and assigned
    /// locals); declaration seeds are absent until first assignment.
    pub assigned: BTreeSet<String>,
    pub instructions: Instructions,
    /// `[start, end]` offsets of the function in the master stream.
    pub address_location: [usize; 2],
    /// Runtime push order of call parameters.
    pub stack: Vec<String>,
}

impl Frame {
    pub fn new(symbol: impl Into<String>) -> Self {
        Frame {
            symbol: symbol.into(),
            ..Frame::default()
        }
    }

    pub fn is_parameter(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| p == name)
    }

    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p == name)
    }

    /// A parameter that is plain scalar storage (not a vector slot).
    pub fn is_scalar_parameter(&self, name: &str) -> bool {
        self.is_parameter(name) && !values::is_vector_lvalue(name)
    }

    /// Follow a `_tN`/`_pN_M` chain to its terminal rvalue text.
    pub fn resolve_temporary(&self, lvalue: &str) -> String {
        let rvalue = if values::is_temporary(lvalue) || values::is_parameter_slot(lvalue) {
            match self.temporaries.get(lvalue) {
                Some(text) => text.clone(),
                None => return lvalue.to_string(),
            }
        } else {
            return lvalue.to_string();
        };
        // a binary over temporaries is already terminal
        if rvalue.contains("_t") && rvalue.contains(' ') {
            return rvalue;
        }
        if values::is_temporary(&rvalue) || values::is_parameter_slot(&rvalue) {
            self.resolve_temporary(&rvalue)
        } else {
            rvalue
        }
    }

    /// Byte size reached by resolving an rvalue text through the frame:
    /// canonical literals carry their own size, temporaries resolve
    /// through their chain, names resolve through the locals.
    pub fn resolve_size(&self, rvalue: &str) -> usize {
        self.resolve_size_guarded(rvalue, 0)
    }

    fn resolve_size_guarded(&self, rvalue: &str, depth: usize) -> usize {
        if depth > 64 {
            return WORD_SIZE;
        }
        let resolved = self.resolve_temporary(rvalue);
        if values::is_rvalue_data_type(&resolved) && !values::is_rvalue_data_type_word(&resolved) {
            return values::data_type_from_rvalue(&resolved)
                .map(|d| d.2)
                .unwrap_or(WORD_SIZE);
        }
        if values::is_binary_expression(&resolved) {
            let (left, right, _) = values::from_rvalue_binary_expression(&resolved);
            for side in [&left, &right] {
                if values::is_rvalue_data_type(side) && !values::is_rvalue_data_type_word(side) {
                    if let Some(data) = values::data_type_from_rvalue(side) {
                        return data.2;
                    }
                }
            }
            for side in [&left, &right] {
                if values::is_temporary(side) || values::is_parameter_slot(side) {
                    return self.resolve_size_guarded(side, depth + 1);
                }
                if self.locals.is_defined(side) && !self.locals.is_pointer(side) {
                    return self.locals.get_or_null(side).2;
                }
            }
            return WORD_SIZE;
        }
        if values::is_unary_expression(&resolved) {
            // an address-of result is pointer-sized regardless of target
            if values::get_unary_operator(&resolved) == Some("&") {
                return WORD_SIZE;
            }
            return self
                .resolve_size_guarded(&values::get_unary_rvalue_reference(&resolved), depth + 1);
        }
        if self.locals.is_defined(&resolved) {
            return self.locals.get_or_null(&resolved).2;
        }
        WORD_SIZE
    }
}

/// A fixed-size array. Element slots are addressed by textual offset
/// keys; slot `"0"` is always present so a one-element vector can stand
/// in for a scalar.
#[derive(Debug, Clone)]
pub struct Vector {
    pub symbol: String,
    pub size: usize,
    pub data: BTreeMap<String, DataType>,
    pub decay_index: usize,
}

impl Vector {
    pub const MAX_SIZE: usize = VECTOR_MAX_SIZE;

    pub fn new(symbol: impl Into<String>, size: usize) -> Self {
        let mut data = BTreeMap::new();
        data.insert("0".to_string(), null_data_type());
        Vector {
            symbol: symbol.into(),
            size,
            data,
            decay_index: 0,
        }
    }

    /// Element storage at an offset; unassigned slots read as null.
    pub fn element(&self, offset: &str) -> DataType {
        self.data
            .get(offset)
            .cloned()
            .unwrap_or_else(null_data_type)
    }

    pub fn set_element(&mut self, offset: impl Into<String>, value: DataType) {
        self.data.insert(offset.into(), value);
    }
}

/// Everything a translation unit owns: frames, vectors, interned
/// strings, the hoisted file-scope symbols, and the active-frame slot.
#[derive(Debug, Clone, Default)]
pub struct ObjectTable {
    pub functions: BTreeMap<String, Frame>,
    pub vectors: HashMap<String, Vector>,
    pub strings: BTreeSet<String>,
    pub hoisted_symbols: SymbolTable,
    /// Per-function declared names seeded by the statement builder
    /// (`auto`/`extrn`/parameters), keyed by mangled label.
    pub declared: HashMap<String, SymbolTable>,
    stack_frame: Option<String>,
}

impl ObjectTable {
    pub fn new() -> Self {
        ObjectTable::default()
    }

    pub fn is_stack_frame(&self) -> bool {
        self.stack_frame.is_some()
    }

    pub fn set_stack_frame(&mut self, label: Option<String>) {
        self.stack_frame = label;
    }

    pub fn stack_frame_symbol(&self) -> Option<&str> {
        self.stack_frame.as_deref()
    }

    pub fn stack_frame(&self) -> Option<&Frame> {
        self.stack_frame
            .as_ref()
            .and_then(|label| self.functions.get(label))
    }

    pub fn stack_frame_mut(&mut self) -> Option<&mut Frame> {
        let label = self.stack_frame.clone()?;
        self.functions.get_mut(&label)
    }

    pub fn frame(&self, label: &str) -> Option<&Frame> {
        self.functions.get(label)
    }

    /// Search a frame's address range of the master stream for a CALL.
    pub fn frame_contains_call(&self, label: &str, instructions: &Instructions) -> bool {
        let Some(frame) = self.functions.get(label) else {
            return false;
        };
        let [start, end] = frame.address_location;
        instructions
            .iter()
            .skip(start)
            .take(end.saturating_sub(start))
            .any(|quadruple| quadruple.op == Instruction::Call)
    }

    /// Resolve the storage an lvalue ultimately names: through pointer
    /// relations, vector offsets, canonical literal text, or the local
    /// symbol itself.
    pub fn storage_at_lvalue(
        &self,
        lvalue: &str,
        frame: &Frame,
    ) -> Result<DataType, CompileError> {
        self.storage_at_lvalue_guarded(lvalue, frame, 0)
    }

    fn storage_at_lvalue_guarded(
        &self,
        lvalue: &str,
        frame: &Frame,
        depth: usize,
    ) -> Result<DataType, CompileError> {
        // pointer cycles resolve to null rather than recursing forever
        if depth > 64 {
            return Ok(null_data_type());
        }
        let reference = values::get_unary_rvalue_reference(lvalue);
        if reference == "RET" {
            return Ok(null_data_type());
        }
        // string storage is itself the terminal value
        if let Some(data) = frame.locals.get(&reference)
            && data.1 == "string"
        {
            return Ok(data.clone());
        }
        if frame.locals.is_pointer(&reference) {
            let target = frame
                .locals
                .pointer_target(&reference)
                .unwrap_or_else(|| "NULL".to_string());
            if target == "NULL" {
                return Ok(null_data_type());
            }
            return self.storage_at_lvalue_guarded(&target, frame, depth + 1);
        }
        let base = values::from_lvalue_offset(&reference);
        if let Some(vector) = self.vectors.get(&base) {
            if base != reference {
                let offset = values::from_decay_offset(&reference);
                if frame.is_parameter(&offset) {
                    return Ok((lvalue.to_string(), "word".to_string(), WORD_SIZE));
                }
                let offset = self.vector_offset_value(&offset, frame)?;
                return Ok(vector.element(&offset));
            }
            return Ok(vector.element("0"));
        }
        if values::is_rvalue_data_type(&reference) {
            return values::data_type_from_rvalue(&reference).ok_or_else(|| {
                CompileError::new(
                    ErrorKind::InvalidRvalueType,
                    "malformed canonical rvalue",
                    reference.clone(),
                )
            });
        }
        if frame.locals.is_defined(&reference) {
            return Ok(frame.locals.get_or_null(&reference));
        }
        Err(CompileError::new(
            ErrorKind::UndeclaredIdentifier,
            "invalid lvalue, symbol is not initialized",
            reference,
        )
        .in_function(frame.symbol.clone()))
    }

    /// Resolve a symbolic vector offset to its stored value when the
    /// offset is itself a local.
    fn vector_offset_value(&self, offset: &str, frame: &Frame) -> Result<String, CompileError> {
        if frame.locals.is_defined(offset) {
            let storage = self.storage_at_lvalue(offset, frame)?;
            return Ok(storage.0);
        }
        Ok(offset.to_string())
    }

    /// Record the return slot of a frame from the `RET` operand.
    pub fn set_frame_return_value(
        &mut self,
        label: &str,
        rvalue: &str,
    ) -> Result<(), CompileError> {
        let Some(frame) = self.functions.get(label) else {
            return Ok(());
        };
        let ret = if rvalue.is_empty() {
            ("NULL".to_string(), String::new())
        } else if frame.locals.is_pointer(rvalue) {
            (
                frame
                    .locals
                    .pointer_target(rvalue)
                    .unwrap_or_else(|| "NULL".to_string()),
                rvalue.to_string(),
            )
        } else if frame.is_parameter(rvalue) {
            let index = frame.parameter_index(rvalue).unwrap_or(0);
            match frame.stack.get(index) {
                Some(pushed) => (pushed.clone(), rvalue.to_string()),
                None => ("NULL".to_string(), rvalue.to_string()),
            }
        } else if values::is_temporary(rvalue) {
            (
                frame
                    .temporaries
                    .get(rvalue)
                    .cloned()
                    .unwrap_or_else(|| rvalue.to_string()),
                rvalue.to_string(),
            )
        } else if values::is_rvalue_data_type(rvalue) {
            let data = values::data_type_from_rvalue(rvalue).ok_or_else(|| {
                CompileError::new(
                    ErrorKind::InvalidRvalueType,
                    "malformed canonical rvalue",
                    rvalue,
                )
            })?;
            (data.0, rvalue.to_string())
        } else if values::is_vector_lvalue(rvalue) || frame.locals.is_defined(rvalue) {
            let storage = self.storage_at_lvalue(rvalue, frame)?;
            (storage.0, rvalue.to_string())
        } else {
            ("NULL".to_string(), rvalue.to_string())
        };
        if let Some(frame) = self.functions.get_mut(label) {
            frame.ret = Some(ret);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::make_quadruple;
    use credence_core::values::word_data_type;

    #[test]
    fn test_vector_element_defaults_null() {
        let vector = Vector::new("v", 10);
        assert_eq!(vector.element("0"), null_data_type());
        assert_eq!(vector.element("7"), null_data_type());
        assert!(vector.data.contains_key("0"));
    }

    #[test]
    fn test_frame_parameters() {
        let mut frame = Frame::new("__f");
        frame.parameters = vec!["a".to_string(), "b".to_string()];
        assert!(frame.is_parameter("a"));
        assert_eq!(frame.parameter_index("b"), Some(1));
        assert!(!frame.is_parameter("c"));
    }

    #[test]
    fn test_resolve_temporary_chain() {
        let mut frame = Frame::new("__main");
        frame
            .temporaries
            .insert("_t1".to_string(), "(5:int:4) * (2:int:4)".to_string());
        frame.temporaries.insert("_t2".to_string(), "_t1".to_string());
        assert_eq!(frame.resolve_temporary("_t2"), "(5:int:4) * (2:int:4)");
        assert_eq!(frame.resolve_temporary("x"), "x");
    }

    #[test]
    fn test_resolve_size_through_binary() {
        let mut frame = Frame::new("__main");
        frame
            .temporaries
            .insert("_t1".to_string(), "(5:int:4) * (2:int:4)".to_string());
        frame
            .temporaries
            .insert("_t2".to_string(), "(5:int:4) + _t1".to_string());
        assert_eq!(frame.resolve_size("_t1"), 4);
        assert_eq!(frame.resolve_size("_t2"), 4);
        assert_eq!(frame.resolve_size("(7:long:8)"), 8);
    }

    #[test]
    fn test_storage_through_pointer() {
        let objects = ObjectTable::new();
        let mut frame = Frame::new("__main");
        frame.locals.set("x", ("5".to_string(), "int".to_string(), 4));
        frame.locals.set_pointer("p", "x");
        let storage = objects.storage_at_lvalue("*p", &frame).unwrap();
        assert_eq!(storage.1, "int");

        // an uninitialized pointer resolves to null storage
        frame.locals.set("q", word_data_type());
        let storage = objects.storage_at_lvalue("*q", &frame).unwrap();
        assert_eq!(storage.1, "null");
    }

    #[test]
    fn test_frame_contains_call() {
        let mut objects = ObjectTable::new();
        let mut frame = Frame::new("__main");
        frame.address_location = [0, 3];
        objects.functions.insert("__main".to_string(), frame);

        let mut instructions = Instructions::new();
        instructions.push_back(make_quadruple(Instruction::Label, "__main", "", ""));
        instructions.push_back(make_quadruple(Instruction::Call, "__f", "", ""));
        instructions.push_back(make_quadruple(Instruction::FuncEnd, "", "", ""));
        assert!(objects.frame_contains_call("__main", &instructions));

        let empty = Instructions::new();
        assert!(!objects.frame_contains_call("__main", &empty));
    }

    #[test]
    fn test_return_value_resolution() {
        let mut objects = ObjectTable::new();
        let mut frame = Frame::new("__main");
        frame.locals.set("x", ("42".to_string(), "int".to_string(), 4));
        objects.functions.insert("__main".to_string(), frame);

        objects.set_frame_return_value("__main", "x").unwrap();
        let ret = objects.functions["__main"].ret.clone().unwrap();
        assert_eq!(ret, ("42".to_string(), "x".to_string()));

        objects.set_frame_return_value("__main", "(7:int:4)").unwrap();
        let ret = objects.functions["__main"].ret.clone().unwrap();
        assert_eq!(ret.0, "7");
    }
}
