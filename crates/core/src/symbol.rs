//! Symbol table.
//!
//! Maps names to `(value, type-name, byte-size)` triples. Pointer-ness
//! is a derived predicate, not a separate entry kind: a symbol is a
//! pointer when its stored value is an address expression (`&x`) or its
//! type is pointer-sized storage (`word`, `string`).

use crate::values::{DataType, null_data_type};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTable {
    entries: BTreeMap<String, DataType>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&DataType> {
        self.entries.get(name)
    }

    /// Look a symbol up, falling back to the null storage for names the
    /// table has never seen. Declaredness checks belong to the caller.
    pub fn get_or_null(&self, name: &str) -> DataType {
        self.entries
            .get(name)
            .cloned()
            .unwrap_or_else(null_data_type)
    }

    pub fn set(&mut self, name: impl Into<String>, value: DataType) {
        self.entries.insert(name.into(), value);
    }

    /// Record a pointer relation: `name` holds the address of `target`.
    pub fn set_pointer(&mut self, name: impl Into<String>, target: impl Into<String>) {
        let target = target.into();
        let value = if target.starts_with('&') || target == "NULL" {
            target
        } else {
            format!("&{}", target)
        };
        self.entries
            .insert(name.into(), (value, "word".to_string(), crate::values::WORD_SIZE));
    }

    pub fn remove(&mut self, name: &str) -> Option<DataType> {
        self.entries.remove(name)
    }

    pub fn is_pointer(&self, name: &str) -> bool {
        match self.entries.get(name) {
            Some((value, type_name, _)) => {
                value.starts_with('&') || type_name == "word" || type_name == "string"
            }
            None => false,
        }
    }

    /// The lvalue a pointer refers to: `&x` → `x`, an unassigned
    /// pointer → `NULL`.
    pub fn pointer_target(&self, name: &str) -> Option<String> {
        let (value, type_name, _) = self.entries.get(name)?;
        if let Some(target) = value.strip_prefix('&') {
            return Some(target.to_string());
        }
        if type_name == "word" || type_name == "string" {
            if value == "__WORD__" || value == "NULL" {
                return Some("NULL".to_string());
            }
            return Some(value.clone());
        }
        None
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DataType)> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::{WORD_SIZE, word_data_type};

    #[test]
    fn test_define_and_lookup() {
        let mut table = SymbolTable::new();
        assert!(!table.is_defined("x"));
        table.set("x", ("5".to_string(), "int".to_string(), 4));
        assert!(table.is_defined("x"));
        assert_eq!(table.get("x").unwrap().1, "int");
    }

    #[test]
    fn test_pointer_predicate() {
        let mut table = SymbolTable::new();
        table.set("x", ("5".to_string(), "int".to_string(), 4));
        table.set("p", word_data_type());
        table.set("s", ("hi".to_string(), "string".to_string(), 2));
        table.set_pointer("q", "x");

        assert!(!table.is_pointer("x"));
        assert!(table.is_pointer("p"));
        assert!(table.is_pointer("s"));
        assert!(table.is_pointer("q"));
        assert!(!table.is_pointer("missing"));
    }

    #[test]
    fn test_pointer_target() {
        let mut table = SymbolTable::new();
        table.set_pointer("q", "x");
        assert_eq!(table.pointer_target("q").as_deref(), Some("x"));

        // an uninitialized pointer points at NULL
        table.set("p", word_data_type());
        assert_eq!(table.pointer_target("p").as_deref(), Some("NULL"));

        table.set("n", ("NULL".to_string(), "word".to_string(), WORD_SIZE));
        assert_eq!(table.pointer_target("n").as_deref(), Some("NULL"));
    }

    #[test]
    fn test_null_symbols_are_not_pointers() {
        let mut table = SymbolTable::new();
        table.set("x", crate::values::null_data_type());
        assert!(!table.is_pointer("x"));
    }
}
