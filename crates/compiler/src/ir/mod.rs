//! Intermediate representation.
//!
//! The IR is a linear stream of quadruples `(op, a, b, c)` with string
//! operands. Literal operands are canonicalized as `(value:type:bytes)`;
//! temporaries are `_tN`, call-argument slots `_pN_M`, branch labels
//! `_LN`, and function labels carry a `__` prefix.
//!
//! One quadruple prints per line:
//!
//!   LABEL __main:
//!   FUNC_START;
//!   _t1 = (5:int:4) * (2:int:4);
//!   x = _t1;
//!   FUNC_END;

pub mod builder;
pub mod checker;
pub mod context;
pub mod object;
pub mod temporary;

use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    FuncStart,
    FuncEnd,
    Label,
    Goto,
    If,
    Push,
    Pop,
    Call,
    Cmp,
    Variable,
    Return,
    Leave,
    Eol,
    Noop,
}

/// `(op, a, b, c)`. For `Variable`, `a` is the lvalue, `b` the rvalue
/// expression in textual form, and `c` the secondary operand when the
/// rvalue is a unary.
#[derive(Debug, Clone, PartialEq)]
pub struct Quadruple {
    pub op: Instruction,
    pub a: String,
    pub b: String,
    pub c: String,
}

pub type Instructions = VecDeque<Quadruple>;

pub fn make_quadruple(
    op: Instruction,
    a: impl Into<String>,
    b: impl Into<String>,
    c: impl Into<String>,
) -> Quadruple {
    Quadruple {
        op,
        a: a.into(),
        b: b.into(),
        c: c.into(),
    }
}

impl fmt::Display for Quadruple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            Instruction::Label => write!(f, "LABEL {}:", self.a),
            Instruction::FuncStart => write!(f, "FUNC_START;"),
            Instruction::FuncEnd => write!(f, "FUNC_END;"),
            Instruction::Variable => write!(f, "{} = {};", self.a, self.b),
            Instruction::Goto => write!(f, "GOTO {};", self.a),
            Instruction::If => write!(f, "IF {} GOTO {};", self.a, self.b),
            Instruction::Cmp => write!(f, "CMP {} {};", self.a, self.b),
            Instruction::Push => write!(f, "PUSH {};", self.a),
            Instruction::Pop => write!(f, "POP;"),
            Instruction::Call => write!(f, "CALL {};", self.a),
            Instruction::Return => {
                if self.a.is_empty() {
                    write!(f, "RET;")
                } else {
                    write!(f, "RET {};", self.a)
                }
            }
            Instruction::Leave => write!(f, "LEAVE;"),
            Instruction::Eol => write!(f, ";"),
            Instruction::Noop => Ok(()),
        }
    }
}

/// Render a whole stream, one quadruple per line.
pub fn instructions_to_string(instructions: &Instructions) -> String {
    let mut out = String::new();
    for quadruple in instructions {
        if quadruple.op == Instruction::Noop {
            continue;
        }
        out.push_str(&quadruple.to_string());
        out.push('\n');
    }
    out
}
