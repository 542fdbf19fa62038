//! Temporary emitter.
//!
//! Consumes the postfix deque and emits quadruples that compute the
//! expression, minting `_tN` temporaries for intermediate results so
//! every instruction is a 3- or 4-tuple.
//!
//! Consider `x = (5 + 5) * (6 + 6)`:
//!
//!   _t1 = (5:int:4) + (5:int:4);
//!   _t2 = (6:int:4) + (6:int:4);
//!   _t3 = _t1 * _t2;
//!   x = _t3;
//!
//! Sub-expression results pop off the operand stack as temporaries and
//! feed the next instruction; `++`/`--` mutate their operand in place
//! instead of minting a new name. Ternaries lower through the
//! `CMP`/`IF`/`GOTO` idiom with fresh `_LN` labels, assigning straight
//! into the target lvalue when one is in play.

use crate::ir::{Instruction, Instructions, make_quadruple};
use crate::queue::{QueueItem, RvalueQueue};
use credence_core::error::{CompileError, ErrorKind};
use credence_core::operators::Operator;
use credence_core::values::ExpressionRef;

/// An operand on the evaluation stack: an expression leaf or the name
/// of a previously emitted temporary.
#[derive(Debug, Clone)]
enum Operand {
    Leaf(ExpressionRef),
    Temporary(String),
}

impl Operand {
    fn text(&self) -> String {
        match self {
            Operand::Leaf(expression) => expression.leaf_text().unwrap_or_default(),
            Operand::Temporary(name) => name.clone(),
        }
    }

}

pub struct TemporaryEmitter<'a> {
    instructions: Instructions,
    operand_stack: Vec<Operand>,
    pending_pushes: Vec<Operand>,
    temporary_index: &'a mut i32,
    label_index: &'a mut i32,
}

impl<'a> TemporaryEmitter<'a> {
    pub fn new(temporary_index: &'a mut i32, label_index: &'a mut i32) -> Self {
        TemporaryEmitter {
            instructions: Instructions::new(),
            operand_stack: Vec::new(),
            pending_pushes: Vec::new(),
            temporary_index,
            label_index,
        }
    }

    /// Lower a postfix queue. Returns the instructions and the name of
    /// the operand holding the expression's value, when there is one.
    pub fn lower(
        mut self,
        mut queue: RvalueQueue,
    ) -> Result<(Instructions, Option<String>), CompileError> {
        while let Some(item) = queue.pop_front() {
            match item {
                QueueItem::Operand(operand) => {
                    self.operand_stack.push(Operand::Leaf(operand));
                }
                QueueItem::Op(op) => self.apply(op, &mut queue)?,
            }
        }
        let result = self.operand_stack.last().map(Operand::text);
        Ok((self.instructions, result))
    }

    fn apply(&mut self, op: Operator, queue: &mut RvalueQueue) -> Result<(), CompileError> {
        match op {
            Operator::Assign => self.assignment_operands(),
            Operator::Push => {
                let operand = self.pop_operand(op)?;
                self.pending_pushes.push(operand);
                Ok(())
            }
            Operator::Call => self.call_operands(),
            Operator::Ternary => self.ternary_operands(queue),
            op if op.is_in_place_unary() => self.in_place_unary_operand(op),
            op if op.is_unary() => self.unary_operand(op),
            op => self.binary_operands(op),
        }
    }

    fn next_temporary(&mut self) -> String {
        *self.temporary_index += 1;
        format!("_t{}", self.temporary_index)
    }

    fn next_label(&mut self) -> String {
        *self.label_index += 1;
        format!("_L{}", self.label_index)
    }

    fn pop_operand(&mut self, op: Operator) -> Result<Operand, CompileError> {
        self.operand_stack.pop().ok_or_else(|| {
            CompileError::new(
                ErrorKind::InvalidBinaryOperator,
                format!("operator `{}` is missing an operand", op),
                op.to_string(),
            )
        })
    }

    fn assignment_operands(&mut self) -> Result<(), CompileError> {
        let rhs = self.pop_operand(Operator::Assign)?;
        let lhs = self.pop_operand(Operator::Assign)?;
        self.instructions.push_back(make_quadruple(
            Instruction::Variable,
            lhs.text(),
            rhs.text(),
            "",
        ));
        Ok(())
    }

    /// `++`/`--` mutate their operand; no fresh temporary.
    fn in_place_unary_operand(&mut self, op: Operator) -> Result<(), CompileError> {
        let operand = self.pop_operand(op)?;
        let name = operand.text();
        let rvalue = match op {
            Operator::PreInc | Operator::PreDec => format!("{}{}", op.symbol(), name),
            _ => format!("{}{}", name, op.symbol()),
        };
        self.instructions.push_back(make_quadruple(
            Instruction::Variable,
            name.clone(),
            rvalue,
            name.clone(),
        ));
        self.operand_stack.push(operand);
        Ok(())
    }

    fn unary_operand(&mut self, op: Operator) -> Result<(), CompileError> {
        let operand = self.pop_operand(op)?;
        let name = operand.text();
        let temporary = self.next_temporary();
        self.instructions.push_back(make_quadruple(
            Instruction::Variable,
            temporary.clone(),
            format!("{}{}", op.symbol(), name),
            name,
        ));
        self.operand_stack.push(Operand::Temporary(temporary));
        Ok(())
    }

    fn binary_operands(&mut self, op: Operator) -> Result<(), CompileError> {
        let rhs = self.pop_operand(op)?;
        let lhs = self.pop_operand(op)?;
        let temporary = self.next_temporary();
        self.instructions.push_back(make_quadruple(
            Instruction::Variable,
            temporary.clone(),
            format!("{} {} {}", lhs.text(), op.symbol(), rhs.text()),
            "",
        ));
        self.operand_stack.push(Operand::Temporary(temporary));
        Ok(())
    }

    /// `CALL` pops the callee and the collected `PUSH` slots, emitting
    /// the pushes in the order the arguments were seen.
    fn call_operands(&mut self) -> Result<(), CompileError> {
        let pushes: Vec<Operand> = self.pending_pushes.drain(..).rev().collect();
        for operand in &pushes {
            self.instructions.push_back(make_quadruple(
                Instruction::Push,
                operand.text(),
                "",
                "",
            ));
        }
        let callee = self.pop_operand(Operator::Call)?;
        self.instructions.push_back(make_quadruple(
            Instruction::Call,
            callee.text(),
            "",
            "",
        ));
        // the call's value lives in the return slot
        self.operand_stack.push(Operand::Temporary("RET".to_string()));
        Ok(())
    }

    /// Lower the 5-token ternary frame. When the ternary feeds an
    /// assignment the branches assign the target directly; otherwise a
    /// fresh temporary joins the two arms.
    fn ternary_operands(&mut self, queue: &mut RvalueQueue) -> Result<(), CompileError> {
        let else_value = self.pop_operand(Operator::Ternary)?;
        let then_value = self.pop_operand(Operator::Ternary)?;
        let condition = self.pending_pushes.pop().ok_or_else(|| {
            CompileError::new(
                ErrorKind::InvalidBinaryOperator,
                "ternary frame is missing its condition",
                "?:",
            )
        })?;

        let destination = if matches!(queue.front(), Some(QueueItem::Op(Operator::Assign))) {
            queue.pop_front();
            self.pop_operand(Operator::Assign)?.text()
        } else {
            let temporary = self.next_temporary();
            self.operand_stack
                .push(Operand::Temporary(temporary.clone()));
            temporary
        };

        let false_label = self.next_label();
        let join_label = self.next_label();
        let condition = condition.text();
        self.instructions.push_back(make_quadruple(
            Instruction::Cmp,
            condition.clone(),
            "(0:int:4)",
            "",
        ));
        self.instructions.push_back(make_quadruple(
            Instruction::If,
            format!("{} == (0:int:4)", condition),
            false_label.clone(),
            "",
        ));
        self.instructions.push_back(make_quadruple(
            Instruction::Variable,
            destination.clone(),
            then_value.text(),
            "",
        ));
        self.instructions.push_back(make_quadruple(
            Instruction::Goto,
            join_label.clone(),
            "",
            "",
        ));
        self.instructions
            .push_back(make_quadruple(Instruction::Label, false_label, "", ""));
        self.instructions.push_back(make_quadruple(
            Instruction::Variable,
            destination,
            else_value.text(),
            "",
        ));
        self.instructions
            .push_back(make_quadruple(Instruction::Label, join_label, "", ""));
        Ok(())
    }
}

/// Lower one postfix queue into quadruples.
pub fn expression_queue_to_instructions(
    queue: RvalueQueue,
    temporary_index: &mut i32,
    label_index: &mut i32,
) -> Result<(Instructions, Option<String>), CompileError> {
    TemporaryEmitter::new(temporary_index, label_index).lower(queue)
}

/// Convenience for tests and diagnostics: lowered instructions only.
pub fn lower_to_instructions(
    queue: RvalueQueue,
    temporary_index: &mut i32,
    label_index: &mut i32,
) -> Result<Instructions, CompileError> {
    expression_queue_to_instructions(queue, temporary_index, label_index)
        .map(|(instructions, _)| instructions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instructions_to_string;
    use crate::queue::queue_from_expression;
    use credence_core::values::{Expression, LValue, Literal};

    fn int(value: i64) -> ExpressionRef {
        Expression::Literal(Literal::Int(value)).shared()
    }

    fn lvalue(name: &str) -> ExpressionRef {
        Expression::LValue(LValue::new(name)).shared()
    }

    fn lower(expression: ExpressionRef) -> String {
        let (mut p, mut i) = (0, 0);
        let queue = queue_from_expression(&expression, &mut p, &mut i);
        let (mut t, mut l) = (0, 0);
        let instructions = lower_to_instructions(queue, &mut t, &mut l).unwrap();
        instructions_to_string(&instructions)
    }

    #[test]
    fn test_scalar_arithmetic() {
        // x = 5 + 5 * 2
        let product = Expression::Relation(Operator::Mul, vec![int(5), int(2)]).shared();
        let sum = Expression::Relation(Operator::Add, vec![int(5), product]).shared();
        let expr = Expression::Symbol(LValue::new("x"), sum).shared();
        assert_eq!(
            lower(expr),
            "_t1 = (5:int:4) * (2:int:4);\n_t2 = (5:int:4) + _t1;\nx = _t2;\n"
        );
    }

    #[test]
    fn test_grouped_subexpressions() {
        // x = (5 + 5) * (6 + 6)
        let lhs = Expression::Relation(Operator::Add, vec![int(5), int(5)]).shared();
        let rhs = Expression::Relation(Operator::Add, vec![int(6), int(6)]).shared();
        let product = Expression::Relation(
            Operator::Mul,
            vec![
                Expression::Pointer(lhs).shared(),
                Expression::Pointer(rhs).shared(),
            ],
        )
        .shared();
        let expr = Expression::Symbol(LValue::new("x"), product).shared();
        assert_eq!(
            lower(expr),
            "_t1 = (5:int:4) + (5:int:4);\n_t2 = (6:int:4) + (6:int:4);\n_t3 = _t1 * _t2;\nx = _t3;\n"
        );
    }

    #[test]
    fn test_in_place_unary() {
        // y++
        let expr = Expression::Unary(Operator::PostInc, lvalue("y")).shared();
        assert_eq!(lower(expr), "y = y++;\n");
    }

    #[test]
    fn test_pre_increment_spelling() {
        let expr = Expression::Unary(Operator::PreInc, lvalue("y")).shared();
        assert_eq!(lower(expr), "y = ++y;\n");
    }

    #[test]
    fn test_address_of_mints_temporary() {
        // p = &x
        let addr = Expression::Unary(Operator::AddrOf, lvalue("x")).shared();
        let expr = Expression::Symbol(LValue::new("p"), addr).shared();
        assert_eq!(lower(expr), "_t1 = &x;\np = _t1;\n");
    }

    #[test]
    fn test_unary_secondary_operand() {
        let addr = Expression::Unary(Operator::AddrOf, lvalue("x")).shared();
        let (mut p, mut i) = (0, 0);
        let queue = queue_from_expression(&addr, &mut p, &mut i);
        let (mut t, mut l) = (0, 0);
        let instructions = lower_to_instructions(queue, &mut t, &mut l).unwrap();
        let quadruple = &instructions[0];
        assert_eq!(quadruple.b, "&x");
        assert_eq!(quadruple.c, "x");
    }

    #[test]
    fn test_call_lowering() {
        // f(2, 5)
        let expr = Expression::Function(LValue::new("f"), vec![int(2), int(5)]).shared();
        assert_eq!(
            lower(expr),
            "_p1_1 = (2:int:4);\n_p2_2 = (5:int:4);\nPUSH _p1_1;\nPUSH _p2_2;\nCALL f;\n"
        );
    }

    #[test]
    fn test_call_result_assignment() {
        // x = f()
        let call = Expression::Function(LValue::new("f"), vec![]).shared();
        let expr = Expression::Symbol(LValue::new("x"), call).shared();
        assert_eq!(lower(expr), "CALL f;\nx = RET;\n");
    }

    #[test]
    fn test_ternary_assigns_target_directly() {
        // x = (a > 1) ? 2 : 3
        let ternary =
            Expression::Relation(Operator::Gt, vec![lvalue("a"), int(1), int(2), int(3)])
                .shared();
        let expr = Expression::Symbol(LValue::new("x"), ternary).shared();
        assert_eq!(
            lower(expr),
            "_t1 = a > (1:int:4);\n\
             CMP _t1 (0:int:4);\n\
             IF _t1 == (0:int:4) GOTO _L1;\n\
             x = (2:int:4);\n\
             GOTO _L2;\n\
             LABEL _L1:\n\
             x = (3:int:4);\n\
             LABEL _L2:\n"
        );
    }

    #[test]
    fn test_nested_ternary_joins_in_temporary() {
        // (a > 1) ? 2 : 3, no assignment target
        let ternary =
            Expression::Relation(Operator::Gt, vec![lvalue("a"), int(1), int(2), int(3)])
                .shared();
        let (mut p, mut i) = (0, 0);
        let queue = queue_from_expression(&ternary, &mut p, &mut i);
        let (mut t, mut l) = (0, 0);
        let (instructions, result) =
            expression_queue_to_instructions(queue, &mut t, &mut l).unwrap();
        assert_eq!(result.as_deref(), Some("_t2"));
        let text = instructions_to_string(&instructions);
        assert!(text.contains("_t2 = (2:int:4);"));
        assert!(text.contains("_t2 = (3:int:4);"));
    }

    #[test]
    fn test_result_name() {
        let sum = Expression::Relation(Operator::Add, vec![int(1), int(2)]).shared();
        let (mut p, mut i) = (0, 0);
        let queue = queue_from_expression(&sum, &mut p, &mut i);
        let (mut t, mut l) = (0, 0);
        let (_, result) = expression_queue_to_instructions(queue, &mut t, &mut l).unwrap();
        assert_eq!(result.as_deref(), Some("_t1"));
    }
}
