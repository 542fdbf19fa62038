//! Shunting-yard queue.
//!
//! Flattens an `Expression` tree into a deque of operators and operand
//! leaves in reverse-Polish order, honoring precedence and
//! associativity. Because the tree already encodes the grouping the
//! front end parsed, operands arrive in tree order and the operator
//! stack only ever holds the current spine's operators.
//!
//! Example:
//!
//!   Input: 5 + 3 * 2
//!
//!   Step 1: push 5 to output
//!   Step 2: push + to the operator stack
//!   Step 3: push 3 to output
//!   Step 4: * binds tighter, push to the operator stack
//!   Step 5: push 2 to output
//!   Step 6: pop * and + to output
//!
//!   Result: 5 3 2 * +

use credence_core::operators::Operator;
use credence_core::values::{Expression, ExpressionRef, LValue};
use std::collections::VecDeque;

/// One postfix item: an operator or an expression leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueItem {
    Op(Operator),
    Operand(ExpressionRef),
}

pub type RvalueQueue = VecDeque<QueueItem>;

/// Builds the postfix queue. The parameter counters mint the `_pN_M`
/// call-argument slots: `N` restarts per statement, `M` is unique for
/// the enclosing function.
pub struct ShuntingYard<'a> {
    queue: RvalueQueue,
    parameter_size: &'a mut i32,
    parameter_ident: &'a mut i32,
}

impl<'a> ShuntingYard<'a> {
    pub fn new(parameter_size: &'a mut i32, parameter_ident: &'a mut i32) -> Self {
        ShuntingYard {
            queue: VecDeque::new(),
            parameter_size,
            parameter_ident,
        }
    }

    pub fn into_queue(self) -> RvalueQueue {
        self.queue
    }

    /// Shunt one expression; the operator stack is drained at the end.
    pub fn shunt_expression(&mut self, expression: &ExpressionRef) {
        let mut operators = Vec::new();
        self.shunt(expression, &mut operators);
        while let Some(op) = operators.pop() {
            self.queue.push_back(QueueItem::Op(op));
        }
    }

    fn shunt(&mut self, expression: &ExpressionRef, operators: &mut Vec<Operator>) {
        match expression.as_ref() {
            Expression::Literal(_) | Expression::Array(_) | Expression::LValue(_) => {
                self.queue.push_back(QueueItem::Operand(expression.clone()));
            }
            Expression::Pointer(inner) => self.shunt(inner, operators),
            Expression::Unary(op, operand) => {
                self.shunt(operand, operators);
                operators.push(*op);
                self.balance_queue(operators);
                self.balance_operator_precedence(operators, *op);
            }
            Expression::Relation(op, operands) if operands.len() == 2 => {
                self.shunt(&operands[0], operators);
                operators.push(*op);
                self.shunt(&operands[1], operators);
                self.balance_queue(operators);
                self.balance_operator_precedence(operators, *op);
            }
            Expression::Relation(op, operands) if operands.len() == 4 => {
                // ternary: [cond-lhs, cond-rhs, then, else]
                operators.push(Operator::Ternary);
                operators.push(Operator::Push);
                self.shunt(&operands[2], operators);
                self.shunt(&operands[3], operators);
                operators.push(*op);
                self.shunt(&operands[0], operators);
                self.shunt(&operands[1], operators);
                self.balance_queue(operators);
                self.balance_operator_precedence(operators, *op);
            }
            Expression::Relation(_, _) => {}
            Expression::Function(callee, arguments) => {
                self.shunt_argument_expressions(callee, arguments);
            }
            Expression::Symbol(lvalue, rvalue) => {
                let op = Operator::Assign;
                let lhs = Expression::LValue(lvalue.clone()).shared();
                self.shunt(&lhs, operators);
                self.shunt(rvalue, operators);
                operators.push(op);
                self.balance_queue(operators);
                self.balance_operator_precedence(operators, op);
            }
        }
    }

    /// Calls synthesize per-argument assignments into fresh `_pN_M`
    /// slots, then a `PUSH` per slot followed by `CALL`.
    fn shunt_argument_expressions(&mut self, callee: &LValue, arguments: &[ExpressionRef]) {
        let mut operators: Vec<Operator> = Vec::new();
        let op = Operator::Call;

        self.queue
            .push_back(QueueItem::Operand(Expression::LValue(callee.clone()).shared()));

        let mut slots: Vec<ExpressionRef> = Vec::new();
        for argument in arguments {
            *self.parameter_size += 1;
            *self.parameter_ident += 1;
            let name = format!("_p{}_{}", self.parameter_size, self.parameter_ident);
            let slot = Expression::LValue(LValue::new(name)).shared();
            slots.push(slot.clone());
            self.shunt(&slot, &mut operators);
            self.shunt(argument, &mut operators);
            operators.push(Operator::Assign);
            self.balance_queue(&mut operators);
            self.balance_operator_precedence(&mut operators, Operator::Assign);
        }

        operators.push(op);
        for slot in &slots {
            operators.push(Operator::Push);
            self.shunt(slot, &mut operators);
        }
        self.balance_queue(&mut operators);
        self.balance_operator_precedence(&mut operators, op);
    }

    /// Re-balance the queue when the stack holds a single operator.
    fn balance_queue(&mut self, operators: &mut Vec<Operator>) {
        if operators.len() == 1 {
            let op = operators.pop().unwrap();
            self.queue.push_back(QueueItem::Op(op));
        }
    }

    /// Precedence check of the queue and operator stack. A
    /// left-associative incoming operator drains the stack; a
    /// right-associative one pops only strictly-looser entries.
    fn balance_operator_precedence(&mut self, operators: &mut Vec<Operator>, op1: Operator) {
        while let Some(&op2) = operators.last() {
            if op1.is_left_associative()
                || (!op1.is_left_associative() && op1.precedence() < op2.precedence())
            {
                operators.pop();
                self.queue.push_back(QueueItem::Op(op2));
            } else {
                break;
            }
        }
    }
}

/// Single expression to a queue of operators and operands.
pub fn queue_from_expression(
    expression: &ExpressionRef,
    parameter_size: &mut i32,
    parameter_ident: &mut i32,
) -> RvalueQueue {
    let mut yard = ShuntingYard::new(parameter_size, parameter_ident);
    yard.shunt_expression(expression);
    yard.into_queue()
}

/// List of expressions to a single queue.
pub fn queue_from_expressions(
    expressions: &[ExpressionRef],
    parameter_size: &mut i32,
    parameter_ident: &mut i32,
) -> RvalueQueue {
    let mut yard = ShuntingYard::new(parameter_size, parameter_ident);
    for expression in expressions {
        yard.shunt_expression(expression);
    }
    yard.into_queue()
}

/// Queue rendered as operators and operands in reverse-Polish notation,
/// used by diagnostics and tests.
pub fn queue_to_string(queue: &RvalueQueue) -> String {
    let mut parts = Vec::new();
    for item in queue {
        match item {
            QueueItem::Op(op) => parts.push(op.to_string()),
            QueueItem::Operand(operand) => {
                parts.push(operand.leaf_text().unwrap_or_default());
            }
        }
    }
    parts.join(" ")
}
