//! The AST evaluator.
//!
//! Every node evaluates to an [`EvalValue`]: a reference to a symbol-table
//! entry, an owned temporary value, an error marker, or nothing. Temporaries
//! have exactly one consumer and are dropped after their value is read; an
//! error propagates through enclosing operations like any other value and is
//! logged where it would otherwise be discarded.

use std::collections::BTreeMap;

use tracing::{debug, warn};
use vivarium_core::{
    CallError, EntryKind, FunctionBody, SymbolTable, TypeRegistry, Value,
};
use vivarium_events::EventSchedule;

use crate::ast::{Ast, Node, NodeId};
use crate::lexer::Lexer;
use crate::parser::{ensure_trailing_semi, Parser};

use vivarium_core::EntryId;

/// Result of evaluating one AST node.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalValue {
    /// A symbol-table entry (assignable, persistent).
    Var(EntryId),
    /// An owned temporary produced by the evaluation.
    Temp(Value),
    /// An error marker; carries its message and propagates.
    Error(String),
    /// No value (blocks, event registrations).
    Void,
}

impl EvalValue {
    pub fn is_error(&self) -> bool {
        matches!(self, EvalValue::Error(_))
    }
}

/// Everything evaluation may touch besides the (immutable) AST.
pub struct EvalContext<'a> {
    pub table: &'a mut SymbolTable,
    pub types: &'a TypeRegistry,
    pub events: &'a mut BTreeMap<String, EventSchedule<NodeId>>,
}

/// Read a value out of an evaluation result, forwarding errors.
pub fn value_of(table: &SymbolTable, result: EvalValue) -> Result<Value, String> {
    match result {
        EvalValue::Var(id) => table.value_of(id).map_err(|e| e.to_string()),
        EvalValue::Temp(value) => Ok(value),
        EvalValue::Error(message) => Err(message),
        EvalValue::Void => Err("expression has no value".to_string()),
    }
}

/// The string form of an evaluation result, for the eval surface. Error
/// markers print their message; entries that cannot convert print empty.
pub fn string_form(table: &SymbolTable, result: &EvalValue) -> String {
    match result {
        EvalValue::Var(id) => table.string_of(*id).unwrap_or_default(),
        EvalValue::Temp(value) => value.as_str(),
        EvalValue::Error(message) => message.clone(),
        EvalValue::Void => String::new(),
    }
}

/// Evaluate one node of `ast` against the context.
pub fn eval(ast: &Ast, node: NodeId, ctx: &mut EvalContext<'_>) -> EvalValue {
    match ast.node(node) {
        Node::Var(id) => EvalValue::Var(*id),

        Node::Literal(value) => EvalValue::Temp(value.clone()),

        Node::Block { children, .. } => {
            for child in children {
                let result = eval(ast, *child, ctx);
                if let EvalValue::Error(message) = result {
                    warn!(error = %message, "statement produced an error value");
                }
            }
            EvalValue::Void
        }

        Node::Math1 { op, child } => {
            let value = eval(ast, *child, ctx);
            match value_of(ctx.table, value) {
                Ok(v) => EvalValue::Temp(Value::Num(op.apply(v.as_num()))),
                Err(message) => EvalValue::Error(message),
            }
        }

        Node::Math2 { op, lhs, rhs } => {
            let a = eval(ast, *lhs, ctx);
            let a = match value_of(ctx.table, a) {
                Ok(v) => v,
                Err(message) => return EvalValue::Error(message),
            };
            let b = eval(ast, *rhs, ctx);
            let b = match value_of(ctx.table, b) {
                Ok(v) => v,
                Err(message) => return EvalValue::Error(message),
            };
            EvalValue::Temp(Value::Num(op.apply(a.as_num(), b.as_num())))
        }

        Node::StrOp2 { op, lhs, rhs } => {
            let a = eval(ast, *lhs, ctx);
            let a = match value_of(ctx.table, a) {
                Ok(v) => v,
                Err(message) => return EvalValue::Error(message),
            };
            let b = eval(ast, *rhs, ctx);
            let b = match value_of(ctx.table, b) {
                Ok(v) => v,
                Err(message) => return EvalValue::Error(message),
            };
            EvalValue::Temp(op.apply(&a.as_str(), &b))
        }

        Node::Assign { lhs, rhs } => {
            let target = match eval(ast, *lhs, ctx) {
                EvalValue::Var(id) => id,
                EvalValue::Error(message) => return EvalValue::Error(message),
                EvalValue::Temp(_) => {
                    return EvalValue::Error("cannot assign to a temporary value".to_string())
                }
                EvalValue::Void => {
                    return EvalValue::Error("cannot assign to an empty expression".to_string())
                }
            };
            let source = eval(ast, *rhs, ctx);
            let value = match value_of(ctx.table, source) {
                Ok(v) => v,
                Err(message) => return EvalValue::Error(message),
            };
            if let Err(e) = ctx.table.assign(target, &value) {
                return EvalValue::Error(e.to_string());
            }
            EvalValue::Var(target)
        }

        Node::Call { callee, args } => eval_call(ast, *callee, args, ctx),

        Node::Event { name, action, args } => {
            // Argument defaults: first 0, no repeat, no max.
            let mut timing = [0.0, 0.0, -1.0];
            for (i, arg) in args.iter().enumerate().take(3) {
                let value = eval(ast, *arg, ctx);
                match value_of(ctx.table, value) {
                    Ok(v) => timing[i] = v.as_num(),
                    Err(message) => return EvalValue::Error(message),
                }
            }
            match ctx.events.get_mut(name) {
                Some(schedule) => {
                    debug!(event = %name, first = timing[0], repeat = timing[1], max = timing[2],
                           "registering scheduled event");
                    schedule.schedule(*action, timing[0], timing[1], timing[2]);
                    EvalValue::Void
                }
                None => EvalValue::Error(format!("unknown event type '{name}'")),
            }
        }
    }
}

fn eval_call(ast: &Ast, callee: NodeId, args: &[NodeId], ctx: &mut EvalContext<'_>) -> EvalValue {
    let (fun, name) = match eval(ast, callee, ctx) {
        EvalValue::Var(id) => {
            let entry = ctx.table.entry(id);
            match &entry.kind {
                EntryKind::Function(f) => (f.clone(), entry.name.clone()),
                _ => {
                    return EvalValue::Error(
                        CallError::NotCallable {
                            name: entry.name.clone(),
                        }
                        .to_string(),
                    )
                }
            }
        }
        EvalValue::Error(message) => return EvalValue::Error(message),
        _ => {
            return EvalValue::Error(
                CallError::NotCallable {
                    name: "<temporary>".to_string(),
                }
                .to_string(),
            )
        }
    };

    // Arguments evaluate left to right; an unconvertible argument turns the
    // whole call into an error value.
    let mut arg_values = Vec::with_capacity(args.len());
    for arg in args {
        let value = eval(ast, *arg, ctx);
        match value_of(ctx.table, value) {
            Ok(v) => arg_values.push(v),
            Err(message) => return EvalValue::Error(message),
        }
    }

    match fun.body {
        FunctionBody::Native(f) => match f(&arg_values) {
            Ok(value) => EvalValue::Temp(value),
            Err(e) => EvalValue::Error(e.to_string()),
        },
        FunctionBody::Eval => {
            if arg_values.len() != 1 {
                return EvalValue::Error(
                    CallError::Arity {
                        name,
                        expected: 1,
                        got: arg_values.len(),
                    }
                    .to_string(),
                );
            }
            run_eval_builtin(&arg_values[0].as_str(), ctx)
        }
    }
}

/// The EVAL builtin: parse and run one statement against the root scope.
/// The snippet's tree is discarded afterwards, which is why event
/// declarations are rejected inside it.
fn run_eval_builtin(text: &str, ctx: &mut EvalContext<'_>) -> EvalValue {
    debug!(%text, "EVAL");
    let mut tokens = match Lexer::new(text, "eval command").tokenize() {
        Ok(tokens) => tokens,
        Err(e) => return EvalValue::Error(e.to_string()),
    };
    ensure_trailing_semi(&mut tokens);

    let mut snippet = Ast::new();
    let root = ctx.table.root();
    let no_events: [String; 0] = [];
    let mut parser = Parser::new(
        tokens,
        "eval command",
        ctx.table,
        ctx.types,
        &no_events,
        &mut snippet,
        false,
    );
    let node = match parser.parse_statement(root) {
        Ok(Some(node)) => node,
        Ok(None) => return EvalValue::Temp(Value::Str(String::new())),
        Err(e) => return EvalValue::Error(e.to_string()),
    };
    drop(parser);

    let result = eval(&snippet, node, ctx);
    let text = string_form(ctx.table, &result);
    EvalValue::Temp(Value::Str(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Math1Op, Math2Op};

    fn empty_events() -> BTreeMap<String, EventSchedule<NodeId>> {
        BTreeMap::new()
    }

    #[test]
    fn unary_math_produces_a_fresh_temporary() {
        let mut table = SymbolTable::new("root");
        let types = TypeRegistry::new();
        let mut events = empty_events();
        let mut ast = Ast::new();
        let child = ast.push(Node::Literal(Value::Num(4.0)));
        let node = ast.push(Node::Math1 {
            op: Math1Op::Neg,
            child,
        });

        let mut ctx = EvalContext {
            table: &mut table,
            types: &types,
            events: &mut events,
        };
        assert_eq!(eval(&ast, node, &mut ctx), EvalValue::Temp(Value::Num(-4.0)));

        let node = ast.push(Node::Math1 {
            op: Math1Op::Not,
            child,
        });
        let mut ctx = EvalContext {
            table: &mut table,
            types: &types,
            events: &mut events,
        };
        assert_eq!(eval(&ast, node, &mut ctx), EvalValue::Temp(Value::Num(0.0)));
    }

    #[test]
    fn errors_propagate_through_math() {
        let mut table = SymbolTable::new("root");
        let root = table.root();
        let (scope_entry, _) = table.add_scope(root, "f", "", "Struct").unwrap();
        let types = TypeRegistry::new();
        let mut events = empty_events();

        let mut ast = Ast::new();
        let lhs = ast.push(Node::Var(scope_entry));
        let rhs = ast.push(Node::Literal(Value::Num(1.0)));
        let node = ast.push(Node::Math2 {
            op: Math2Op::Add,
            lhs,
            rhs,
        });

        let mut ctx = EvalContext {
            table: &mut table,
            types: &types,
            events: &mut events,
        };
        assert!(eval(&ast, node, &mut ctx).is_error());
    }

    #[test]
    fn calling_a_non_function_yields_an_error_value() {
        let mut table = SymbolTable::new("root");
        let root = table.root();
        let var = table.add_value(root, "x", 1.0, "").unwrap();
        let types = TypeRegistry::new();
        let mut events = empty_events();

        let mut ast = Ast::new();
        let callee = ast.push(Node::Var(var));
        let node = ast.push(Node::Call {
            callee,
            args: vec![],
        });

        let mut ctx = EvalContext {
            table: &mut table,
            types: &types,
            events: &mut events,
        };
        let result = eval(&ast, node, &mut ctx);
        assert_eq!(
            result,
            EvalValue::Error("Cannot call a function on non-function 'x'.".to_string())
        );
    }
}
