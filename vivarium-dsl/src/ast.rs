//! Abstract syntax tree for the configuration language.
//!
//! Nodes live in one arena ([`Ast`]) and address each other by [`NodeId`].
//! The engine owns a single master arena for everything it ever parses, so
//! the event scheduler can keep bare `NodeId`s to deferred actions: the
//! arena outlives every queue that points into it, and the queue never owns
//! or frees tree memory.

use serde::{Deserialize, Serialize};
use vivarium_core::{literal_of, EntryId, EntryKind, ReturnKind, ScopeId, SymbolTable, Value};

use crate::lexer::Symbol;

/// Index of a node in the AST arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

/// Unary numeric operators. The surface grammar has no prefix operators (a
/// faithful quirk of the language); these nodes appear in engine-synthesized
/// trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Math1Op {
    Neg,
    Not,
}

impl Math1Op {
    pub fn apply(self, v: f64) -> f64 {
        match self {
            Math1Op::Neg => -v,
            Math1Op::Not => {
                if v == 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Math1Op::Neg => "-",
            Math1Op::Not => "!",
        }
    }
}

/// Binary numeric operators. Comparisons and logic yield 0/1; `&&` and `||`
/// are eager (both operands already evaluated when applied).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Math2Op {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl Math2Op {
    pub fn from_symbol(symbol: Symbol) -> Option<Self> {
        Some(match symbol {
            Symbol::Plus => Math2Op::Add,
            Symbol::Minus => Math2Op::Sub,
            Symbol::Star => Math2Op::Mul,
            Symbol::Slash => Math2Op::Div,
            Symbol::Percent => Math2Op::Mod,
            Symbol::StarStar => Math2Op::Pow,
            Symbol::EqEq => Math2Op::Eq,
            Symbol::NotEq => Math2Op::Ne,
            Symbol::Lt => Math2Op::Lt,
            Symbol::LtEq => Math2Op::Le,
            Symbol::Gt => Math2Op::Gt,
            Symbol::GtEq => Math2Op::Ge,
            Symbol::AndAnd => Math2Op::And,
            Symbol::OrOr => Math2Op::Or,
            _ => return None,
        })
    }

    pub fn apply(self, a: f64, b: f64) -> f64 {
        let bool_num = |v: bool| if v { 1.0 } else { 0.0 };
        match self {
            Math2Op::Add => a + b,
            Math2Op::Sub => a - b,
            Math2Op::Mul => a * b,
            Math2Op::Div => a / b,
            Math2Op::Mod => a % b,
            Math2Op::Pow => a.powf(b),
            Math2Op::Eq => bool_num(a == b),
            Math2Op::Ne => bool_num(a != b),
            Math2Op::Lt => bool_num(a < b),
            Math2Op::Le => bool_num(a <= b),
            Math2Op::Gt => bool_num(a > b),
            Math2Op::Ge => bool_num(a >= b),
            Math2Op::And => bool_num(a != 0.0 && b != 0.0),
            Math2Op::Or => bool_num(a != 0.0 || b != 0.0),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Math2Op::Add => "+",
            Math2Op::Sub => "-",
            Math2Op::Mul => "*",
            Math2Op::Div => "/",
            Math2Op::Mod => "%",
            Math2Op::Pow => "**",
            Math2Op::Eq => "==",
            Math2Op::Ne => "!=",
            Math2Op::Lt => "<",
            Math2Op::Le => "<=",
            Math2Op::Gt => ">",
            Math2Op::Ge => ">=",
            Math2Op::And => "&&",
            Math2Op::Or => "||",
        }
    }
}

/// String operators: concatenation, repetition, and lexicographic
/// comparisons (which yield numeric 0/1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrOp {
    Concat,
    Repeat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl StrOp {
    pub fn from_symbol(symbol: Symbol) -> Option<Self> {
        Some(match symbol {
            Symbol::Plus => StrOp::Concat,
            Symbol::Star => StrOp::Repeat,
            Symbol::EqEq => StrOp::Eq,
            Symbol::NotEq => StrOp::Ne,
            Symbol::Lt => StrOp::Lt,
            Symbol::LtEq => StrOp::Le,
            Symbol::Gt => StrOp::Gt,
            Symbol::GtEq => StrOp::Ge,
            _ => return None,
        })
    }

    /// True for the operators whose result is numeric rather than a string.
    pub fn is_comparison(self) -> bool {
        !matches!(self, StrOp::Concat | StrOp::Repeat)
    }

    pub fn apply(self, a: &str, b: &Value) -> Value {
        match self {
            StrOp::Concat => Value::Str(format!("{a}{}", b.as_str())),
            StrOp::Repeat => {
                let count = b.as_num().floor().max(0.0) as usize;
                Value::Str(a.repeat(count))
            }
            StrOp::Eq => Value::from_bool(a == b.as_str()),
            StrOp::Ne => Value::from_bool(a != b.as_str()),
            StrOp::Lt => Value::from_bool(a < b.as_str().as_str()),
            StrOp::Le => Value::from_bool(a <= b.as_str().as_str()),
            StrOp::Gt => Value::from_bool(a > b.as_str().as_str()),
            StrOp::Ge => Value::from_bool(a >= b.as_str().as_str()),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            StrOp::Concat => "+",
            StrOp::Repeat => "*",
            StrOp::Eq => "==",
            StrOp::Ne => "!=",
            StrOp::Lt => "<",
            StrOp::Le => "<=",
            StrOp::Gt => ">",
            StrOp::Ge => ">=",
        }
    }
}

/// One AST node.
#[derive(Debug, Clone)]
pub enum Node {
    /// Reference to a symbol-table entry, resolved at parse time.
    Var(EntryId),
    /// A literal, held as an owned temporary value.
    Literal(Value),
    /// Ordered statements evaluated against a scope.
    Block { scope: ScopeId, children: Vec<NodeId> },
    Math1 { op: Math1Op, child: NodeId },
    Math2 { op: Math2Op, lhs: NodeId, rhs: NodeId },
    StrOp2 { op: StrOp, lhs: NodeId, rhs: NodeId },
    Assign { lhs: NodeId, rhs: NodeId },
    /// First child is the callee; the rest are arguments.
    Call { callee: NodeId, args: Vec<NodeId> },
    /// Deferred action registered with the named event stream on evaluation.
    Event {
        name: String,
        action: NodeId,
        args: Vec<NodeId>,
    },
}

/// Arena of AST nodes.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn new() -> Self {
        Ast { nodes: Vec::new() }
    }

    pub fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append a child to an existing block node.
    pub fn add_child(&mut self, block: NodeId, child: NodeId) {
        match &mut self.nodes[block.0 as usize] {
            Node::Block { children, .. } => children.push(child),
            _ => unreachable!("add_child target must be a block"),
        }
    }

    /// Static numeric-vs-string classification, used to pick between math
    /// and string operations at parse time.
    pub fn is_numeric(&self, id: NodeId, table: &SymbolTable) -> bool {
        match self.node(id) {
            Node::Var(entry) => table.entry(*entry).is_numeric(),
            Node::Literal(value) => value.is_num(),
            Node::Math1 { .. } | Node::Math2 { .. } => true,
            Node::StrOp2 { op, .. } => op.is_comparison(),
            Node::Assign { lhs, .. } => self.is_numeric(*lhs, table),
            Node::Call { callee, .. } => match self.node(*callee) {
                Node::Var(entry) => match &table.entry(*entry).kind {
                    EntryKind::Function(f) => f.returns == ReturnKind::Num,
                    _ => true,
                },
                _ => true,
            },
            Node::Block { .. } | Node::Event { .. } => false,
        }
    }

    /// Render a node back to source text (used when writing pending events).
    pub fn write_node(&self, id: NodeId, table: &SymbolTable, out: &mut String) {
        match self.node(id) {
            Node::Var(entry) => out.push_str(&table.entry(*entry).name),
            Node::Literal(value) => out.push_str(&literal_of(value)),
            Node::Block { children, .. } => {
                out.push_str("{ ");
                for child in children {
                    self.write_node(*child, table, out);
                    out.push_str("; ");
                }
                out.push('}');
            }
            Node::Math1 { op, child } => {
                out.push_str(op.symbol());
                self.write_node(*child, table, out);
            }
            Node::Math2 { op, lhs, rhs } => {
                self.write_node(*lhs, table, out);
                out.push_str(&format!(" {} ", op.symbol()));
                self.write_node(*rhs, table, out);
            }
            Node::StrOp2 { op, lhs, rhs } => {
                self.write_node(*lhs, table, out);
                out.push_str(&format!(" {} ", op.symbol()));
                self.write_node(*rhs, table, out);
            }
            Node::Assign { lhs, rhs } => {
                self.write_node(*lhs, table, out);
                out.push_str(" = ");
                self.write_node(*rhs, table, out);
            }
            Node::Call { callee, args } => {
                self.write_node(*callee, table, out);
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_node(*arg, table, out);
                }
                out.push(')');
            }
            Node::Event { name, action, args } => {
                out.push('@');
                out.push_str(name);
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_node(*arg, table, out);
                }
                out.push_str(") ");
                self.write_node(*action, table, out);
            }
        }
    }

    /// Convenience wrapper around [`write_node`](Self::write_node).
    pub fn render(&self, id: NodeId, table: &SymbolTable) -> String {
        let mut out = String::new();
        self.write_node(id, table, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_repeat_floors_and_clamps_the_count() {
        assert_eq!(
            StrOp::Repeat.apply("01", &Value::Num(7.0)),
            Value::Str("01010101010101".into())
        );
        assert_eq!(
            StrOp::Repeat.apply("ab", &Value::Num(2.9)),
            Value::Str("abab".into())
        );
        assert_eq!(StrOp::Repeat.apply("ab", &Value::Num(-3.0)), Value::Str("".into()));
    }

    #[test]
    fn logic_operators_are_numeric_zero_one() {
        assert_eq!(Math2Op::And.apply(2.0, 3.0), 1.0);
        assert_eq!(Math2Op::And.apply(2.0, 0.0), 0.0);
        assert_eq!(Math2Op::Or.apply(0.0, 0.0), 0.0);
        assert_eq!(Math2Op::Le.apply(2.0, 2.0), 1.0);
    }

    #[test]
    fn rendering_rebuilds_source_text() {
        let table = SymbolTable::new("root");
        let mut ast = Ast::new();
        let lhs = ast.push(Node::Literal(Value::Num(2.0)));
        let rhs = ast.push(Node::Literal(Value::Str("hi".into())));
        let node = ast.push(Node::Math2 {
            op: Math2Op::Add,
            lhs,
            rhs,
        });
        assert_eq!(ast.render(node, &table), "2 + \"hi\"");
    }
}
