//! Symbol-table cells.
//!
//! An [`Entry`] is the atomic cell of the symbol table: a named, described,
//! possibly built-in value with one of several storage strategies behind a
//! uniform read/convert/assign surface. Local entries own their datum; linked
//! entries forward to host-owned cells; scope entries point at a child scope;
//! function entries wrap a callable.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::CallError;
use crate::scope::ScopeId;
use crate::value::{format_num, Value};

/// Getter half of a linked-functions entry.
pub type GetFn = Rc<dyn Fn() -> Value>;
/// Setter half of a linked-functions entry.
pub type SetFn = Rc<dyn Fn(Value)>;
/// A native callable installed as a function entry.
pub type NativeFn = Rc<dyn Fn(&[Value]) -> Result<Value, CallError>>;

/// Shared handle into a host-owned variable. The host keeps its own clone of
/// the cell; dropping the entry never drops host state.
#[derive(Debug, Clone)]
pub enum HostLink {
    Num(Rc<Cell<f64>>),
    Int(Rc<Cell<i64>>),
    Bool(Rc<Cell<bool>>),
    Str(Rc<RefCell<String>>),
}

impl HostLink {
    pub fn is_numeric(&self) -> bool {
        !matches!(self, HostLink::Str(_))
    }

    /// Read the host variable, converting to a script value.
    pub fn get(&self) -> Value {
        match self {
            HostLink::Num(c) => Value::Num(c.get()),
            HostLink::Int(c) => Value::Num(c.get() as f64),
            HostLink::Bool(c) => Value::from_bool(c.get()),
            HostLink::Str(c) => Value::Str(c.borrow().clone()),
        }
    }

    /// Write the host variable, converting lossily as needed.
    pub fn set(&self, value: &Value) {
        match self {
            HostLink::Num(c) => c.set(value.as_num()),
            HostLink::Int(c) => c.set(value.as_num() as i64),
            HostLink::Bool(c) => c.set(value.is_truthy()),
            HostLink::Str(c) => *c.borrow_mut() = value.as_str(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        if self.is_numeric() {
            "Value"
        } else {
            "String"
        }
    }
}

/// Whether a function entry produces a number or a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Num,
    Str,
}

/// The body of a function entry.
#[derive(Clone)]
pub enum FunctionBody {
    /// A native callable over already-converted argument values.
    Native(NativeFn),
    /// The EVAL builtin: the evaluator re-enters the parser with the string
    /// argument, so it cannot be expressed as a plain native callable.
    Eval,
}

impl fmt::Debug for FunctionBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionBody::Native(_) => f.write_str("Native(..)"),
            FunctionBody::Eval => f.write_str("Eval"),
        }
    }
}

/// A callable symbol-table entry.
#[derive(Debug, Clone)]
pub struct FunctionEntry {
    pub returns: ReturnKind,
    pub body: FunctionBody,
}

/// Storage strategy of an entry.
#[derive(Clone)]
pub enum EntryKind {
    /// Locally owned number.
    Num(f64),
    /// Locally owned string.
    Str(String),
    /// Forwarded to a host variable.
    Link(HostLink),
    /// Forwarded through a getter/setter pair.
    LinkFns {
        get: GetFn,
        set: SetFn,
        numeric: bool,
    },
    /// A sub-scope.
    Scope(ScopeId),
    /// A callable.
    Function(FunctionEntry),
}

impl fmt::Debug for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Num(v) => write!(f, "Num({v})"),
            EntryKind::Str(s) => write!(f, "Str({s:?})"),
            EntryKind::Link(l) => write!(f, "Link({l:?})"),
            EntryKind::LinkFns { numeric, .. } => write!(f, "LinkFns {{ numeric: {numeric} }}"),
            EntryKind::Scope(id) => write!(f, "Scope({id:?})"),
            EntryKind::Function(fe) => write!(f, "Function({:?})", fe.returns),
        }
    }
}

/// One symbol-table cell.
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub desc: String,
    /// Built-in entries are installed by the engine and suppressed from
    /// serialization.
    pub builtin: bool,
    /// The scope holding this entry; `None` only while the entry is being
    /// constructed.
    pub owner: Option<ScopeId>,
    pub kind: EntryKind,
}

impl Entry {
    pub fn new(name: impl Into<String>, desc: impl Into<String>, kind: EntryKind) -> Self {
        Entry {
            name: name.into(),
            desc: desc.into(),
            builtin: false,
            owner: None,
            kind,
        }
    }

    pub fn is_numeric(&self) -> bool {
        match &self.kind {
            EntryKind::Num(_) => true,
            EntryKind::Str(_) => false,
            EntryKind::Link(l) => l.is_numeric(),
            EntryKind::LinkFns { numeric, .. } => *numeric,
            EntryKind::Scope(_) | EntryKind::Function(_) => false,
        }
    }

    pub fn is_string(&self) -> bool {
        match &self.kind {
            EntryKind::Str(_) => true,
            EntryKind::Link(l) => !l.is_numeric(),
            EntryKind::LinkFns { numeric, .. } => !*numeric,
            _ => false,
        }
    }

    pub fn is_scope(&self) -> bool {
        matches!(self.kind, EntryKind::Scope(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, EntryKind::Function(_))
    }

    /// Entries defined by the config itself (as opposed to linked into host
    /// state) get an explicit type name when written back out.
    pub fn is_local(&self) -> bool {
        matches!(
            self.kind,
            EntryKind::Num(_) | EntryKind::Str(_) | EntryKind::Scope(_)
        )
    }

    pub fn scope_id(&self) -> Option<ScopeId> {
        match self.kind {
            EntryKind::Scope(id) => Some(id),
            _ => None,
        }
    }

    /// A short human-readable word for this entry's kind, used in error
    /// messages.
    pub fn kind_word(&self) -> &'static str {
        match &self.kind {
            EntryKind::Num(_) | EntryKind::Link(_) | EntryKind::LinkFns { .. } => "variable",
            EntryKind::Str(_) => "variable",
            EntryKind::Scope(_) => "scope",
            EntryKind::Function(_) => "function",
        }
    }
}

/// Render a string as a double-quoted source literal with standard escapes.
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

/// Render a value as a source literal: strings quoted, numbers canonical.
pub fn literal_of(value: &Value) -> String {
    match value {
        Value::Num(v) => format_num(*v),
        Value::Str(s) => quote_string(s),
    }
}
