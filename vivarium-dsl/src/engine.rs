//! The engine facade: load, evaluate, update, write.
//!
//! `ScriptEngine` owns every subsystem: the symbol table, the type registry,
//! the master AST arena, and one event stream per registered event type. The
//! master arena accumulates every block the engine ever parses, so node ids
//! held by the event queues stay valid for the engine's whole lifetime.
//!
//! Two event streams exist out of the box, matching how a simulation host
//! drives its script: `START` fires once before the first tick, and `UPDATE`
//! advances with [`ScriptEngine::update`].

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;

use tracing::{debug, warn};
use vivarium_core::{
    native_f1, native_f2, native_f3, native_variadic, ConfigError, EntryId, FunctionBody,
    FunctionEntry, GetFn, HostLink, ReturnKind, ScopeId, SetFn, SymbolTable, TypeInfo,
    TypeRegistry, Value, VivariumResult,
};
use vivarium_events::EventSchedule;

use crate::ast::{Ast, Node, NodeId};
use crate::eval::{eval, string_form, EvalContext, EvalValue};
use crate::lexer::Lexer;
use crate::parser::{ensure_trailing_semi, Parser};
use crate::writer;

/// Top-level configuration and scripting engine.
pub struct ScriptEngine {
    table: SymbolTable,
    types: TypeRegistry,
    ast: Ast,
    root_block: NodeId,
    events: BTreeMap<String, EventSchedule<NodeId>>,
    output: Rc<RefCell<String>>,
    exit_flag: Rc<Cell<bool>>,
    update: u64,
    started: bool,
}

impl ScriptEngine {
    pub fn new() -> Self {
        let mut table = SymbolTable::new("vivarium");
        let types = TypeRegistry::new();
        let mut ast = Ast::new();
        let root_scope = table.root();
        let root_block = ast.push(Node::Block {
            scope: root_scope,
            children: Vec::new(),
        });

        let output = Rc::new(RefCell::new(String::new()));
        let exit_flag = Rc::new(Cell::new(false));
        install_builtins(&mut table, &output, &exit_flag);

        let mut events = BTreeMap::new();
        events.insert("START".to_string(), EventSchedule::new());
        events.insert("UPDATE".to_string(), EventSchedule::new());

        ScriptEngine {
            table,
            types,
            ast,
            root_block,
            events,
            output,
            exit_flag,
            update: 0,
            started: false,
        }
    }

    // -- Loading and evaluating ---------------------------------------------

    /// Load a configuration file: tokenize, parse, and run its statements.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> VivariumResult<()> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let name = path.display().to_string();
        self.load_str(&text, &name)
    }

    /// Load statements from an in-memory string. `source` names the input in
    /// diagnostics.
    pub fn load_str(&mut self, text: &str, source: &str) -> VivariumResult<()> {
        debug!(source, "loading statements");
        let tokens = Lexer::new(text, source).tokenize()?;
        let root = self.table.root();
        let event_names: Vec<String> = self.events.keys().cloned().collect();
        let mut parser = Parser::new(
            tokens,
            source,
            &mut self.table,
            &self.types,
            &event_names,
            &mut self.ast,
            true,
        );
        let block = parser.parse_statement_list(root)?;
        drop(parser);

        // Keep the new block in the master tree: queued events borrow into it.
        self.ast.add_child(self.root_block, block);

        let mut ctx = EvalContext {
            table: &mut self.table,
            types: &self.types,
            events: &mut self.events,
        };
        eval(&self.ast, block, &mut ctx);
        Ok(())
    }

    /// Load a series of statement lines (command-line overrides).
    pub fn load_statements(&mut self, statements: &[&str], source: &str) -> VivariumResult<()> {
        self.load_str(&statements.join("\n"), source)
    }

    /// Parse and run a single statement; returns its result in string form.
    /// The statement's tree is discarded, so event declarations are rejected.
    pub fn eval(&mut self, text: &str) -> VivariumResult<String> {
        debug!(%text, "eval");
        let mut tokens = Lexer::new(text, "eval command").tokenize()?;
        ensure_trailing_semi(&mut tokens);

        let root = self.table.root();
        let mut snippet = Ast::new();
        let no_events: [String; 0] = [];
        let mut parser = Parser::new(
            tokens,
            "eval command",
            &mut self.table,
            &self.types,
            &no_events,
            &mut snippet,
            false,
        );
        let node = parser.parse_statement(root)?;
        drop(parser);

        let Some(node) = node else {
            return Ok(String::new());
        };
        let mut ctx = EvalContext {
            table: &mut self.table,
            types: &self.types,
            events: &mut self.events,
        };
        let result = eval(&snippet, node, &mut ctx);
        Ok(string_form(&self.table, &result))
    }

    // -- Time and events -----------------------------------------------------

    /// Advance the simulation `ticks` updates, firing `START` before the
    /// first tick ever and the `UPDATE` stream once per tick. Stops early
    /// when a script has called `EXIT`.
    pub fn update(&mut self, ticks: u64) {
        if !self.started {
            self.started = true;
            self.fire_all("START");
        }
        for _ in 0..ticks {
            if self.exit_flag.get() {
                break;
            }
            self.update += 1;
            self.advance_stream("UPDATE", self.update as f64);
        }
    }

    /// Make a new event type available to scripts.
    pub fn register_event_type(&mut self, name: &str) -> VivariumResult<()> {
        if self.events.contains_key(name) {
            return Err(ConfigError::DuplicateEvent {
                name: name.to_string(),
            }
            .into());
        }
        debug!(event = name, "registering event type");
        self.events.insert(name.to_string(), EventSchedule::new());
        Ok(())
    }

    /// Queue an action (a node of the master AST) on a named event stream.
    /// Returns whether the event was actually queued.
    pub fn schedule_event(
        &mut self,
        name: &str,
        action: NodeId,
        first: f64,
        repeat: f64,
        max: f64,
    ) -> VivariumResult<bool> {
        match self.events.get_mut(name) {
            Some(schedule) => Ok(schedule.schedule(action, first, repeat, max)),
            None => Err(ConfigError::UnknownEvent {
                name: name.to_string(),
            }
            .into()),
        }
    }

    /// Advance a named event stream to `value`, firing everything due.
    pub fn update_event_value(&mut self, name: &str, value: f64) -> VivariumResult<()> {
        if !self.events.contains_key(name) {
            return Err(ConfigError::UnknownEvent {
                name: name.to_string(),
            }
            .into());
        }
        self.advance_stream(name, value);
        Ok(())
    }

    /// Fire every queued event of a type exactly once, ignoring times.
    pub fn trigger_event(&mut self, name: &str) -> VivariumResult<()> {
        if !self.events.contains_key(name) {
            return Err(ConfigError::UnknownEvent {
                name: name.to_string(),
            }
            .into());
        }
        self.fire_all(name);
        Ok(())
    }

    fn advance_stream(&mut self, name: &str, value: f64) {
        loop {
            let event = match self.events.get_mut(name) {
                Some(schedule) => schedule.pop_due(value),
                None => return,
            };
            let Some(event) = event else { break };
            let mut ctx = EvalContext {
                table: &mut self.table,
                types: &self.types,
                events: &mut self.events,
            };
            let result = eval(&self.ast, event.action, &mut ctx);
            if let EvalValue::Error(message) = result {
                // One broken event must not halt the queue.
                warn!(event = name, error = %message, "event action produced an error");
            }
            if let Some(schedule) = self.events.get_mut(name) {
                schedule.requeue(event);
            }
        }
        if let Some(schedule) = self.events.get_mut(name) {
            schedule.set_value(value);
        }
    }

    fn fire_all(&mut self, name: &str) {
        // Events scheduled by a firing action land in the queue and fire on
        // the next pass.
        loop {
            let drained = match self.events.get_mut(name) {
                Some(schedule) => schedule.drain_all(),
                None => return,
            };
            if drained.is_empty() {
                break;
            }
            for event in drained {
                let mut ctx = EvalContext {
                    table: &mut self.table,
                    types: &self.types,
                    events: &mut self.events,
                };
                let result = eval(&self.ast, event.action, &mut ctx);
                if let EvalValue::Error(message) = result {
                    warn!(event = name, error = %message, "event action produced an error");
                }
            }
        }
    }

    // -- Host binding ---------------------------------------------------------

    /// Register a custom type; attach its factory and member functions to the
    /// returned record.
    pub fn register_type(&mut self, name: &str, desc: &str) -> VivariumResult<&mut TypeInfo> {
        Ok(self.types.register(name, desc)?)
    }

    /// Link a numeric host variable.
    pub fn link_value(
        &mut self,
        scope: ScopeId,
        name: &str,
        cell: Rc<Cell<f64>>,
        desc: &str,
        builtin: bool,
    ) -> VivariumResult<EntryId> {
        Ok(self
            .table
            .link_var(scope, name, HostLink::Num(cell), desc, builtin)?)
    }

    /// Link an integer host variable (reads and writes convert lossily).
    pub fn link_int(
        &mut self,
        scope: ScopeId,
        name: &str,
        cell: Rc<Cell<i64>>,
        desc: &str,
        builtin: bool,
    ) -> VivariumResult<EntryId> {
        Ok(self
            .table
            .link_var(scope, name, HostLink::Int(cell), desc, builtin)?)
    }

    /// Link a boolean host variable (numeric 0/1 to scripts).
    pub fn link_bool(
        &mut self,
        scope: ScopeId,
        name: &str,
        cell: Rc<Cell<bool>>,
        desc: &str,
        builtin: bool,
    ) -> VivariumResult<EntryId> {
        Ok(self
            .table
            .link_var(scope, name, HostLink::Bool(cell), desc, builtin)?)
    }

    /// Link a string host variable.
    pub fn link_string(
        &mut self,
        scope: ScopeId,
        name: &str,
        cell: Rc<RefCell<String>>,
        desc: &str,
        builtin: bool,
    ) -> VivariumResult<EntryId> {
        Ok(self
            .table
            .link_var(scope, name, HostLink::Str(cell), desc, builtin)?)
    }

    /// Link a getter/setter pair: every read calls the getter, every write
    /// the setter.
    #[allow(clippy::too_many_arguments)]
    pub fn link_fns(
        &mut self,
        scope: ScopeId,
        name: &str,
        get: GetFn,
        set: SetFn,
        numeric: bool,
        desc: &str,
        builtin: bool,
    ) -> VivariumResult<EntryId> {
        Ok(self
            .table
            .link_fns(scope, name, get, set, numeric, desc, builtin)?)
    }

    // -- Introspection --------------------------------------------------------

    pub fn root(&self) -> ScopeId {
        self.table.root()
    }

    pub fn table(&self) -> &SymbolTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut SymbolTable {
        &mut self.table
    }

    /// Resolve a dotted path (`f.i.j`) from the root scope.
    pub fn find(&self, path: &str) -> Option<EntryId> {
        let mut scope = self.table.root();
        let mut found = None;
        let segments: Vec<&str> = path.split('.').collect();
        for (i, segment) in segments.iter().enumerate() {
            let id = self.table.lookup(scope, segment, false)?;
            found = Some(id);
            match self.table.entry(id).scope_id() {
                Some(inner) => scope = inner,
                None if i + 1 < segments.len() => return None,
                None => {}
            }
        }
        found
    }

    /// Everything PRINT has produced since the last drain.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut *self.output.borrow_mut())
    }

    /// Has a script called EXIT?
    pub fn exit_requested(&self) -> bool {
        self.exit_flag.get()
    }

    pub fn current_update(&self) -> u64 {
        self.update
    }

    /// Number of actions still queued on an event stream.
    pub fn pending_event_count(&self, name: &str) -> usize {
        self.events.get(name).map(|s| s.len()).unwrap_or(0)
    }

    // -- Serialization --------------------------------------------------------

    /// Serialize the root scope (built-ins suppressed) and the pending event
    /// queues as loadable source.
    pub fn write_config(&self) -> String {
        writer::write_config(&self.table, &self.ast, &self.events)
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> VivariumResult<()> {
        std::fs::write(path, self.write_config())?;
        Ok(())
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Install the standard function library on the root scope.
fn install_builtins(
    table: &mut SymbolTable,
    output: &Rc<RefCell<String>>,
    exit_flag: &Rc<Cell<bool>>,
) {
    let root = table.root();
    let add = |table: &mut SymbolTable, name: &str, desc: &str, fun: FunctionEntry| {
        table
            .add_builtin_function(root, name, fun, desc)
            .expect("built-in function names are unique");
    };

    // One-input math functions.
    add(table, "ABS", "Absolute value", native_f1("ABS", f64::abs));
    add(table, "EXP", "Raise e to the given power", native_f1("EXP", f64::exp));
    add(table, "LOG2", "Log base-2", native_f1("LOG2", f64::log2));
    add(table, "LOG10", "Log base-10", native_f1("LOG10", f64::log10));
    add(table, "SQRT", "Square root", native_f1("SQRT", f64::sqrt));
    add(table, "CBRT", "Cube root", native_f1("CBRT", f64::cbrt));
    add(table, "SIN", "Sine", native_f1("SIN", f64::sin));
    add(table, "COS", "Cosine", native_f1("COS", f64::cos));
    add(table, "TAN", "Tangent", native_f1("TAN", f64::tan));
    add(table, "ASIN", "Arc sine", native_f1("ASIN", f64::asin));
    add(table, "ACOS", "Arc cosine", native_f1("ACOS", f64::acos));
    add(table, "ATAN", "Arc tangent", native_f1("ATAN", f64::atan));
    add(table, "SINH", "Hyperbolic sine", native_f1("SINH", f64::sinh));
    add(table, "COSH", "Hyperbolic cosine", native_f1("COSH", f64::cosh));
    add(table, "TANH", "Hyperbolic tangent", native_f1("TANH", f64::tanh));
    add(table, "ASINH", "Hyperbolic arc sine", native_f1("ASINH", f64::asinh));
    add(table, "ACOSH", "Hyperbolic arc cosine", native_f1("ACOSH", f64::acosh));
    add(table, "ATANH", "Hyperbolic arc tangent", native_f1("ATANH", f64::atanh));
    add(table, "CEIL", "Round up", native_f1("CEIL", f64::ceil));
    add(table, "FLOOR", "Round down", native_f1("FLOOR", f64::floor));
    add(table, "ROUND", "Round to nearest", native_f1("ROUND", f64::round));
    add(
        table,
        "ISINF",
        "Test if infinite",
        native_f1("ISINF", |x| if x.is_infinite() { 1.0 } else { 0.0 }),
    );
    add(
        table,
        "ISNAN",
        "Test if not-a-number",
        native_f1("ISNAN", |x| if x.is_nan() { 1.0 } else { 0.0 }),
    );

    // Two-input math functions.
    add(
        table,
        "HYPOT",
        "Given two sides, find the hypotenuse",
        native_f2("HYPOT", f64::hypot),
    );
    add(
        table,
        "LOG",
        "Log of arg1 in base arg2",
        native_f2("LOG", |x, base| x.ln() / base.ln()),
    );
    add(table, "MIN", "Return the lesser value", native_f2("MIN", f64::min));
    add(table, "MAX", "Return the greater value", native_f2("MAX", f64::max));
    add(
        table,
        "POW",
        "Raise arg1 to the arg2 power",
        native_f2("POW", f64::powf),
    );

    // Three-input math functions.
    add(
        table,
        "IF",
        "If arg1 is true, return arg2, else arg3",
        native_f3("IF", |c, a, b| if c != 0.0 { a } else { b }),
    );
    add(
        table,
        "CLAMP",
        "Force arg1 into the range [arg2, arg3]",
        native_f3("CLAMP", |x, lo, hi| {
            if x < lo {
                lo
            } else if x > hi {
                hi
            } else {
                x
            }
        }),
    );
    add(
        table,
        "TO_SCALE",
        "Scale arg1 onto arg2-arg3 as unit distance",
        native_f3("TO_SCALE", |x, lo, hi| (hi - lo) * x + lo),
    );
    add(
        table,
        "FROM_SCALE",
        "Scale arg1 from arg2-arg3 as unit distance",
        native_f3("FROM_SCALE", |x, lo, hi| (x - lo) / (hi - lo)),
    );

    // PRINT appends the string form of every argument to the engine's
    // output sink.
    let sink = Rc::clone(output);
    add(
        table,
        "PRINT",
        "Print out the provided values",
        native_variadic(ReturnKind::Num, move |args| {
            let mut out = sink.borrow_mut();
            for arg in args {
                out.push_str(&arg.as_str());
            }
            Ok(Value::Num(0.0))
        }),
    );

    // EXIT raises the engine's exit flag; the update loop checks it.
    let flag = Rc::clone(exit_flag);
    add(
        table,
        "EXIT",
        "Stop the run",
        native_variadic(ReturnKind::Num, move |_args| {
            flag.set(true);
            Ok(Value::Num(0.0))
        }),
    );

    // EVAL re-enters the parser; the evaluator dispatches it specially.
    add(
        table,
        "EVAL",
        "Dynamically evaluate the string passed in",
        FunctionEntry {
            returns: ReturnKind::Str,
            body: FunctionBody::Eval,
        },
    );
}
