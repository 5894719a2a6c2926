//! The symbol table: a tree of nested scopes holding typed entries.
//!
//! Scopes and entries live in arenas owned by [`SymbolTable`] and are
//! addressed by [`ScopeId`] / [`EntryId`] index newtypes. Each scope keeps its
//! locals and its built-ins in separate insertion-ordered lists (built-ins are
//! hidden from serialization) plus one name map covering both.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::entry::{Entry, EntryKind, FunctionEntry, GetFn, HostLink, SetFn};
use crate::error::{AccessError, ConfigError};
use crate::value::Value;

/// Index of a scope in the symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(u32);

/// Index of an entry in the symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(u32);

#[derive(Debug)]
struct ScopeData {
    name: String,
    parent: Option<ScopeId>,
    /// Type tag for scopes that represent a typed structure ("Struct" or a
    /// registered custom type); the root scope has no tag.
    type_name: String,
    locals: Vec<EntryId>,
    builtins: Vec<EntryId>,
    by_name: HashMap<String, EntryId>,
}

/// The full tree of scopes and entries.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<ScopeData>,
    entries: Vec<Entry>,
    root: ScopeId,
}

impl SymbolTable {
    pub fn new(root_name: &str) -> Self {
        let root_data = ScopeData {
            name: root_name.to_string(),
            parent: None,
            type_name: String::new(),
            locals: Vec::new(),
            builtins: Vec::new(),
            by_name: HashMap::new(),
        };
        SymbolTable {
            scopes: vec![root_data],
            entries: Vec::new(),
            root: ScopeId(0),
        }
    }

    pub fn root(&self) -> ScopeId {
        self.root
    }

    pub fn entry(&self, id: EntryId) -> &Entry {
        &self.entries[id.0 as usize]
    }

    pub fn entry_mut(&mut self, id: EntryId) -> &mut Entry {
        &mut self.entries[id.0 as usize]
    }

    pub fn scope_name(&self, scope: ScopeId) -> &str {
        &self.scopes[scope.0 as usize].name
    }

    pub fn scope_type(&self, scope: ScopeId) -> &str {
        &self.scopes[scope.0 as usize].type_name
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0 as usize].parent
    }

    /// Locals of a scope in insertion order (built-ins excluded).
    pub fn locals(&self, scope: ScopeId) -> &[EntryId] {
        &self.scopes[scope.0 as usize].locals
    }

    /// Built-ins of a scope in insertion order.
    pub fn builtins(&self, scope: ScopeId) -> &[EntryId] {
        &self.scopes[scope.0 as usize].builtins
    }

    /// Exact-match lookup in `scope`, recursing into parents when allowed.
    pub fn lookup(&self, scope: ScopeId, name: &str, scan_parents: bool) -> Option<EntryId> {
        let data = &self.scopes[scope.0 as usize];
        if let Some(&id) = data.by_name.get(name) {
            return Some(id);
        }
        if scan_parents {
            if let Some(parent) = data.parent {
                return self.lookup(parent, name, true);
            }
        }
        None
    }

    // -- Entry construction --------------------------------------------------

    fn insert(
        &mut self,
        scope: ScopeId,
        mut entry: Entry,
        builtin: bool,
    ) -> Result<EntryId, ConfigError> {
        let data = &mut self.scopes[scope.0 as usize];
        if data.by_name.contains_key(&entry.name) {
            return Err(ConfigError::Redeclaration {
                scope: data.name.clone(),
                name: entry.name.clone(),
            });
        }
        entry.builtin = builtin;
        entry.owner = Some(scope);
        let id = EntryId(self.entries.len() as u32);
        let data = &mut self.scopes[scope.0 as usize];
        data.by_name.insert(entry.name.clone(), id);
        if builtin {
            data.builtins.push(id);
        } else {
            data.locals.push(id);
        }
        self.entries.push(entry);
        Ok(id)
    }

    /// Add a new local numeric variable.
    pub fn add_value(
        &mut self,
        scope: ScopeId,
        name: &str,
        init: f64,
        desc: &str,
    ) -> Result<EntryId, ConfigError> {
        self.insert(scope, Entry::new(name, desc, EntryKind::Num(init)), false)
    }

    /// Add a new local string variable.
    pub fn add_string(
        &mut self,
        scope: ScopeId,
        name: &str,
        init: &str,
        desc: &str,
    ) -> Result<EntryId, ConfigError> {
        self.insert(
            scope,
            Entry::new(name, desc, EntryKind::Str(init.to_string())),
            false,
        )
    }

    /// Add a new scope inside `scope`; returns the entry and the new scope.
    pub fn add_scope(
        &mut self,
        scope: ScopeId,
        name: &str,
        desc: &str,
        type_name: &str,
    ) -> Result<(EntryId, ScopeId), ConfigError> {
        let child = ScopeId(self.scopes.len() as u32);
        self.scopes.push(ScopeData {
            name: name.to_string(),
            parent: Some(scope),
            type_name: type_name.to_string(),
            locals: Vec::new(),
            builtins: Vec::new(),
            by_name: HashMap::new(),
        });
        let id = self.insert(scope, Entry::new(name, desc, EntryKind::Scope(child)), false)?;
        Ok((id, child))
    }

    /// Add a user-visible function entry.
    pub fn add_function(
        &mut self,
        scope: ScopeId,
        name: &str,
        fun: FunctionEntry,
        desc: &str,
    ) -> Result<EntryId, ConfigError> {
        self.insert(scope, Entry::new(name, desc, EntryKind::Function(fun)), false)
    }

    /// Add a function that is a standard part of the scripting language;
    /// hidden from serialization.
    pub fn add_builtin_function(
        &mut self,
        scope: ScopeId,
        name: &str,
        fun: FunctionEntry,
        desc: &str,
    ) -> Result<EntryId, ConfigError> {
        self.insert(scope, Entry::new(name, desc, EntryKind::Function(fun)), true)
    }

    /// Link a host variable into the table.
    pub fn link_var(
        &mut self,
        scope: ScopeId,
        name: &str,
        link: HostLink,
        desc: &str,
        builtin: bool,
    ) -> Result<EntryId, ConfigError> {
        self.insert(scope, Entry::new(name, desc, EntryKind::Link(link)), builtin)
    }

    /// Link a getter/setter pair into the table.
    pub fn link_fns(
        &mut self,
        scope: ScopeId,
        name: &str,
        get: GetFn,
        set: SetFn,
        numeric: bool,
        desc: &str,
        builtin: bool,
    ) -> Result<EntryId, ConfigError> {
        self.insert(
            scope,
            Entry::new(name, desc, EntryKind::LinkFns { get, set, numeric }),
            builtin,
        )
    }

    // -- Reads and writes ----------------------------------------------------

    /// Read an entry's current value, forwarding through links. Scope and
    /// function entries have no value.
    pub fn value_of(&self, id: EntryId) -> Result<Value, AccessError> {
        let entry = self.entry(id);
        match &entry.kind {
            EntryKind::Num(v) => Ok(Value::Num(*v)),
            EntryKind::Str(s) => Ok(Value::Str(s.clone())),
            EntryKind::Link(link) => Ok(link.get()),
            EntryKind::LinkFns { get, .. } => Ok(get()),
            EntryKind::Scope(_) | EntryKind::Function(_) => Err(AccessError::NotAValue {
                kind: entry.kind_word().to_string(),
                name: entry.name.clone(),
            }),
        }
    }

    pub fn number_of(&self, id: EntryId) -> Result<f64, AccessError> {
        self.value_of(id).map(|v| v.as_num())
    }

    pub fn string_of(&self, id: EntryId) -> Result<String, AccessError> {
        self.value_of(id).map(|v| v.as_str())
    }

    /// Kind-directed write: numeric destinations take the numeric view of
    /// `value`, string destinations the string view; links forward to host
    /// state.
    pub fn assign(&mut self, id: EntryId, value: &Value) -> Result<(), AccessError> {
        let entry = self.entry(id);
        match &entry.kind {
            EntryKind::Num(_) => {
                let num = value.as_num();
                if let EntryKind::Num(v) = &mut self.entry_mut(id).kind {
                    *v = num;
                }
                Ok(())
            }
            EntryKind::Str(_) => {
                let text = value.as_str();
                if let EntryKind::Str(s) = &mut self.entry_mut(id).kind {
                    *s = text;
                }
                Ok(())
            }
            EntryKind::Link(link) => {
                link.set(value);
                Ok(())
            }
            EntryKind::LinkFns { set, .. } => {
                let set = SetFn::clone(set);
                set(value.clone());
                Ok(())
            }
            EntryKind::Scope(_) | EntryKind::Function(_) => Err(AccessError::NotAssignable {
                kind: entry.kind_word().to_string(),
                name: entry.name.clone(),
            }),
        }
    }

    /// Deep-copy an entry into `target` under `name`. Scopes clone their
    /// contents recursively; linked and function entries clone their handles.
    pub fn clone_entry(
        &mut self,
        id: EntryId,
        target: ScopeId,
        name: &str,
    ) -> Result<EntryId, ConfigError> {
        let source = self.entry(id).clone();
        match source.kind {
            EntryKind::Scope(source_scope) => {
                let type_name = self.scope_type(source_scope).to_string();
                let (entry_id, new_scope) =
                    self.add_scope(target, name, &source.desc, &type_name)?;
                let locals = self.locals(source_scope).to_vec();
                let builtins = self.builtins(source_scope).to_vec();
                for child in locals.into_iter().chain(builtins) {
                    let child_name = self.entry(child).name.clone();
                    self.clone_entry(child, new_scope, &child_name)?;
                }
                Ok(entry_id)
            }
            kind => {
                let builtin = source.builtin;
                self.insert(target, Entry::new(name, source.desc, kind), builtin)
            }
        }
    }
}
