//! The type registry: every name a declaration may start with.
//!
//! Four base types are pre-registered (`Void`, `Value`, `String`, `Struct`).
//! Host modules add custom types at startup; declaring one in a script
//! instantiates a host object and exposes its configuration surface as a
//! typed sub-scope, with the type's member functions bound to the instance.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::entry::{HostLink, ReturnKind};
use crate::error::{CallError, ConfigError};
use crate::value::Value;

/// Opaque handle to a host-side object backing a typed scope.
pub type HostObject = Rc<dyn Any>;

/// A member function: first parameter is the target host object, the rest are
/// drawn from converted argument values.
pub type MemberFn = Rc<dyn Fn(&HostObject, &[Value]) -> Result<Value, CallError>>;

/// Factory invoked when a script declares an instance of a custom type.
pub type InitFn = Rc<dyn Fn(&str) -> HostSetup>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Invalid,
    Void,
    Value,
    String,
    Struct,
    Custom,
}

/// A host variable to install in a new instance scope.
pub struct LinkSpec {
    pub name: String,
    pub desc: String,
    pub link: HostLink,
    pub builtin: bool,
}

/// Everything a custom type's factory hands back for one instance: the host
/// object, the standard internal variables, and the configuration surface.
pub struct HostSetup {
    pub object: HostObject,
    /// Standard internal switch: should this module be activated? (0=off, 1=on)
    pub active: Rc<Cell<bool>>,
    /// Standard internal description override for this instance.
    pub desc_var: Rc<RefCell<String>>,
    pub links: Vec<LinkSpec>,
}

impl HostSetup {
    pub fn new(object: HostObject) -> Self {
        HostSetup {
            object,
            active: Rc::new(Cell::new(true)),
            desc_var: Rc::new(RefCell::new(String::new())),
            links: Vec::new(),
        }
    }

    /// Install a linked host variable on the instance scope.
    pub fn link(mut self, name: &str, link: HostLink, desc: &str) -> Self {
        self.links.push(LinkSpec {
            name: name.to_string(),
            desc: desc.to_string(),
            link,
            builtin: false,
        });
        self
    }
}

/// A member function's registration record.
pub struct MemberFunInfo {
    pub name: String,
    pub desc: String,
    pub returns: ReturnKind,
    pub fun: MemberFn,
}

/// Everything known about one type name in the scripting language.
pub struct TypeInfo {
    pub index: usize,
    pub name: String,
    pub desc: String,
    pub base: BaseType,
    init: Option<InitFn>,
    member_funs: Vec<MemberFunInfo>,
}

impl TypeInfo {
    /// Provide the factory that builds a host object for each declared
    /// instance.
    pub fn set_init(&mut self, f: impl Fn(&str) -> HostSetup + 'static) -> &mut Self {
        self.init = Some(Rc::new(f));
        self
    }

    /// Add a member function callable on instances of this type.
    pub fn add_member_fn(
        &mut self,
        name: &str,
        desc: &str,
        returns: ReturnKind,
        f: impl Fn(&HostObject, &[Value]) -> Result<Value, CallError> + 'static,
    ) -> &mut Self {
        self.member_funs.push(MemberFunInfo {
            name: name.to_string(),
            desc: desc.to_string(),
            returns,
            fun: Rc::new(f),
        });
        self
    }

    /// Build a host object for a new instance, if this type has a factory.
    pub fn make_instance(&self, name: &str) -> Option<HostSetup> {
        self.init.as_ref().map(|f| f(name))
    }

    pub fn member_funs(&self) -> &[MemberFunInfo] {
        &self.member_funs
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("base", &self.base)
            .field("member_funs", &self.member_funs.len())
            .finish()
    }
}

/// Name-keyed registry of all types available to scripts. Frozen after host
/// registrations complete; the parser only reads it.
pub struct TypeRegistry {
    types: Vec<TypeInfo>,
    by_name: HashMap<String, usize>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut registry = TypeRegistry {
            types: Vec::new(),
            by_name: HashMap::new(),
        };
        // Index 0 is the hidden invalid slot; it has no name binding.
        registry.types.push(TypeInfo {
            index: 0,
            name: "INVALID".to_string(),
            desc: "Error, invalid type!".to_string(),
            base: BaseType::Invalid,
            init: None,
            member_funs: Vec::new(),
        });
        registry.add_base("Void", "Non-type variable; no value", BaseType::Void);
        registry.add_base("Value", "Numeric variable", BaseType::Value);
        registry.add_base("String", "String variable", BaseType::String);
        registry.add_base("Struct", "User-made structure", BaseType::Struct);
        registry
    }

    fn add_base(&mut self, name: &str, desc: &str, base: BaseType) {
        let index = self.types.len();
        self.types.push(TypeInfo {
            index,
            name: name.to_string(),
            desc: desc.to_string(),
            base,
            init: None,
            member_funs: Vec::new(),
        });
        self.by_name.insert(name.to_string(), index);
    }

    /// Register a custom type; returns the record so the host can attach its
    /// factory and member functions.
    pub fn register(&mut self, name: &str, desc: &str) -> Result<&mut TypeInfo, ConfigError> {
        if self.by_name.contains_key(name) {
            return Err(ConfigError::DuplicateType {
                name: name.to_string(),
            });
        }
        let index = self.types.len();
        self.types.push(TypeInfo {
            index,
            name: name.to_string(),
            desc: desc.to_string(),
            base: BaseType::Custom,
            init: None,
            member_funs: Vec::new(),
        });
        self.by_name.insert(name.to_string(), index);
        Ok(&mut self.types[index])
    }

    pub fn get(&self, name: &str) -> Option<&TypeInfo> {
        self.by_name.get(name).map(|&i| &self.types[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_types_are_preregistered() {
        let registry = TypeRegistry::new();
        for name in ["Void", "Value", "String", "Struct"] {
            assert!(registry.contains(name), "missing base type {name}");
        }
        assert!(!registry.contains("INVALID"));
        assert_eq!(registry.get("Value").unwrap().base, BaseType::Value);
    }

    #[test]
    fn custom_types_get_fresh_indices() {
        let mut registry = TypeRegistry::new();
        let index = registry.register("Population", "A collection of organisms").unwrap().index;
        assert_eq!(registry.index_of("Population"), Some(index));
        assert!(index > registry.index_of("Struct").unwrap());

        let err = registry.register("Population", "again").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateType { .. }));
    }

    #[test]
    fn member_functions_bind_to_the_host_object() {
        let mut registry = TypeRegistry::new();
        let info = registry.register("Counter", "test type").unwrap();
        info.set_init(|_name| HostSetup::new(Rc::new(Cell::new(0_i64))));
        info.add_member_fn("BUMP", "add to the counter", ReturnKind::Num, |obj, args| {
            let cell = obj.downcast_ref::<Cell<i64>>().expect("host object type");
            cell.set(cell.get() + args[0].as_num() as i64);
            Ok(Value::Num(cell.get() as f64))
        });

        let info = registry.get("Counter").unwrap();
        let setup = info.make_instance("c").unwrap();
        let bump = &info.member_funs()[0];
        let out = (bump.fun)(&setup.object, &[Value::Num(5.0)]).unwrap();
        assert_eq!(out, Value::Num(5.0));
    }
}
