//! Adapters that wrap native Rust callables into uniform function entries.
//!
//! A function entry's callable always receives a slice of already-evaluated
//! argument values. The wrappers here perform the arity check and the
//! positional numeric/string conversions so hosts can register plain typed
//! closures.

use std::rc::Rc;

use crate::entry::{FunctionBody, FunctionEntry, ReturnKind};
use crate::error::CallError;
use crate::value::Value;

fn check_arity(name: &str, expected: usize, args: &[Value]) -> Result<(), CallError> {
    if args.len() != expected {
        return Err(CallError::Arity {
            name: name.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

/// Wrap a one-argument numeric function.
pub fn native_f1(name: &str, f: impl Fn(f64) -> f64 + 'static) -> FunctionEntry {
    let name = name.to_string();
    FunctionEntry {
        returns: ReturnKind::Num,
        body: FunctionBody::Native(Rc::new(move |args| {
            check_arity(&name, 1, args)?;
            Ok(Value::Num(f(args[0].as_num())))
        })),
    }
}

/// Wrap a two-argument numeric function.
pub fn native_f2(name: &str, f: impl Fn(f64, f64) -> f64 + 'static) -> FunctionEntry {
    let name = name.to_string();
    FunctionEntry {
        returns: ReturnKind::Num,
        body: FunctionBody::Native(Rc::new(move |args| {
            check_arity(&name, 2, args)?;
            Ok(Value::Num(f(args[0].as_num(), args[1].as_num())))
        })),
    }
}

/// Wrap a three-argument numeric function.
pub fn native_f3(name: &str, f: impl Fn(f64, f64, f64) -> f64 + 'static) -> FunctionEntry {
    let name = name.to_string();
    FunctionEntry {
        returns: ReturnKind::Num,
        body: FunctionBody::Native(Rc::new(move |args| {
            check_arity(&name, 3, args)?;
            Ok(Value::Num(f(
                args[0].as_num(),
                args[1].as_num(),
                args[2].as_num(),
            )))
        })),
    }
}

/// Wrap a one-argument string function.
pub fn native_s1(name: &str, f: impl Fn(&str) -> String + 'static) -> FunctionEntry {
    let name = name.to_string();
    FunctionEntry {
        returns: ReturnKind::Str,
        body: FunctionBody::Native(Rc::new(move |args| {
            check_arity(&name, 1, args)?;
            Ok(Value::Str(f(&args[0].as_str())))
        })),
    }
}

/// Wrap a variadic function that handles its own conversions.
pub fn native_variadic(
    returns: ReturnKind,
    f: impl Fn(&[Value]) -> Result<Value, CallError> + 'static,
) -> FunctionEntry {
    FunctionEntry {
        returns,
        body: FunctionBody::Native(Rc::new(f)),
    }
}
