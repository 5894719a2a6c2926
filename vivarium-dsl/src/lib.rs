//! Vivarium DSL - Configuration and Scripting Engine
//!
//! This crate provides the lexer, parser, evaluator, and engine facade for
//! the Vivarium configuration language: a statically-scoped expression
//! language with nested typed scopes, host-linked variables, and deferred
//! time-triggered events.
//!
//! Architecture:
//! ```text
//! Config source (file / string)
//!     ↓
//! Lexer (tokenize)
//!     ↓
//! Parser (build AST, populate the symbol table)
//!     ↓
//! Evaluator (run statements; register deferred events)
//!     ↓
//! Event scheduler (re-fire actions as host update ticks advance)
//! ```

pub mod ast;
pub mod engine;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod writer;

// Re-export key types for convenience
pub use ast::{Ast, Node, NodeId};
pub use engine::ScriptEngine;
pub use eval::{eval, EvalContext, EvalValue};
pub use lexer::{Lexer, Span, Symbol, Token, TokenKind};
pub use parser::Parser;
