//! Config serialization.
//!
//! Writes the symbol tree back out as loadable source: locals in insertion
//! order with their descriptions as aligned `//` comments, built-ins
//! suppressed, nested scopes indented two spaces, and the pending event
//! queue rendered after the variables. Loading the output reproduces an
//! equivalent symbol tree.

use std::collections::BTreeMap;

use vivarium_core::{format_num, quote_string, Entry, EntryId, EntryKind, ScopeId, SymbolTable, Value};
use vivarium_events::EventSchedule;

use crate::ast::{Ast, NodeId};

/// Column where description comments start.
const COMMENT_OFFSET: usize = 32;

/// Serialize the whole configuration: root-scope contents, then pending
/// events.
pub fn write_config(
    table: &SymbolTable,
    ast: &Ast,
    events: &BTreeMap<String, EventSchedule<NodeId>>,
) -> String {
    let mut out = String::new();
    write_scope_contents(table, table.root(), "", &mut out);
    out.push('\n');
    write_events(table, ast, events, &mut out);
    out
}

/// Write every local entry of `scope`, in insertion order.
pub fn write_scope_contents(table: &SymbolTable, scope: ScopeId, prefix: &str, out: &mut String) {
    for &id in table.locals(scope) {
        write_entry(table, id, prefix, out);
    }
}

fn write_entry(table: &SymbolTable, id: EntryId, prefix: &str, out: &mut String) {
    let entry = table.entry(id);
    if entry.builtin {
        return;
    }
    match &entry.kind {
        EntryKind::Scope(inner) => {
            let mut line = format!("{prefix}{} {}", table.scope_type(*inner), entry.name);
            if table.locals(*inner).is_empty() {
                line.push(';');
                push_with_desc(out, &line, &entry.desc);
            } else {
                line.push_str(" {");
                push_with_desc(out, &line, &entry.desc);
                let inner_prefix = format!("{prefix}  ");
                write_scope_contents(table, *inner, &inner_prefix, out);
                out.push_str(prefix);
                out.push_str("}\n");
            }
        }
        // Function entries are installed by the engine or a host module;
        // there is nothing to persist for them.
        EntryKind::Function(_) => {}
        _ => {
            let Ok(value) = table.value_of(id) else { return };
            let literal = match &value {
                Value::Str(s) => quote_string(s),
                Value::Num(n) => format_num(*n),
            };
            let line = if entry.is_local() {
                format!("{prefix}{} {} = {literal};", type_word(entry), entry.name)
            } else {
                // Linked entries re-bind on reload; only the value persists.
                format!("{prefix}{} = {literal};", entry.name)
            };
            push_with_desc(out, &line, &entry.desc);
        }
    }
}

fn type_word(entry: &Entry) -> &'static str {
    if entry.is_numeric() {
        "Value"
    } else {
        "String"
    }
}

/// Append `line`, with the description as a `//` comment starting near
/// [`COMMENT_OFFSET`]. Multi-line descriptions continue on aligned lines.
fn push_with_desc(out: &mut String, line: &str, desc: &str) {
    if desc.is_empty() {
        out.push_str(line);
        out.push('\n');
        return;
    }
    let mut first = true;
    for comment in desc.lines() {
        if first {
            out.push_str(line);
            let pad = COMMENT_OFFSET.saturating_sub(line.len()).max(1);
            out.push_str(&" ".repeat(pad));
            first = false;
        } else {
            out.push_str(&" ".repeat(COMMENT_OFFSET));
        }
        out.push_str("// ");
        out.push_str(comment);
        out.push('\n');
    }
}

/// Write each pending event as a reloadable `@Name(args) action;` line.
fn write_events(
    table: &SymbolTable,
    ast: &Ast,
    events: &BTreeMap<String, EventSchedule<NodeId>>,
    out: &mut String,
) {
    for (name, schedule) in events {
        for event in schedule.pending() {
            out.push('@');
            out.push_str(name);
            out.push('(');
            out.push_str(&format_num(event.next));
            if event.repeat > 0.0 {
                out.push_str(", ");
                out.push_str(&format_num(event.repeat));
                if event.max >= 0.0 {
                    out.push_str(", ");
                    out.push_str(&format_num(event.max));
                }
            }
            out.push_str(") ");
            ast.write_node(event.action, table, out);
            out.push_str(";\n");
        }
    }
}
