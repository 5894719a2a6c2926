//! Integration tests for the scripting engine: loading, scope resolution,
//! expression semantics, events, and host binding.

use std::cell::Cell;
use std::rc::Rc;

use vivarium_core::{HostSetup, ReturnKind, Value};
use vivarium_dsl::ScriptEngine;

fn number_at(engine: &ScriptEngine, path: &str) -> f64 {
    let id = engine.find(path).unwrap_or_else(|| panic!("missing entry '{path}'"));
    engine.table().number_of(id).expect("numeric entry")
}

fn string_at(engine: &ScriptEngine, path: &str) -> String {
    let id = engine.find(path).unwrap_or_else(|| panic!("missing entry '{path}'"));
    engine.table().string_of(id).expect("string entry")
}

#[test]
fn scalar_arithmetic() {
    let mut engine = ScriptEngine::new();
    engine.load_str("Value a = 7; Value c = a + 10;", "test").unwrap();
    assert_eq!(number_at(&engine, "a"), 7.0);
    assert_eq!(number_at(&engine, "c"), 17.0);

    let written = engine.write_config();
    assert!(written.contains("Value a = 7;"));
    assert!(written.contains("Value c = 17;"));
}

#[test]
fn string_operations() {
    let mut engine = ScriptEngine::new();
    engine
        .load_str(
            r#"String b = "balloons"; String d = "99 " + b; String e = "01" * 7;"#,
            "test",
        )
        .unwrap();
    assert_eq!(string_at(&engine, "d"), "99 balloons");
    assert_eq!(string_at(&engine, "e"), "01010101010101");
}

#[test]
fn nested_scopes_and_dot_paths() {
    let mut engine = ScriptEngine::new();
    engine
        .load_str(
            r#"
            Struct f {
              Value g = 1.7;
              Struct i {
                Value j = 3;
              }
              String j = "spooky!";
              j = ..f.i.j;
            }
            "#,
            "test",
        )
        .unwrap();
    assert_eq!(string_at(&engine, "f.j"), "3");
    assert_eq!(number_at(&engine, "f.g"), 1.7);
    assert_eq!(number_at(&engine, "f.i.j"), 3.0);
}

#[test]
fn shadowing_and_single_dot_lookup() {
    let mut engine = ScriptEngine::new();
    engine
        .load_str(
            r#"
            Value a = 7;
            String b = "outer";
            Struct f {
              String a = "shadow!";
              String j = "x";
              j = .a;
              ..b = a;
            }
            "#,
            "test",
        )
        .unwrap();
    // `.a` restricts lookup to f, finding the shadow.
    assert_eq!(string_at(&engine, "f.j"), "shadow!");
    // `..b` ascends to the root; bare `a` finds the nearest (shadowing) entry.
    assert_eq!(string_at(&engine, "b"), "shadow!");
    assert_eq!(number_at(&engine, "a"), 7.0);
}

#[test]
fn anonymous_blocks_share_the_enclosing_scope() {
    let mut engine = ScriptEngine::new();
    engine
        .load_str("Value x = 1; { Value y = 2; } y = y + x;", "test")
        .unwrap();
    assert_eq!(number_at(&engine, "y"), 3.0);
}

#[test]
fn char_literals_fold_to_their_scalar_value() {
    let mut engine = ScriptEngine::new();
    engine.load_str("Value q = 'q';", "test").unwrap();
    assert_eq!(number_at(&engine, "q"), 113.0);
}

#[test]
fn precedence_and_grouping() {
    let mut engine = ScriptEngine::new();
    engine
        .load_str(
            "Value x = 2 + 3 * 4;
             Value y = (2 + 3) * 4;
             Value z = 2 ** 3 ** 2;
             Value c = 1 + 2 < 4;",
            "test",
        )
        .unwrap();
    assert_eq!(number_at(&engine, "x"), 14.0);
    assert_eq!(number_at(&engine, "y"), 20.0);
    // Every operator climbs left-associatively, ** included.
    assert_eq!(number_at(&engine, "z"), 64.0);
    assert_eq!(number_at(&engine, "c"), 1.0);
}

#[test]
fn assignment_is_left_associative() {
    let mut engine = ScriptEngine::new();
    engine
        .load_str("Value a; Value b = 2; Value c = 9; a = b = c;", "test")
        .unwrap();
    // `(a = b) = c`: a takes b's value, then c's; b is untouched.
    assert_eq!(number_at(&engine, "a"), 9.0);
    assert_eq!(number_at(&engine, "b"), 2.0);
}

#[test]
fn logic_operators_are_eager() {
    let mut engine = ScriptEngine::new();
    engine
        .load_str(r#"Value t = 1 || PRINT("R"); Value u = 0 && PRINT("S");"#, "test")
        .unwrap();
    // Both right operands ran even though the result was already decided.
    let output = engine.take_output();
    assert_eq!(output, "RS");
    assert_eq!(number_at(&engine, "t"), 1.0);
    assert_eq!(number_at(&engine, "u"), 0.0);
}

#[test]
fn builtin_math_functions() {
    let mut engine = ScriptEngine::new();
    engine
        .load_str(
            "Value a = SQRT(16);
             Value b = MIN(3, 8);
             Value c = CLAMP(12, 0, 10);
             Value d = IF(a > 3, 1, 2);
             Value e = LOG(8, 2);",
            "test",
        )
        .unwrap();
    assert_eq!(number_at(&engine, "a"), 4.0);
    assert_eq!(number_at(&engine, "b"), 3.0);
    assert_eq!(number_at(&engine, "c"), 10.0);
    assert_eq!(number_at(&engine, "d"), 1.0);
    assert!((number_at(&engine, "e") - 3.0).abs() < 1e-12);
}

#[test]
fn call_arity_error_leaves_target_untouched() {
    let mut engine = ScriptEngine::new();
    engine.load_str("Value x = SQRT(1, 2);", "test").unwrap();
    // The call produced an error value; the assignment never happened.
    assert_eq!(number_at(&engine, "x"), 0.0);

    // The same error is visible through the eval surface.
    let message = engine.eval("SQRT(1, 2)").unwrap();
    assert_eq!(message, "Function 'SQRT' called with 2 args, but 1 expected.");
}

#[test]
fn calling_a_variable_is_an_error_value_not_a_crash() {
    let mut engine = ScriptEngine::new();
    engine.load_str("Value v = 3; Value w = v(2);", "test").unwrap();
    assert_eq!(number_at(&engine, "w"), 0.0);
}

#[test]
fn eval_surface_returns_string_forms() {
    let mut engine = ScriptEngine::new();
    engine.load_str("Value a = 7;", "test").unwrap();
    assert_eq!(engine.eval("a + 10").unwrap(), "17");
    assert_eq!(engine.eval("a = 12").unwrap(), "12");
    assert_eq!(number_at(&engine, "a"), 12.0);
    assert_eq!(engine.eval("").unwrap(), "");
}

#[test]
fn eval_builtin_runs_against_the_live_table() {
    let mut engine = ScriptEngine::new();
    engine
        .load_str(r#"Value a = 5; String s = EVAL("a * 2");"#, "test")
        .unwrap();
    assert_eq!(string_at(&engine, "s"), "10");
}

#[test]
fn events_inside_eval_are_rejected() {
    let mut engine = ScriptEngine::new();
    let err = engine.eval("@UPDATE(1) PRINT(\"no\");").unwrap_err();
    assert!(err.to_string().contains("not allowed"));
}

#[test]
fn lex_and_parse_errors_abort_the_load() {
    let mut engine = ScriptEngine::new();
    assert!(engine.load_str("String s = \"open", "cfg").is_err());
    assert!(engine.load_str("Value x = ;", "cfg").is_err());
    let err = engine.load_str("ghost = 1;", "cfg").unwrap_err();
    assert!(err.to_string().starts_with("Error (line 1 in 'cfg'):"));
}

#[test]
fn redeclaration_in_one_scope_is_fatal() {
    let mut engine = ScriptEngine::new();
    let err = engine.load_str("Value a; String a;", "cfg").unwrap_err();
    assert!(err.to_string().contains("already declared"));
}

// -- Events ------------------------------------------------------------------

#[test]
fn repeating_event_catches_up_within_one_update_call() {
    let mut engine = ScriptEngine::new();
    engine
        .load_str(r#"@UPDATE(3, 2, 10) PRINT("tick ");"#, "test")
        .unwrap();
    engine.update_event_value("UPDATE", 7.0).unwrap();
    assert_eq!(engine.take_output(), "tick tick tick ");
    // Still queued for 9.
    assert_eq!(engine.pending_event_count("UPDATE"), 1);

    engine.update_event_value("UPDATE", 20.0).unwrap();
    assert_eq!(engine.take_output(), "tick ");
    assert_eq!(engine.pending_event_count("UPDATE"), 0);
}

#[test]
fn missed_single_shot_is_dropped_silently() {
    let mut engine = ScriptEngine::new();
    engine.load_str("Value x = 0;", "test").unwrap();
    engine.update_event_value("UPDATE", 5.0).unwrap();
    engine.load_str("@UPDATE(2, 0) x = 1;", "test").unwrap();
    assert_eq!(engine.pending_event_count("UPDATE"), 0);
    engine.update_event_value("UPDATE", 9.0).unwrap();
    assert_eq!(number_at(&engine, "x"), 0.0);
}

#[test]
fn event_side_effects_are_ordered_by_time_then_insertion() {
    let mut engine = ScriptEngine::new();
    engine
        .load_str(
            r#"
            @UPDATE(4) PRINT("b");
            @UPDATE(4) PRINT("c");
            @UPDATE(2) PRINT("a");
            "#,
            "test",
        )
        .unwrap();
    engine.update_event_value("UPDATE", 5.0).unwrap();
    assert_eq!(engine.take_output(), "abc");
}

#[test]
fn events_scheduled_from_a_firing_event_join_the_same_update() {
    let mut engine = ScriptEngine::new();
    engine
        .load_str(r#"@UPDATE(2) @UPDATE(4) PRINT("inner");"#, "test")
        .unwrap();
    engine.update_event_value("UPDATE", 6.0).unwrap();
    // The inner event was registered at value 2 and was due at 4, inside the
    // same update call.
    assert_eq!(engine.take_output(), "inner");
}

#[test]
fn broken_event_actions_do_not_halt_the_queue() {
    let mut engine = ScriptEngine::new();
    engine
        .load_str(
            r#"
            @UPDATE(2) SQRT(1, 2);
            @UPDATE(3) PRINT("alive");
            "#,
            "test",
        )
        .unwrap();
    engine.update_event_value("UPDATE", 4.0).unwrap();
    assert_eq!(engine.take_output(), "alive");
}

#[test]
fn block_actions_run_every_statement() {
    let mut engine = ScriptEngine::new();
    engine
        .load_str(
            "Value x = 0; Value y = 0;
             @UPDATE(1, 1) { x = x + 1; y = y + 2; }",
            "test",
        )
        .unwrap();
    engine.update_event_value("UPDATE", 3.0).unwrap();
    assert_eq!(number_at(&engine, "x"), 3.0);
    assert_eq!(number_at(&engine, "y"), 6.0);
}

#[test]
fn update_drives_start_once_then_ticks() {
    let mut engine = ScriptEngine::new();
    engine
        .load_str(
            r#"
            Value births = 0;
            @START(0) PRINT("go ");
            @UPDATE(1, 1) births = births + 1;
            "#,
            "test",
        )
        .unwrap();
    engine.update(3);
    assert_eq!(engine.take_output(), "go ");
    assert_eq!(number_at(&engine, "births"), 3.0);
    engine.update(2);
    assert_eq!(engine.take_output(), "");
    assert_eq!(number_at(&engine, "births"), 5.0);
}

#[test]
fn exit_stops_the_update_loop() {
    let mut engine = ScriptEngine::new();
    engine.load_str("@UPDATE(2) EXIT();", "test").unwrap();
    engine.update(10);
    assert!(engine.exit_requested());
    assert_eq!(engine.current_update(), 2);
}

#[test]
fn trigger_event_fires_everything_once() {
    let mut engine = ScriptEngine::new();
    engine
        .load_str(
            r#"
            @UPDATE(50) PRINT("far ");
            @UPDATE(90, 10) PRINT("later ");
            "#,
            "test",
        )
        .unwrap();
    engine.trigger_event("UPDATE").unwrap();
    assert_eq!(engine.take_output(), "far later ");
    assert_eq!(engine.pending_event_count("UPDATE"), 0);
}

#[test]
fn custom_event_types_are_parsed_once_registered() {
    let mut engine = ScriptEngine::new();
    engine.register_event_type("SEASON").unwrap();
    engine
        .load_str(r#"@SEASON(1, 1) PRINT("bloom ");"#, "test")
        .unwrap();
    engine.update_event_value("SEASON", 2.0).unwrap();
    assert_eq!(engine.take_output(), "bloom bloom ");

    let err = engine.load_str(r#"@WINTER(1) PRINT("no");"#, "test").unwrap_err();
    assert!(err.to_string().contains("Unknown event type 'WINTER'"));
}

// -- Host binding ------------------------------------------------------------

#[test]
fn linked_variables_forward_reads_and_writes() {
    let mut engine = ScriptEngine::new();
    let pop_size = Rc::new(Cell::new(100.0));
    let root = engine.root();
    engine
        .link_value(root, "pop_size", Rc::clone(&pop_size), "World population cap.", false)
        .unwrap();

    engine.load_str("Value doubled = pop_size * 2; pop_size = 64;", "test").unwrap();
    assert_eq!(number_at(&engine, "doubled"), 200.0);
    assert_eq!(pop_size.get(), 64.0);

    // Host-side writes are visible to later script reads.
    pop_size.set(8.0);
    assert_eq!(engine.eval("pop_size + 1").unwrap(), "9");
}

#[test]
fn linked_getter_setter_pairs_run_on_every_access() {
    let mut engine = ScriptEngine::new();
    let reads = Rc::new(Cell::new(0));
    let store = Rc::new(Cell::new(5.0));
    let root = engine.root();

    let get_reads = Rc::clone(&reads);
    let get_store = Rc::clone(&store);
    let set_store = Rc::clone(&store);
    engine
        .link_fns(
            root,
            "mut_rate",
            Rc::new(move || {
                get_reads.set(get_reads.get() + 1);
                Value::Num(get_store.get())
            }),
            Rc::new(move |v: Value| set_store.set(v.as_num())),
            true,
            "Per-site mutation rate.",
            false,
        )
        .unwrap();

    engine.load_str("Value x = mut_rate + mut_rate; mut_rate = 0.25;", "test").unwrap();
    assert_eq!(number_at(&engine, "x"), 10.0);
    assert_eq!(reads.get(), 2);
    assert_eq!(store.get(), 0.25);
}

/// A minimal host module: a population with a size cell and one member
/// function, the way a simulation module registers itself.
#[test]
fn custom_types_instantiate_host_objects_with_member_functions() {
    let mut engine = ScriptEngine::new();

    let info = engine.register_type("Population", "A collection of organisms.").unwrap();
    info.set_init(|_name| {
        let size = Rc::new(Cell::new(0.0));
        let object: Rc<Cell<f64>> = Rc::clone(&size);
        HostSetup::new(object).link(
            "size",
            vivarium_core::HostLink::Num(size),
            "Number of organisms.",
        )
    });
    info.add_member_fn("GROW", "Add organisms.", ReturnKind::Num, |obj, args| {
        let size = obj.downcast_ref::<Cell<f64>>().expect("population cell");
        size.set(size.get() + args.first().map(|v| v.as_num()).unwrap_or(1.0));
        Ok(Value::Num(size.get()))
    });

    engine
        .load_str(
            "Population sheep {
               size = 10;
             }
             sheep.GROW(5);",
            "test",
        )
        .unwrap();

    assert_eq!(number_at(&engine, "sheep.size"), 15.0);
    // The standard internal switches were installed as hidden builtins.
    assert_eq!(number_at(&engine, "sheep._active"), 1.0);
    let active = engine.find("sheep._active").unwrap();
    assert!(engine.table().entry(active).builtin);

    // The typed scope writes back with its type name and visible fields only.
    let written = engine.write_config();
    assert!(written.contains("Population sheep {"));
    assert!(written.contains("size = 15;"));
    assert!(!written.contains("_active"));
    assert!(!written.contains("GROW"));
}

#[test]
fn declared_but_unknown_types_fail_cleanly() {
    let mut engine = ScriptEngine::new();
    let err = engine.load_str("Void v;", "cfg").unwrap_err();
    assert!(err.to_string().contains("Cannot declare a variable of type 'Void'"));
}

#[test]
fn load_statements_applies_command_line_overrides() {
    let mut engine = ScriptEngine::new();
    engine.load_str("Value random_seed = 0;", "base.cfg").unwrap();
    engine
        .load_statements(&["random_seed = 42;"], "command line")
        .unwrap();
    assert_eq!(number_at(&engine, "random_seed"), 42.0);
}

#[test]
fn deterministic_reload_reproduces_terminal_state() {
    let source = r#"
        Value a = 7;
        Value c = a + 10;
        Struct f { Value g = c * 2; }
        String s = "x" * 3;
    "#;
    let mut first = ScriptEngine::new();
    first.load_str(source, "test").unwrap();
    let mut second = ScriptEngine::new();
    second.load_str(source, "test").unwrap();
    assert_eq!(first.write_config(), second.write_config());
}

#[test]
fn print_concatenates_all_arguments() {
    let mut engine = ScriptEngine::new();
    engine
        .load_str(r#"Value n = 3; PRINT("n=", n, "!");"#, "test")
        .unwrap();
    assert_eq!(engine.take_output(), "n=3!");
}
