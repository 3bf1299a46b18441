use rox::error::{LoxError, EXIT_RUNTIME_ERROR, EXIT_STATIC_ERROR};
use rox::lox;

/// Run `source`, returning everything it printed and the errors (if any).
fn run(source: &str) -> (String, Vec<LoxError>) {
    let mut out = Vec::new();
    let errors = lox::run_source(source, &mut out).err().unwrap_or_default();
    (String::from_utf8(out).unwrap(), errors)
}

fn messages(errors: &[LoxError]) -> Vec<String> {
    errors.iter().map(LoxError::message).collect()
}

macro_rules! assert_prints {
    ($source:expr, $expected:expr) => {
        let (out, errors) = run($source);
        assert!(errors.is_empty(), "unexpected errors: {:?}", messages(&errors));
        assert_eq!(out, $expected);
    };
}

macro_rules! assert_static_error {
    ($source:expr, $message:expr) => {
        let (out, errors) = run($source);
        assert_eq!(lox::exit_code(&errors), EXIT_STATIC_ERROR);
        assert!(
            messages(&errors).iter().any(|m| m == $message),
            "expected {:?} in {:?}",
            $message,
            messages(&errors)
        );
        assert!(out.is_empty(), "static errors must block execution");
    };
}

// ─────────────────────────── resolution ───────────────────────────

#[test]
fn redeclaration_in_one_local_scope_is_rejected() {
    assert_static_error!(
        "{ var a = 1; var a = 2; }",
        "Already a variable with this name in this scope."
    );
}

#[test]
fn redeclaration_across_scopes_or_at_global_scope_is_allowed() {
    assert_prints!("var a = 1; var a = 2; print a;", "2\n");
    assert_prints!("{ var a = 1; { var a = 2; print a; } print a; }", "2\n1\n");
}

#[test]
fn self_referencing_initializer() {
    assert_static_error!(
        "{ var a = a; }",
        "Can't read local variable in its own initializer."
    );

    // At global scope the read is a runtime lookup of the existing global.
    assert_prints!("var a = 1; var a = a; print a;", "1\n");
}

#[test]
fn misplaced_return_this_and_super() {
    assert_static_error!("return 1;", "Can't return from top-level code.");
    assert_static_error!("print this;", "Can't use 'this' outside of a class.");
    assert_static_error!("super.f();", "Can't use 'super' outside of a class.");
    assert_static_error!(
        "class A { init() { return 1; } }",
        "Can't return a value from an initializer."
    );
}

#[test]
fn every_static_error_is_reported() {
    let (_, errors) = run("{ var a = 1; var a = 2; } return 3; print this;");
    assert_eq!(errors.len(), 3);
}

// ─────────────────────────── closures ─────────────────────────────

#[test]
fn counter_closure_captures_by_reference() {
    assert_prints!(
        r#"
        fun makeCounter() {
            var i = 0;
            fun count() {
                i = i + 1;
                return i;
            }
            return count;
        }
        var counter = makeCounter();
        print counter();
        print counter();
        "#,
        "1\n2\n"
    );
}

#[test]
fn recursion_and_functions_as_values() {
    assert_prints!(
        r#"
        fun fib(n) { if (n < 2) return n; return fib(n - 2) + fib(n - 1); }
        fun apply(f, x) { return f(x); }
        print apply(fib, 10);
        print fib;
        print clock;
        "#,
        "55\n<fn fib>\n<native fn>\n"
    );
}

#[test]
fn for_loop_runs_with_its_own_scope() {
    assert_prints!(
        "var i = 10; for (var i = 0; i < 3; i = i + 1) print i; print i;",
        "0\n1\n2\n10\n"
    );
}

// ─────────────────────────── classes ──────────────────────────────

#[test]
fn bound_methods_keep_their_own_receiver() {
    assert_prints!(
        r#"
        class Box {
            init(label) { this.label = label; }
            me() { return this; }
        }
        var a = Box("a");
        var b = Box("b");
        var ma = a.me;
        var mb = b.me;
        print ma() == a;
        print mb() == b;
        print ma() == mb();
        print ma().label + mb().label;
        "#,
        "true\ntrue\nfalse\nab\n"
    );
}

#[test]
fn bare_return_in_constructor_yields_instance() {
    assert_prints!(
        r#"
        class Early {
            init() {
                this.ready = true;
                return;
                this.ready = false;
            }
        }
        var e = Early();
        print e;
        print e.ready;
        "#,
        "Early instance\ntrue\n"
    );
}

#[test]
fn super_dispatches_to_the_superclass_method() {
    assert_prints!(
        r#"
        class A { f() { return "A"; } }
        class B < A { f() { return "B" + super.f(); } }
        print B().f();
        "#,
        "BA\n"
    );
}

#[test]
fn classes_print_by_name_and_fields_shadow_methods() {
    assert_prints!(
        r#"
        class Thing { name() { return "method"; } }
        var t = Thing();
        print Thing;
        t.name = "field";
        print t.name;
        "#,
        "Thing\nfield\n"
    );
}

// ─────────────────────────── runtime errors ───────────────────────

#[test]
fn arity_mismatch_halts_execution() {
    let (out, errors) = run(
        r#"
        fun pair(a, b) { return a; }
        print "before";
        pair(1, 2, 3);
        print "after";
        "#,
    );

    assert_eq!(out, "before\n");
    assert_eq!(lox::exit_code(&errors), EXIT_RUNTIME_ERROR);
    assert_eq!(messages(&errors), ["Expected 2 arguments but got 3."]);
    assert_eq!(errors[0].to_string(), "Expected 2 arguments but got 3.\n[line 4]");
}

#[test]
fn plus_requires_two_numbers_or_two_strings() {
    assert_prints!("print \"1\" + \"2\"; print 1 + 2;", "12\n3\n");

    let (_, errors) = run("print \"1\" + 2;");
    assert_eq!(
        messages(&errors),
        ["Operands must be two numbers or two strings."]
    );
}

#[test]
fn undeclared_names_are_not_created_on_assignment() {
    let (out, errors) = run("ghost = 1; print \"unreachable\";");
    assert!(out.is_empty());
    assert_eq!(messages(&errors), ["Undefined variable 'ghost'."]);

    let (_, errors) = run("class P {} print P().missing;");
    assert_eq!(messages(&errors), ["Undefined property 'missing'."]);
}

#[test]
fn calling_non_callables_and_bad_superclasses() {
    let (_, errors) = run("\"text\"();");
    assert_eq!(messages(&errors), ["Can only call functions and classes."]);

    let (_, errors) = run("var x = \"no\"; class C < x {}");
    assert_eq!(messages(&errors), ["Superclass must be a class."]);

    let (_, errors) = run("var n = 3; n.field = 1;");
    assert_eq!(messages(&errors), ["Only instances have fields."]);
}

#[test]
fn deep_recursion_completes() {
    assert_prints!(
        r#"
        fun depth(n) { if (n == 0) return 0; return 1 + depth(n - 1); }
        print depth(3000);
        "#,
        "3000\n"
    );
}

#[test]
fn unbounded_recursion_is_a_runtime_error() {
    let (out, errors) = run(
        r#"
        fun forever() { forever(); }
        print "start";
        forever();
        print "unreachable";
        "#,
    );

    assert_eq!(out, "start\n");
    assert_eq!(lox::exit_code(&errors), EXIT_RUNTIME_ERROR);
    assert_eq!(messages(&errors), ["Stack overflow."]);
}
