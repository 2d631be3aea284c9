//! Programmes complets : source → parse → compile → VM (stdlib installée).

use pretty_assertions::assert_eq;
use trefle_runtime::{Object, RuntimeError};
use trefle_tests::{eval, fail, machine};

fn value(src: &str) -> String {
    eval(src).0
}

#[test]
fn empty_bodies_are_null() {
    assert_eq!(value(""), "null");
    assert_eq!(value("local f = function() end\nf()"), "null");
    assert_eq!(value("if (true) end"), "null");
}

#[test]
fn locals_and_reassignment() {
    assert_eq!(value("local x = 5  x = x + 1  x"), "6");
}

#[test]
fn captures_are_shared_by_reference() {
    let src = "
        local c = 0
        local f = function() c = c + 1 end
        f() f()
        c
    ";
    assert_eq!(value(src), "2");
}

#[test]
fn nested_functions_capture_transitively() {
    let src = "
        function outer()
          local total = 0
          function middle()
            function() total += 5  total end
          end
        end
        local add = outer()()
        add()
        add()
    ";
    assert_eq!(value(src), "10");
}

#[test]
fn if_covers_all_three_shapes() {
    assert_eq!(value("if (1 < 2) 'then' end"), "then");
    assert_eq!(value("if (1 > 2) 'then' end"), "null");
    assert_eq!(value("if (1 > 2) 'then' else 'else' end"), "else");
}

#[test]
fn fibonacci_loop_and_recursion() {
    let iterative = "
        function fib(n)
          local a = 0 local b = 1 local i = 0
          while (i < n)
            local t = a + b
            a = b
            b = t
            i += 1
          end
          a
        end
        fib(20)
    ";
    assert_eq!(value(iterative), "6765");

    let recursive = "
        local fib = null
        fib = function(n) if (n < 2) n else fib(n - 1) + fib(n - 2) end end
        fib(15)
    ";
    assert_eq!(value(recursive), "610");
}

#[test]
fn inheritance_with_base_constructor_and_separate_storage() {
    let src = "
        class Shape
          sides = 0
          tags = []
          constructor = function(n) sides = n end
          describe = function() 'shape with ' + sides + ' sides' end
        end
        class Square extends Shape
          constructor = function() base.constructor(4) end
          describe = function() 'square, ' + base.describe() end
        end
        local a = Square.new()
        local b = Square.new()
        a.tags.append('red')
        [a.describe(), a.tags.size(), b.tags.size()]
    ";
    assert_eq!(value(src), r#"["square, shape with 4 sides", 1, 0]"#);
}

#[test]
fn base_constructor_sets_inherited_and_own_members() {
    let src = "
        class A
          constructor = function()
            this.x = 1
          end
        end
        class B extends A
          constructor = function()
            base.constructor()
            this.y = 2
          end
        end
        [B.new().x == 1, B.new().y == 2]
    ";
    assert_eq!(value(src), "[true, true]");
}

#[test]
fn named_classes_are_visible_from_members() {
    let factory = "
        class Node
          make = function() Node.new() end
        end
        Node.new().make().make() != null
    ";
    assert_eq!(value(factory), "true");

    let siblings = "
        class Point x = 3 end
        class Factory
          make = function() Point.new() end
        end
        Factory.new().make().x
    ";
    assert_eq!(value(siblings), "3");
}

#[test]
fn local_helpers_stay_out_of_class_members() {
    // seules les globales traversent la frontière d'une classe
    let local = "local helper = function(n) n * 2 end\nclass C go = function() helper(2) end end\nC.new().go()";
    assert_eq!(fail(local).error, RuntimeError::UndefinedVariable("helper".into()));

    let global = "helper = function(n) n * 2 end\nclass C go = function() helper(2) end end\nC.new().go()";
    assert_eq!(value(global), "4");
}

#[test]
fn and_or_guard_the_right_operand() {
    assert_eq!(value("local m = null\nm != null and m.x"), "false");
    assert_eq!(value("local m = {x: 5}\nm != null and m.x"), "true");
    assert_eq!(value("local m = null\nm == null or m.x"), "true");

    let (result, printed) = eval("local calls = 0\nlocal hit = function() calls += 1  true end\nfalse && hit()\ntrue || hit()\ncalls");
    assert_eq!(result, "0");
    assert_eq!(printed, "");
}

#[test]
fn same_context_is_deterministic() {
    let src = "local m = {a: 1, b: [2, 3]}\nm.b.append(m.a)\nstd.print(m)\nm.b";
    let program = trefle_parser::parse("det.tf", src).unwrap();
    let context = trefle_compiler::compile(&program).unwrap();
    let runs: Vec<_> = (0..3)
        .map(|_| {
            let capture = trefle_tests::Capture::default();
            let mut vm = trefle_vm::Vm::new(context.clone()).with_stdout(capture.clone());
            trefle_stdlib::install(&mut vm);
            (vm.run().unwrap().to_string(), capture.text())
        })
        .collect();
    assert_eq!(runs[0], ("[2, 3, 1]".to_owned(), "{a: 1, b: [2, 3, 1]}\n".to_owned()));
    assert!(runs.iter().all(|run| *run == runs[0]));
}

#[test]
fn literals_evaluate_left_to_right() {
    let src = "
        local order = ''
        local mark = function(s) order += s  s end
        local a = [mark('a'), mark('b')]
        local m = {x: mark('c'), y: mark('d')}
        order
    ";
    assert_eq!(value(src), "abcd");
}

#[test]
fn native_arity_mismatch_is_reported() {
    let err = fail("std.print\nstd.type(1, 2)");
    assert_eq!(err.error, RuntimeError::Arity { expected: 1, got: 2 });
    assert_eq!(err.position.line, 2);
}

#[test]
fn boolean_plus_array_names_both_kinds() {
    let err = fail("local xs = [1]\ntrue + xs");
    assert_eq!(err.to_string(), "main.tf:2: can not add Boolean and Array");
}

#[test]
fn host_globals_are_visible() {
    let (mut vm, _) = machine("host.tf", "answer * 2");
    vm.add_global("answer", Object::Integer(21));
    assert_eq!(vm.run().unwrap().to_string(), "42");
}

#[test]
fn closures_leak_their_captured_cells() {
    let (mut vm, _) = machine("leak.tf", "function make() local n = 0  function() n end end\nmake() make()");
    vm.run().unwrap();
    // le slot `make` + une cellule par closure renvoyée
    assert_eq!(vm.pool().live_count(), 3);
}
