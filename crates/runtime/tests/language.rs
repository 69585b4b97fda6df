//! Surface-language behaviour: expressions, statements, operators,
//! intrinsics.

mod common;

use common::{eval_err, eval_int, get_int, get_str, run_script, with_ip};
use serial_test::serial;

#[test]
#[serial]
fn test_arithmetic_and_precedence() {
    with_ip(|ip| {
        assert_eq!(eval_int(ip, "1 + 2"), 3);
        assert_eq!(eval_int(ip, "2 + 3 * 4"), 14);
        assert_eq!(eval_int(ip, "(2 + 3) * 4"), 20);
        assert_eq!(eval_int(ip, "7 % 3"), 1);
        assert_eq!(eval_int(ip, "1 << 4"), 16);
        assert_eq!(eval_int(ip, "-5 + 2"), -3);
        assert_eq!(eval_int(ip, "0x10 + 010"), 24);
        assert_eq!(eval_int(ip, "~0 & 0xFF"), 255);
    });
}

#[test]
#[serial]
fn test_float_arithmetic_and_mixing() {
    with_ip(|ip| {
        let v = marl_runtime::eval(ip, "1.5 * 2.0").unwrap();
        assert_eq!(marl_core::float::floatof(v).value, 3.0);
        v.decref();
        let v = marl_runtime::eval(ip, "1 + 0.5").unwrap();
        assert_eq!(marl_core::float::floatof(v).value, 1.5);
        v.decref();
        assert_eq!(eval_int(ip, "1.5 < 2"), 1);
    });
}

#[test]
#[serial]
fn test_comparisons_and_equality() {
    with_ip(|ip| {
        assert_eq!(eval_int(ip, "3 < 4"), 1);
        assert_eq!(eval_int(ip, "3 >= 4"), 0);
        assert_eq!(eval_int(ip, "\"abc\" == \"abc\""), 1);
        assert_eq!(eval_int(ip, "\"abc\" < \"abd\""), 1);
        assert_eq!(eval_int(ip, "NULL == NULL"), 1);
        assert_eq!(eval_int(ip, "1 == 1.0"), 1);
    });
}

#[test]
#[serial]
fn test_logical_operators_short_circuit() {
    with_ip(|ip| {
        let scope = run_script(
            ip,
            r#"
            x := 0;
            safe := (x != 0) && (1 / x > 0);
            either := (x == 0) || (1 / x > 0);
            "#,
        );
        assert_eq!(get_int(ip, scope, "safe"), 0);
        assert_eq!(get_int(ip, scope, "either"), 1);
        scope.decref();
    });
}

#[test]
#[serial]
fn test_string_operations() {
    with_ip(|ip| {
        let scope = run_script(
            ip,
            r#"
            s := "foo" + "bar";
            n := len(s);
            up := toupper(s);
            piece := substr(s, 1, 3);
            parts := split("a,b,c", ",");
            nparts := len(parts);
            middle := parts[1];
            "#,
        );
        assert_eq!(get_str(ip, scope, "s"), "foobar");
        assert_eq!(get_int(ip, scope, "n"), 6);
        assert_eq!(get_str(ip, scope, "up"), "FOOBAR");
        assert_eq!(get_str(ip, scope, "piece"), "oob");
        assert_eq!(get_int(ip, scope, "nparts"), 3);
        assert_eq!(get_str(ip, scope, "middle"), "b");
        scope.decref();
    });
}

#[test]
#[serial]
fn test_regexp_literals_and_intrinsics() {
    with_ip(|ip| {
        let scope = run_script(
            ip,
            r#"
            where := search(#o+#, "foobar");
            found := match(#o+#, "foobar");
            missing := search(#zz#, "foobar");
            "#,
        );
        assert_eq!(get_int(ip, scope, "where"), 1);
        assert_eq!(get_str(ip, scope, "found"), "oo");
        assert_eq!(get_int(ip, scope, "missing"), -1);
        scope.decref();
    });
}

#[test]
#[serial]
fn test_loops_break_continue() {
    with_ip(|ip| {
        let scope = run_script(
            ip,
            r#"
            total := 0;
            for (i := 0; i < 10; i += 1) {
                if (i % 2 == 0)
                    continue;
                total += i;
            }
            count := 0;
            while (1) {
                count = count + 1;
                if (count == 5)
                    break;
            }
            reps := 0;
            do {
                reps = reps + 1;
            } while (reps < 3);
            "#,
        );
        assert_eq!(get_int(ip, scope, "total"), 25);
        assert_eq!(get_int(ip, scope, "count"), 5);
        assert_eq!(get_int(ip, scope, "reps"), 3);
        scope.decref();
    });
}

#[test]
#[serial]
fn test_recursive_functions() {
    with_ip(|ip| {
        let scope = run_script(
            ip,
            r#"
            fact := [func (n) {
                if (n <= 1)
                    return 1;
                return n * fact(n - 1);
            }];
            r := fact(10);
            "#,
        );
        assert_eq!(get_int(ip, scope, "r"), 3628800);
        scope.decref();
    });
}

#[test]
#[serial]
fn test_pointers_are_assignable_places() {
    with_ip(|ip| {
        let scope = run_script(
            ip,
            r#"
            v := 10;
            p := &v;
            was := *p;
            *p = 20;
            a := array(1, 2, 3);
            q := &a[1];
            *q = 9;
            a1 := a[1];
            *q += 1;
            a2 := a[1];
            "#,
        );
        assert_eq!(get_int(ip, scope, "was"), 10);
        assert_eq!(get_int(ip, scope, "v"), 20);
        assert_eq!(get_int(ip, scope, "a1"), 9);
        assert_eq!(get_int(ip, scope, "a2"), 10);
        scope.decref();
    });
}

#[test]
#[serial]
fn test_aggregate_literals() {
    with_ip(|ip| {
        let scope = run_script(
            ip,
            r#"
            a := [array 1, 2, 1 + 2];
            n := len(a);
            third := a[2];
            m := [map alpha = 1, beta = 2];
            beta := m.beta;
            s := [set 1, 2, 2, 3];
            ns := len(s);
            has2 := s[2];
            "#,
        );
        assert_eq!(get_int(ip, scope, "n"), 3);
        assert_eq!(get_int(ip, scope, "third"), 3);
        assert_eq!(get_int(ip, scope, "beta"), 2);
        assert_eq!(get_int(ip, scope, "ns"), 3);
        assert_eq!(get_int(ip, scope, "has2"), 1);
        scope.decref();
    });
}

#[test]
#[serial]
fn test_vector_broadcast_and_set_algebra() {
    with_ip(|ip| {
        let scope = run_script(
            ip,
            r#"
            doubled := array(1, 2, 3) * 2;
            d2 := doubled[2];
            summed := array(1, 2) - array(10, 20);
            s0 := summed[0];
            catted := array(1) + array(2, 3);
            nc := len(catted);
            issub := set(1, 2) <= set(1, 2, 3);
            inter := len(set(1, 2, 3) & set(2, 3, 4));
            "#,
        );
        assert_eq!(get_int(ip, scope, "d2"), 6);
        assert_eq!(get_int(ip, scope, "s0"), -9);
        assert_eq!(get_int(ip, scope, "nc"), 3);
        assert_eq!(get_int(ip, scope, "issub"), 1);
        assert_eq!(get_int(ip, scope, "inter"), 2);
        scope.decref();
    });
}

#[test]
#[serial]
fn test_methods_bind_their_subject() {
    with_ip(|ip| {
        let scope = run_script(
            ip,
            r#"
            obj := map("name", "widget");
            getname := [func () { return this.name; }];
            m := method(obj, getname);
            r := m();
            "#,
        );
        assert_eq!(get_str(ip, scope, "r"), "widget");
        scope.decref();
    });
}

#[test]
#[serial]
fn test_parse_and_eval_intrinsics() {
    with_ip(|ip| {
        let scope = run_script(
            ip,
            r#"
            m := parse("zz := 42;");
            v := m.zz;
            e := eval("6 * 7");
            "#,
        );
        assert_eq!(get_int(ip, scope, "v"), 42);
        assert_eq!(get_int(ip, scope, "e"), 42);
        scope.decref();
    });
}

#[test]
#[serial]
fn test_error_taxonomy() {
    with_ip(|ip| {
        assert!(eval_err(ip, "1 / 0").contains("division by 0"));
        assert!(eval_err(ip, "no_such_variable_here").contains("undefined"));
        assert!(eval_err(ip, "len()").contains("expected"));
        assert!(eval_err(ip, "tochar(1.5)").contains("argument 0"));
        assert!(eval_err(ip, "1 + \"s\"").contains("attempt to perform"));
        assert!(eval_err(ip, "fail(\"custom\")").contains("custom"));
    });
}

#[test]
#[serial]
fn test_scope_chain_assignment_semantics() {
    with_ip(|ip| {
        let scope = run_script(
            ip,
            r#"
            counter := 0;
            bump := [func () { counter = counter + 1; }];
            bump();
            bump();
            shadow := [func () { counter := 99; }];
            shadow();
            "#,
        );
        // `=` updated the outer binding; `:=` shadowed it locally.
        assert_eq!(get_int(ip, scope, "counter"), 2);
        scope.decref();
    });
}

#[test]
#[serial]
fn test_keys_and_unassign() {
    with_ip(|ip| {
        let scope = run_script(
            ip,
            r#"
            m := map("a", 1, "b", 2);
            nk := len(keys(m));
            unassign(m, "a");
            left := len(m);
            gone := m.a == NULL;
            "#,
        );
        assert_eq!(get_int(ip, scope, "nk"), 2);
        assert_eq!(get_int(ip, scope, "left"), 1);
        assert_eq!(get_int(ip, scope, "gone"), 1);
        scope.decref();
    });
}

#[test]
#[serial]
fn test_mem_objects_index_raw_memory() {
    with_ip(|ip| {
        let scope = run_script(
            ip,
            r#"
            m := alloc(4, 8);
            m[0] = 7;
            m[3] = -1;
            v0 := m[0];
            v3 := m[3];
            n := len(m);
            "#,
        );
        assert_eq!(get_int(ip, scope, "v0"), 7);
        assert_eq!(get_int(ip, scope, "v3"), -1);
        assert_eq!(get_int(ip, scope, "n"), 4);
        scope.decref();
    });
}

#[test]
#[serial]
fn test_file_io_round_trip() {
    with_ip(|ip| {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let script = format!(
            r#"
            f := fopen("{p}", "w");
            write(f, "line one\nline two\n");
            close(f);
            g := fopen("{p}");
            first := getline(g);
            second := getline(g);
            third := getline(g);
            ended := third == NULL;
            close(g);
            "#,
            p = path.display()
        );
        let scope = run_script(ip, &script);
        assert_eq!(get_str(ip, scope, "first"), "line one");
        assert_eq!(get_str(ip, scope, "second"), "line two");
        assert_eq!(get_int(ip, scope, "ended"), 1);
        scope.decref();
    });
}

#[test]
#[serial]
fn test_math_intrinsics() {
    with_ip(|ip| {
        assert_eq!(eval_int(ip, "abs(-7)"), 7);
        assert_eq!(eval_int(ip, "min(3, 1, 2)"), 1);
        assert_eq!(eval_int(ip, "max(3, 1, 2)"), 3);
        assert_eq!(eval_int(ip, "floor(2.9)"), 2);
        assert_eq!(eval_int(ip, "ceil(2.1)"), 3);
        assert_eq!(eval_int(ip, "int(sqrt(81.0))"), 9);
        assert!(eval_err(ip, "sqrt(-1)").contains("negative"));
    });
}

#[test]
#[serial]
fn test_sort_with_and_without_comparator() {
    with_ip(|ip| {
        let scope = run_script(
            ip,
            r#"
            a := array(3, 1, 2);
            sort(a);
            first := a[0];
            last := a[2];
            b := array(1, 2, 3);
            sort(b, [func (x, y) { return y - x; }]);
            bfirst := b[0];
            names := array("pear", "apple", "plum");
            sort(names);
            alpha := names[0];
            "#,
        );
        assert_eq!(get_int(ip, scope, "first"), 1);
        assert_eq!(get_int(ip, scope, "last"), 3);
        assert_eq!(get_int(ip, scope, "bfirst"), 3);
        assert_eq!(get_str(ip, scope, "alpha"), "apple");
        scope.decref();
    });
}
