//! End-to-end behaviour of the interpreter, driven through scripts.

mod common;

use common::{get_int, get_str, run_script, with_ip};
use serial_test::serial;

#[test]
#[serial]
fn test_copy_makes_independent_aggregates() {
    with_ip(|ip| {
        let scope = run_script(
            ip,
            r#"
            a := array(1, 2, 3);
            b := copy(a);
            a[0] = 10;
            b0 := b[0];
            a0 := a[0];
            "#,
        );
        assert_eq!(get_int(ip, scope, "b0"), 1);
        assert_eq!(get_int(ip, scope, "a0"), 10);
        scope.decref();
    });
}

#[test]
#[serial]
fn test_function_literals_call_and_copy() {
    with_ip(|ip| {
        let scope = run_script(
            ip,
            r#"
            f := [func (x) { return x + 1; }];
            r1 := f(2);
            g := copy(f);
            r2 := g(2);
            "#,
        );
        assert_eq!(get_int(ip, scope, "r1"), 3);
        assert_eq!(get_int(ip, scope, "r2"), 3);
        scope.decref();
    });
}

#[test]
#[serial]
fn test_super_chain_fetch_walks_assign_shadows() {
    with_ip(|ip| {
        let scope = run_script(
            ip,
            r#"
            m := map("x", 1);
            p := map("y", 2);
            super(m, p);
            before := m.y;
            m.y = 20;
            after := m.y;
            parent := p.y;
            "#,
        );
        assert_eq!(get_int(ip, scope, "before"), 2);
        assert_eq!(get_int(ip, scope, "after"), 20);
        assert_eq!(get_int(ip, scope, "parent"), 2);
        scope.decref();
    });
}

#[test]
#[serial]
fn test_channel_of_capacity_one_blocks_and_orders() {
    with_ip(|ip| {
        // The producer's second put must block until the consumer's
        // next get; values arrive in order.
        let scope = run_script(
            ip,
            r#"
            ch := channel(1);
            done := channel(1);
            go([func () {
                put(ch, 7);
                put(ch, 8);
                put(done, 1);
            }]);
            v1 := get(ch);
            v2 := get(ch);
            get(done);
            "#,
        );
        assert_eq!(get_int(ip, scope, "v1"), 7);
        assert_eq!(get_int(ip, scope, "v2"), 8);
        scope.decref();
    });
}

#[test]
#[serial]
fn test_try_onerror_catches_and_restores_depth() {
    with_ip(|ip| {
        let os_before = ip.os().len();
        let scope = run_script(
            ip,
            r#"
            caught := "";
            try {
                fail("x");
            } onerror {
                caught = error;
            }
            resumed := 1 + 1;
            "#,
        );
        assert_eq!(get_str(ip, scope, "caught"), "x");
        assert_eq!(get_int(ip, scope, "resumed"), 2);
        assert_eq!(ip.os().len(), os_before);
        marl_core::clear_error();
        scope.decref();
    });
}

#[test]
#[serial]
fn test_scripted_gc_preserves_live_state() {
    with_ip(|ip| {
        let scope = run_script(
            ip,
            r#"
            keep := array();
            i := 0;
            while (i < 500) {
                push(keep, "prefix" + string(i));
                gc();
                i = i + 1;
            }
            n := len(keep);
            probe := keep[250];
            "#,
        );
        assert_eq!(get_int(ip, scope, "n"), 500);
        assert_eq!(get_str(ip, scope, "probe"), "prefix250");
        scope.decref();
    });
}

#[test]
#[serial]
fn test_deep_recursion_grows_the_stacks() {
    with_ip(|ip| {
        let scope = run_script(
            ip,
            r#"
            depth := [func (n) {
                if (n == 0)
                    return 0;
                return depth(n - 1) + 1;
            }];
            r := depth(1000);
            "#,
        );
        assert_eq!(get_int(ip, scope, "r"), 1000);
        scope.decref();
    });
}

#[test]
#[serial]
fn test_signal_delivery_at_back_edges() {
    with_ip(|ip| {
        // Trap SIGUSR1, raise it synchronously, then enter a loop:
        // the handler must run at a back edge and let the loop exit.
        let base = ip.base_scope;
        let scope = marl_core::map::new_map_with_super(ip, base).unwrap();
        marl_runtime::parse_data(
            ip,
            br#"
            hit := 0;
            trap(10, [func (sig) { hit = sig; }]);
            "#,
            "<test>",
            scope,
        )
        .unwrap();
        unsafe { libc::raise(10) };
        marl_runtime::parse_data(
            ip,
            br#"
            spins := 0;
            while (hit == 0 && spins < 100000) {
                spins = spins + 1;
            }
            "#,
            "<test>",
            scope,
        )
        .unwrap();
        assert_eq!(get_int(ip, scope, "hit"), 10);
        assert!(get_int(ip, scope, "spins") < 100000);
        scope.decref();
    });
}
