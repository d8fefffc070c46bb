//! End-to-end tests: compile dialect sources and execute them on the VM.
//!
//! Each test asserts the program's exit status, which is `main`'s return
//! value delivered through the halt signal.

use stackc::{CompilerConfig, compile, compile_with_config};
use stackc_vm::Vm;

fn run(source: &str) -> u32 {
    let program = compile(source).expect("program compiles");
    let mut vm = Vm::new(program.bytes, 1 << 16).expect("vm constructs");
    vm.run().expect("program halts")
}

#[test]
fn test_minimal_program_exits_zero() {
    assert_eq!(run("int main() { return 0; }"), 0);
}

#[test]
fn test_return_value_becomes_exit_status() {
    assert_eq!(run("int main() { return 42; }"), 42);
}

#[test]
fn test_arithmetic_precedence() {
    assert_eq!(run("int main() { return 2 + 3 * 4; }"), 14);
    assert_eq!(run("int main() { return (2 + 3) * 4; }"), 20);
    assert_eq!(run("int main() { return 7 / 2 + 7 % 2; }"), 4);
}

#[test]
fn test_unary_operators() {
    assert_eq!(run("int main() { return -5 + 8; }"), 3);
    assert_eq!(run("int main() { return ~0 + 2; }"), 1);
}

#[test]
fn test_local_variables() {
    assert_eq!(run("int main() { int a = 5; int b = 7; return a + b; }"), 12);
}

#[test]
fn test_block_scoping_and_shadowing() {
    assert_eq!(
        run("int main() { int x = 1; { int x = 2; x = 3; } return x; }"),
        1
    );
}

#[test]
fn test_globals() {
    assert_eq!(run("int g = 5; int main() { return g + 1; }"), 6);
    assert_eq!(run("int g; int main() { g = 9; return g; }"), 9);
    assert_eq!(
        run("int a = 3; int b = 4; int main() { return a * a + b * b; }"),
        25
    );
}

#[test]
fn test_global_initializer_can_reference_earlier_globals() {
    assert_eq!(run("int a = 6; int b = a + 1; int main() { return b; }"), 7);
}

#[test]
fn test_function_call_with_arguments() {
    assert_eq!(
        run("int add(int a, int b) { return a + b; } int main() { return add(2, 3); }"),
        5
    );
}

#[test]
fn test_void_function_with_side_effects() {
    assert_eq!(
        run("int g = 0; void bump() { g = g + 1; } \
             int main() { bump(); bump(); return g; }"),
        2
    );
}

#[test]
fn test_recursion() {
    assert_eq!(
        run("int fact(int n) { if (n < 2) { return 1; } return n * fact(n - 1); } \
             int main() { return fact(5); }"),
        120
    );
}

#[test]
fn test_if_else() {
    assert_eq!(
        run("int main() { int x = 3; if (x > 2) { return 10; } else { return 20; } }"),
        10
    );
    assert_eq!(
        run("int main() { int x = 1; if (x > 2) { return 10; } else { return 20; } }"),
        20
    );
}

#[test]
fn test_if_without_else_falls_through() {
    assert_eq!(
        run("int main() { int x = 0; if (x) { return 1; } return 2; }"),
        2
    );
}

#[test]
fn test_while_loop() {
    assert_eq!(
        run("int main() { int i = 0; int sum = 0; \
             while (i < 5) { i = i + 1; sum = sum + i; } return sum; }"),
        15
    );
}

#[test]
fn test_do_while_runs_at_least_once() {
    assert_eq!(
        run("int main() { int i = 0; do { i = i + 1; } while (i < 3); return i; }"),
        3
    );
    assert_eq!(
        run("int main() { int i = 9; do { i = i + 1; } while (0); return i; }"),
        10
    );
}

#[test]
fn test_for_loop() {
    assert_eq!(
        run("int main() { int sum = 0; int i; \
             for (i = 1; i <= 4; i = i + 1) { sum = sum + i; } return sum; }"),
        10
    );
}

#[test]
fn test_goto_skips_forward() {
    assert_eq!(
        run("int main() { int x = 1; goto done; x = 2; done: return x; }"),
        1
    );
}

#[test]
fn test_goto_backward_loops() {
    assert_eq!(
        run("int main() { int i = 0; again: i = i + 1; \
             if (i < 4) { goto again; } return i; }"),
        4
    );
}

#[test]
fn test_ternary() {
    assert_eq!(run("int main() { return 1 ? 4 : 5; }"), 4);
    assert_eq!(run("int main() { return 0 ? 4 : 5; }"), 5);
}

#[test]
fn test_logical_connectives() {
    assert_eq!(
        run("int main() { int r = 0; \
             if (1 && 0) { r = r + 1; } \
             if (1 || 0) { r = r + 2; } \
             if (!0) { r = r + 4; } \
             return r; }"),
        6
    );
}

#[test]
fn test_logical_connectives_short_circuit() {
    assert_eq!(
        run("int g = 0; \
             int bump() { g = g + 1; return 1; } \
             int main() { 0 && bump(); 1 || bump(); return g; }"),
        0
    );
    assert_eq!(
        run("int g = 0; \
             int bump() { g = g + 1; return 1; } \
             int main() { 1 && bump(); 0 || bump(); return g; }"),
        2
    );
}

#[test]
fn test_compound_assignment() {
    assert_eq!(
        run("int main() { int x = 10; x += 5; x -= 3; x *= 2; return x; }"),
        24
    );
}

#[test]
fn test_prefix_and_postfix_increment() {
    assert_eq!(
        run("int main() { int x = 5; int y = x++; return x * 10 + y; }"),
        65
    );
    assert_eq!(
        run("int main() { int x = 5; int y = ++x; return x * 10 + y; }"),
        66
    );
    assert_eq!(run("int main() { int x = 5; x--; --x; return x; }"), 3);
}

#[test]
fn test_assignment_chains_right_associatively() {
    assert_eq!(
        run("int main() { int a = 0; int b = 0; a = b = 3; return a + b; }"),
        6
    );
}

#[test]
fn test_cast_truncates_toward_zero() {
    assert_eq!(run("int main() { double d = 3.9; return (int) d; }"), 3);
}

#[test]
fn test_sixty_four_bit_arithmetic() {
    assert_eq!(
        run("int main() { long big = 5000000000l; \
             return (int) (big / 1000000000l); }"),
        5
    );
}

#[test]
fn test_float_arithmetic() {
    assert_eq!(
        run("int main() { double d = 1.5; d = d * 2.0; \
             if (d == 3.0) { return 1; } return 0; }"),
        1
    );
    assert_eq!(
        run("int main() { float f = 2.5f; f += 0.5f; return (int) f; }"),
        3
    );
}

#[test]
fn test_char_values() {
    assert_eq!(
        run("int main() { char a = 'A'; char b = a + '\\1'; \
             if (b == 'B') { return 1; } return 0; }"),
        1
    );
}

#[test]
fn test_bitwise_operators() {
    assert_eq!(run("int main() { return (12 & 10) + (12 | 10) + (12 ^ 10); }"), 28);
}

#[test]
fn test_negative_return_wraps_into_status() {
    // -1 as the uint32 halt status.
    assert_eq!(run("int main() { return -1; }"), u32::MAX);
}

#[test]
fn test_custom_memory_size_config() {
    let config = CompilerConfig::new().with_memory_size(4096);
    let program =
        compile_with_config("int g = 3; int main() { return g; }", &config).expect("compiles");
    let mut vm = Vm::new(program.bytes, 4096).expect("vm constructs");
    assert_eq!(vm.run().expect("halts"), 3);
}

#[test]
fn test_deep_calls_run_out_of_memory_as_a_segfault() {
    // Unbounded recursion must fault cleanly, not wrap around.
    let program = compile(
        "int f(int n) { return f(n + 1); } int main() { return f(0); }",
    )
    .expect("compiles");
    let mut vm = Vm::new(program.bytes, 1024).expect("vm constructs");
    assert!(vm.run().is_err());
}
