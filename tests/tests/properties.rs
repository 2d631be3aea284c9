//! Propriétés : l'arithmétique entière de la VM suit celle de Rust (avec contrôle de débordement).

use proptest::prelude::*;
use trefle_runtime::RuntimeError;

fn run(src: &str) -> Result<String, RuntimeError> {
    let (mut vm, _) = trefle_tests::machine("prop.tf", src);
    vm.run().map(|v| v.to_string()).map_err(|e| e.error)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn integer_arithmetic_matches_rust(a in -10_000i64..10_000, b in -10_000i64..10_000) {
        let src = format!("local a = {a}\nlocal b = {b}\n[a + b, a - b, a * b, a < b, a == b]");
        let expected = format!("[{}, {}, {}, {}, {}]", a + b, a - b, a * b, a < b, a == b);
        prop_assert_eq!(run(&src).unwrap(), expected);
    }

    #[test]
    fn division_truncates_or_fails_on_zero(a in -1_000i64..1_000, b in -20i64..20) {
        let result = run(&format!("local a = {a}\nlocal b = {b}\na / b"));
        if b == 0 {
            prop_assert_eq!(result, Err(RuntimeError::DivisionByZero));
        } else {
            prop_assert_eq!(result.unwrap(), (a / b).to_string());
        }
    }

    #[test]
    fn while_sums_like_a_range(n in 0i64..200) {
        let src = format!("local i = 0 local s = 0\nwhile (i < {n}) s += i  i += 1 end\ns");
        prop_assert_eq!(run(&src).unwrap(), (0..n).sum::<i64>().to_string());
    }
}
