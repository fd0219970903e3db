//! Tests for version parsing and ordering

use marsh::VersionSpec;

fn v(s: &str) -> VersionSpec {
    VersionSpec::new(s).unwrap()
}

mod ordering_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reference_order() {
        let expected = [
            "1.0", "1.0-r1", "1.0.1", "1.1_alpha", "1.1_alpha1", "1.1_pre", "1.1", "2.0-scm",
        ];
        let mut versions: Vec<VersionSpec> = [
            "1.1_alpha1", "1.0.1", "2.0-scm", "1.1", "1.0-r1", "1.1_pre", "1.0", "1.1_alpha",
        ]
        .iter()
        .map(|s| v(s))
        .collect();
        versions.sort();
        let sorted: Vec<String> = versions.iter().map(|v| v.to_string()).collect();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn test_exactly_one_relation_holds() {
        let universe = [
            "1", "1.0", "1.0-r1", "1.0.1", "1.1_alpha", "1.1_beta2", "1.1_pre", "1.1_rc3",
            "1.1", "1.1_p1", "1.2a", "1.2b", "1.02", "1.10", "20240101", "2.0-scm", "9999",
            "scm",
        ];
        for a in &universe {
            for b in &universe {
                let (a, b) = (v(a), v(b));
                let count = [a < b, a == b, a > b].iter().filter(|&&r| r).count();
                assert_eq!(count, 1, "trichotomy violated for {} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_less_than_is_transitive() {
        let universe: Vec<VersionSpec> = [
            "1.0", "1.0-r1", "1.0.1", "1.02", "1.1_alpha", "1.1", "1.2a", "1.10", "2.0-scm",
            "scm",
        ]
        .iter()
        .map(|s| v(s))
        .collect();
        for a in &universe {
            for b in &universe {
                for c in &universe {
                    if a < b && b < c {
                        assert!(a < c, "transitivity violated: {} {} {}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn test_revision_defaults_to_zero() {
        assert_eq!(v("1.0"), v("1.0-r0"));
        assert!(v("1.0-r1") > v("1.0"));
    }
}

mod operation_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bump_drops_tail() {
        assert_eq!(v("5.3.1").bump(), v("5.4"));
        assert_eq!(v("1.2.3_alpha4-r5").bump(), v("1.3"));
        assert_eq!(v("2.4").bump(), v("3"));
        assert_eq!(v("7").bump(), v("8"));
    }

    #[test]
    fn test_revision_split_halves() {
        let full = v("1.2.3b_alpha4-r5");
        assert_eq!(full.remove_revision(), v("1.2.3b_alpha4"));
        assert_eq!(full.revision_only(), "r5");
        assert_eq!(v("1.2").revision_only(), "r0");
    }

    #[test]
    fn test_scm_detection() {
        assert!(v("scm").is_scm());
        assert!(v("1.2-scm").is_scm());
        assert!(v("9999").is_scm());
        assert!(!v("1.2_p9999").is_scm());
    }

    #[test]
    fn test_display_preserves_source_text() {
        for s in ["1.02", "1.0-r0", "1.2.3b_alpha4-r5", "2.0-scm"] {
            assert_eq!(v(s).to_string(), s);
        }
    }
}
