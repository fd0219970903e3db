//! Tests for the dependency string parser

use assert_matches::assert_matches;
use marsh::dep_parser::{
    self, find_dialect, parse_dependencies, parse_package_dep_spec, EXHERES_0, NATIVE,
    PMS_EAPI_0, PMS_EAPI_2,
};
use marsh::dep_spec::DepSpec;
use marsh::Error;

mod tree_shape_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_any_of_then_package() {
        let tree = parse_dependencies("|| ( app-a/x app-b/y ) app-c/z", &PMS_EAPI_0).unwrap();
        let DepSpec::AllOf(children) = &tree else {
            panic!("expected implicit all-of root");
        };
        assert_eq!(children.len(), 2);
        let DepSpec::AnyOf(alternatives) = &children[0] else {
            panic!("expected any-of first");
        };
        assert_eq!(alternatives.len(), 2);
        assert_matches!(&alternatives[0], DepSpec::Package(p)
            if p.package.as_ref().unwrap().to_string() == "app-a/x");
        assert_matches!(&alternatives[1], DepSpec::Package(p)
            if p.package.as_ref().unwrap().to_string() == "app-b/y");
        assert_matches!(&children[1], DepSpec::Package(p)
            if p.package.as_ref().unwrap().to_string() == "app-c/z");
    }

    #[test]
    fn test_conditional_with_block() {
        let tree = parse_dependencies("flag? ( app-a/x !app-b/y )", &PMS_EAPI_0).unwrap();
        let DepSpec::AllOf(children) = &tree else {
            panic!("expected implicit all-of root");
        };
        assert_eq!(children.len(), 1);
        let DepSpec::Conditional(c) = &children[0] else {
            panic!("expected conditional");
        };
        assert_eq!(c.flag.as_str(), "flag");
        assert!(!c.inverse);
        assert_eq!(c.children.len(), 2);
        assert_matches!(&c.children[0], DepSpec::Package(_));
        assert_matches!(&c.children[1], DepSpec::Block(b)
            if !b.strong && b.blocked.package.as_ref().unwrap().to_string() == "app-b/y");
    }

    #[test]
    fn test_deeply_nested_conditionals_conjoin() {
        let tree = parse_dependencies("a? ( !b? ( c? ( app-a/x ) ) )", &NATIVE).unwrap();
        let mut inversions = Vec::new();
        let mut node = &tree;
        loop {
            match node {
                DepSpec::AllOf(children) if children.len() == 1 => node = &children[0],
                DepSpec::Conditional(c) if c.children.len() == 1 => {
                    inversions.push((c.flag.to_string(), c.inverse));
                    node = &c.children[0];
                }
                DepSpec::Package(_) => break,
                other => panic!("unexpected node {:?}", other),
            }
        }
        assert_eq!(
            inversions,
            vec![
                ("a".to_string(), false),
                ("b".to_string(), true),
                ("c".to_string(), false)
            ]
        );
    }
}

mod error_tests {
    use super::*;

    #[test]
    fn test_unbalanced_parentheses() {
        assert_matches!(
            parse_dependencies("( app-a/x", &NATIVE),
            Err(Error::DepSpecParse { .. })
        );
        assert_matches!(
            parse_dependencies("app-a/x )", &NATIVE),
            Err(Error::DepSpecParse { location: 8, .. })
        );
    }

    #[test]
    fn test_any_of_needs_group() {
        assert_matches!(
            parse_dependencies("|| app-a/x", &NATIVE),
            Err(Error::DepSpecParse { location: 0, .. })
        );
    }

    #[test]
    fn test_conditional_needs_body() {
        assert_matches!(
            parse_dependencies("flag? ( )", &NATIVE),
            Err(Error::DepSpecParse { .. })
        );
    }

    #[test]
    fn test_atom_rejected_in_license_context() {
        assert_matches!(
            dep_parser::parse_license("app-a/x", &NATIVE),
            Err(Error::DepSpecParse { .. })
        );
    }
}

mod atom_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use marsh::version::{VersionOperator, VersionRequirementsMode};

    #[test]
    fn test_all_pieces() {
        let spec = parse_package_dep_spec(">=app-a/x-1.2:2::overlay[ssl,-gtk]", &NATIVE).unwrap();
        assert_eq!(spec.package.as_ref().unwrap().to_string(), "app-a/x");
        assert_eq!(
            spec.version_requirements[0].operator,
            VersionOperator::GreaterEqual
        );
        assert_eq!(spec.version_requirements[0].version.as_str(), "1.2");
        assert_eq!(spec.slot.as_ref().unwrap().as_str(), "2");
        assert_eq!(spec.repository.as_ref().unwrap().as_str(), "overlay");
        assert_eq!(spec.use_requirements.len(), 2);
    }

    #[test]
    fn test_version_requirement_modes() {
        let both = parse_package_dep_spec("cat/pkg[>=1.2,<2]", &NATIVE).unwrap();
        assert_eq!(both.version_requirements.len(), 2);
        assert_eq!(
            both.version_requirements_mode,
            VersionRequirementsMode::And
        );

        let either = parse_package_dep_spec("cat/pkg[=1.2|=2.0]", &NATIVE).unwrap();
        assert_eq!(
            either.version_requirements_mode,
            VersionRequirementsMode::Or
        );
    }

    #[test]
    fn test_dialect_gating() {
        assert!(parse_package_dep_spec("cat/pkg:2", &PMS_EAPI_0).is_err());
        assert!(parse_package_dep_spec("cat/pkg[ssl]", &PMS_EAPI_0).is_err());
        assert!(parse_package_dep_spec("cat/pkg[ssl]", &PMS_EAPI_2).is_ok());
        assert!(parse_package_dep_spec("cat/pkg::repo", &PMS_EAPI_2).is_err());
        assert!(parse_package_dep_spec("~>cat/pkg-1.2", &EXHERES_0).is_err());
        assert!(parse_package_dep_spec("~>cat/pkg-1.2", &NATIVE).is_ok());
    }

    #[test]
    fn test_find_dialect_names() {
        for name in [
            "pms-eapi-0",
            "pms-eapi-1",
            "pms-eapi-2",
            "marsh-1",
            "exheres-0",
        ] {
            assert_eq!(find_dialect(name).unwrap().name, name);
        }
        assert!(find_dialect("3").is_none());
    }
}

mod round_trip_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // print then reparse must reproduce the tree exactly
    #[test]
    fn test_parse_print_parse_is_identity() {
        let cases = [
            ("app-a/x", &PMS_EAPI_0),
            ("|| ( app-a/x app-b/y ) app-c/z", &PMS_EAPI_0),
            ("flag? ( app-a/x !app-b/y )", &PMS_EAPI_0),
            ("a? ( !b? ( =cat/q-1* ) )", &PMS_EAPI_0),
            (">=app-a/x-1.2:2[ssl,-gtk,qt=,X?]", &PMS_EAPI_2),
            ("!!cat/pkg", &PMS_EAPI_2),
            ("|| ( ( app-a/x app-b/y ) app-c/z )", &NATIVE),
            ("build: app-a/x run: app-b/y post: app-c/z", &NATIVE),
            ("~>cat/pkg-5.3.1::overlay", &NATIVE),
            ("cat/pkg[>=1.2,<2][ssl]", &NATIVE),
        ];
        for (input, dialect) in cases {
            let once = parse_dependencies(input, dialect).unwrap();
            let printed = once.to_string();
            let twice = parse_dependencies(&printed, dialect).unwrap();
            assert_eq!(once, twice, "round trip failed: {:?} -> {:?}", input, printed);
        }
    }

    #[test]
    fn test_uri_round_trip() {
        let tree = dep_parser::parse_fetchable_uri(
            "mirror://example/foo.tar.gz https://a.example.org/b.tar.gz -> renamed.tar.gz",
            &EXHERES_0,
        )
        .unwrap();
        let printed = tree.to_string();
        let again = dep_parser::parse_fetchable_uri(&printed, &EXHERES_0).unwrap();
        assert_eq!(tree, again);
    }
}
