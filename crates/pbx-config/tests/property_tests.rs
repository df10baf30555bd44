use pbx_config::parse;
use proptest::prelude::*;

fn line() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "[a-z0-9]{1,6}".prop_map(|name| format!("[{}]", name)),
        "[a-z]{1,6}=[a-z0-9 ]{0,8}",
        "[a-z]{1,6} => [a-z0-9]{1,8}",
        "; [a-z ]{0,10}",
        "#[a-z ]{0,10}",
        "  [a-z]{1,8}  ",
    ]
}

proptest! {
    #[test]
    fn test_parse_render_roundtrip(lines in proptest::collection::vec(line(), 0..30), trailing in any::<bool>()) {
        let mut source = lines.join("\n");
        if trailing && !source.is_empty() {
            source.push('\n');
        }

        let doc = parse(&source).unwrap();
        prop_assert_eq!(doc.render(), source);
    }

    #[test]
    fn test_upsert_is_idempotent(
        lines in proptest::collection::vec(line(), 0..20),
        name in "[0-9]{4}",
        value in "[a-z]{1,8}",
    ) {
        let doc = parse(&lines.join("\n")).unwrap();
        let once = doc.upsert_section("aor", &name, [("max_contacts", value.as_str())]);
        let twice = once.clone().upsert_section("aor", &name, [("max_contacts", value.as_str())]);

        prop_assert_eq!(once.render(), twice.render());
        prop_assert_eq!(once.sections().iter().filter(|s| s.is("aor", &name)).count(), 1);
    }

    #[test]
    fn test_written_values_read_back_unchanged(value in r##"[a-z;\\"#=]([a-z ;\\"#=]{0,10}[a-z;\\"#=])?"##) {
        let doc = parse("").unwrap().upsert_section("auth", "1001", [("password", value.as_str())]);

        let reparsed = parse(&doc.render()).unwrap();
        let section = reparsed.find("auth", "1001").unwrap();
        prop_assert_eq!(section.get("password"), Some(value.as_str()));
    }
}
