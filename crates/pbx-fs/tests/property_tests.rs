use pbx_fs::{BackupStore, NormalizedPath};
use proptest::prelude::*;

proptest! {
    #[test]
    fn test_normalization_invariants(s in "\\PC*") {
        let path = NormalizedPath::new(&s);
        let as_str = path.as_str();

        prop_assert!(!as_str.contains('\\'));
        prop_assert!(!as_str.contains("//"));

        let roundtripped = NormalizedPath::new(path.to_native());
        prop_assert_eq!(path, roundtripped);
    }

    #[test]
    fn test_join_stays_normalized(a in "[a-z/]{0,12}", b in "[a-z.]{1,12}") {
        let joined = NormalizedPath::new(&a).join(&b);
        prop_assert!(!joined.as_str().contains("//"));
        prop_assert!(joined.as_str().ends_with(&b));
    }

    #[test]
    fn test_no_two_consecutive_backups_share_content(
        contents in proptest::collection::vec(prop_oneof!["A", "B", "C"], 1..12),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = NormalizedPath::new(dir.path().join("pjsip.conf"));
        let store = BackupStore::new();

        for content in &contents {
            std::fs::write(path.to_native(), content).unwrap();
            store.backup(&path).unwrap();
        }

        let entries = store.list(&path).unwrap();
        for pair in entries.windows(2) {
            prop_assert_ne!(&pair[0].content_hash, &pair[1].content_hash);
        }

        // One backup per run of identical consecutive contents
        let mut runs = contents.clone();
        runs.dedup();
        prop_assert_eq!(entries.len(), runs.len());
    }
}
