//! Structural table signatures.
//!
//! Tables with the same column set get the same signature regardless of
//! declaration order, so picking one table targets all its structural
//! siblings at once.

use std::collections::BTreeMap;

use console::Color;
use sha2::{Digest, Sha256};

use crate::scheme::TableDescription;

/// Canonical encoding of a table's column set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(String);

impl Signature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Column tuples sorted key-first, then case-insensitively by name, encoded
/// as canonical JSON. A description with no parsed columns degrades to a
/// hash of the raw text so unparseable tables still group among themselves.
pub fn signature_of(desc: &TableDescription) -> Signature {
    if desc.columns.is_empty() {
        let mut hasher = Sha256::new();
        hasher.update(desc.raw.as_bytes());
        return Signature(format!("raw:{:x}", hasher.finalize()));
    }

    let mut normalized: Vec<(bool, String, String, bool)> = desc
        .columns
        .iter()
        .map(|c| (c.is_key, c.name.clone(), c.type_name.clone(), c.not_null))
        .collect();
    normalized.sort_by_key(|(is_key, name, _, _)| (!is_key, name.to_lowercase()));

    Signature(serde_json::to_string(&normalized).unwrap_or_default())
}

/// Group table paths by signature, deterministically ordered.
pub fn group_by_signature(entries: &[(String, Signature)]) -> BTreeMap<Signature, Vec<String>> {
    let mut groups: BTreeMap<Signature, Vec<String>> = BTreeMap::new();
    for (path, signature) in entries {
        groups
            .entry(signature.clone())
            .or_default()
            .push(path.clone());
    }
    groups
}

/// Stable per-signature display color, picked from the brighter part of the
/// 256-color cube.
pub fn color_for(signature: &Signature) -> Color {
    let mut hasher = Sha256::new();
    hasher.update(signature.as_str().as_bytes());
    let digest = hasher.finalize();
    let r = 1 + digest[0] % 5;
    let g = 1 + digest[1] % 5;
    let b = 1 + digest[2] % 5;
    Color::Color256(16 + 36 * r + 6 * g + b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::Column;

    fn desc(path: &str, columns: Vec<Column>) -> TableDescription {
        TableDescription {
            path: path.to_string(),
            header: "<table> t".to_string(),
            columns,
            raw: format!("raw description of {}", path),
        }
    }

    fn col(name: &str, type_name: &str, not_null: bool, is_key: bool) -> Column {
        Column {
            name: name.to_string(),
            type_name: type_name.to_string(),
            not_null,
            is_key,
        }
    }

    #[test]
    fn test_signature_ignores_declaration_order() {
        let a = desc(
            "/db/a",
            vec![
                col("id", "Utf8", true, true),
                col("amount", "Int64", true, false),
                col("note", "Utf8", false, false),
            ],
        );
        let b = desc(
            "/db/b",
            vec![
                col("note", "Utf8", false, false),
                col("id", "Utf8", true, true),
                col("amount", "Int64", true, false),
            ],
        );
        assert_eq!(signature_of(&a), signature_of(&b));
    }

    #[test]
    fn test_key_columns_sort_first() {
        // "zz" is a key column and must precede "aa" in the encoding
        let d = desc(
            "/db/t",
            vec![
                col("aa", "Utf8", true, false),
                col("zz", "Utf8", true, true),
            ],
        );
        let sig = signature_of(&d);
        let zz = sig.as_str().find("zz").unwrap();
        let aa = sig.as_str().find("aa").unwrap();
        assert!(zz < aa);
    }

    #[test]
    fn test_nullability_changes_signature() {
        let a = desc("/db/a", vec![col("id", "Utf8", true, true)]);
        let b = desc("/db/b", vec![col("id", "Utf8", false, true)]);
        assert_ne!(signature_of(&a), signature_of(&b));
    }

    #[test]
    fn test_raw_fallback_when_no_columns_parse() {
        let a = desc("/db/a", vec![]);
        let sig = signature_of(&a);
        assert!(sig.as_str().starts_with("raw:"));
        // same raw text, same signature
        assert_eq!(sig, signature_of(&a));
        // different raw text, different signature
        assert_ne!(sig, signature_of(&desc("/db/b", vec![])));
    }

    #[test]
    fn test_group_by_signature() {
        let shared = vec![col("id", "Utf8", true, true)];
        let a = desc("/db/a", shared.clone());
        let b = desc("/db/b", shared);
        let c = desc("/db/c", vec![col("id", "Int64", true, true)]);

        let entries = vec![
            (a.path.clone(), signature_of(&a)),
            (b.path.clone(), signature_of(&b)),
            (c.path.clone(), signature_of(&c)),
        ];
        let groups = group_by_signature(&entries);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&signature_of(&a)], vec!["/db/a", "/db/b"]);
        assert_eq!(groups[&signature_of(&c)], vec!["/db/c"]);
    }

    #[test]
    fn test_color_is_deterministic() {
        let d = desc("/db/a", vec![col("id", "Utf8", true, true)]);
        let sig = signature_of(&d);
        assert_eq!(color_for(&sig), color_for(&sig));
        match color_for(&sig) {
            Color::Color256(idx) => assert!((16..=231).contains(&idx)),
            other => panic!("unexpected color {:?}", other),
        }
    }
}
