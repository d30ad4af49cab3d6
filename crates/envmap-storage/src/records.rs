use std::collections::{btree_map::Entry, BTreeMap};

use chrono::{DateTime, Utc};
use envmap_core::SecretRecord;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Plaintext contents of the store: fully-qualified name -> entry.
pub type Entries = BTreeMap<String, SecretEntry>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredEntry")]
pub struct SecretEntry {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl SecretEntry {
    pub fn new(value: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            created_at: Some(created_at),
        }
    }
}

impl From<SecretEntry> for SecretRecord {
    fn from(entry: SecretEntry) -> Self {
        SecretRecord {
            value: entry.value,
            created_at: entry.created_at,
        }
    }
}

/// On-disk shapes: stores written before metadata existed hold bare strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Plain(String),
    Full {
        value: String,
        #[serde(default)]
        created_at: Option<DateTime<Utc>>,
    },
}

impl From<StoredEntry> for SecretEntry {
    fn from(stored: StoredEntry) -> Self {
        match stored {
            StoredEntry::Plain(value) => SecretEntry {
                value,
                created_at: None,
            },
            StoredEntry::Full { value, created_at } => SecretEntry { value, created_at },
        }
    }
}

pub fn serialize(entries: &Entries) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec_pretty(entries)?)
}

/// Empty input is the never-written store, not an error.
pub fn deserialize(bytes: &[u8]) -> Result<Entries, StoreError> {
    if bytes.is_empty() {
        return Ok(Entries::new());
    }
    Ok(serde_json::from_slice(bytes)?)
}

/// Insert or update `name`, keeping the original creation time of an existing entry.
pub fn upsert(entries: &mut Entries, name: String, value: String, now: DateTime<Utc>) {
    match entries.entry(name) {
        Entry::Occupied(mut existing) => existing.get_mut().value = value,
        Entry::Vacant(slot) => {
            slot.insert(SecretEntry::new(value, now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).expect("valid timestamp")
    }

    #[test]
    fn round_trip_preserves_entries() {
        let entries = Entries::from([
            ("/app/dev/DB_URL".to_string(), SecretEntry::new("postgres://x", at(1_700_000_000))),
            (
                "/app/dev/TOKEN".to_string(),
                SecretEntry {
                    value: "line1\nline2 \"quoted\" ✓".into(),
                    created_at: None,
                },
            ),
            ("EMPTY".to_string(), SecretEntry::new("", at(0))),
        ]);

        let bytes = serialize(&entries).expect("serialize");
        assert_eq!(deserialize(&bytes).expect("deserialize"), entries);
    }

    #[test]
    fn round_trip_holds_for_generated_mappings() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        const POOL: &[char] = &[
            'a', 'Z', '0', '_', '/', ' ', '"', '\\', '\n', '\t', '\r', '\0', '\u{7f}', '\u{1b}',
            'é', 'ß', '日', '本', '🔑', '\u{200b}', '{', '}',
        ];
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let text = |rng: &mut StdRng, max: usize| -> String {
            let len = rng.gen_range(0..=max);
            (0..len).map(|_| POOL[rng.gen_range(0..POOL.len())]).collect()
        };

        for round in 0..64 {
            let size = if round == 0 { 0 } else { rng.gen_range(1..=200) };
            let mut entries = Entries::new();
            for _ in 0..size {
                let name = text(&mut rng, 24);
                let value = text(&mut rng, 64);
                let created_at = rng
                    .gen_bool(0.7)
                    .then(|| at(rng.gen_range(0..4_000_000_000)));
                entries.insert(name, SecretEntry { value, created_at });
            }

            let bytes = serialize(&entries).expect("serialize");
            assert_eq!(deserialize(&bytes).expect("deserialize"), entries, "round {round}");
        }
    }

    #[test]
    fn empty_blob_is_empty_store() {
        assert!(deserialize(b"").expect("empty").is_empty());
        assert!(deserialize(b"{}").expect("empty object").is_empty());
    }

    #[test]
    fn reads_plain_string_entries() {
        let legacy = br#"{ "/app/dev/KEY": "value", "/app/dev/NEW": { "value": "v2", "created_at": "2024-01-02T03:04:05Z" } }"#;
        let entries = deserialize(legacy).expect("legacy");

        assert_eq!(
            entries["/app/dev/KEY"],
            SecretEntry {
                value: "value".into(),
                created_at: None,
            }
        );
        assert_eq!(
            entries["/app/dev/NEW"].created_at,
            Some(DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z").expect("ts").with_timezone(&Utc))
        );
    }

    #[test]
    fn malformed_input_is_a_parse_error() {
        let err = deserialize(b"{not json").expect_err("malformed");
        assert!(matches!(err, StoreError::Parse(_)));
        let err = deserialize(b"[1, 2]").expect_err("wrong shape");
        assert!(matches!(err, StoreError::Parse(_)));
    }

    #[test]
    fn upsert_keeps_created_at() {
        let mut entries = Entries::new();
        upsert(&mut entries, "K".into(), "v1".into(), at(100));
        upsert(&mut entries, "K".into(), "v2".into(), at(200));

        assert_eq!(entries["K"], SecretEntry::new("v2", at(100)));
    }

    #[test]
    fn upsert_does_not_stamp_legacy_entries() {
        let mut entries = deserialize(br#"{"K": "old"}"#).expect("legacy");
        upsert(&mut entries, "K".into(), "new".into(), at(200));
        assert_eq!(entries["K"].value, "new");
        assert_eq!(entries["K"].created_at, None);
    }
}
