//! Raw change records and normalized change events.
//!
//! A [`RawChange`] is the wire-shaped record a change source delivers: the
//! event kind is still a string and the before/after rows may be missing or
//! inconsistent. [`ChangeEvent::from_raw`] normalizes a raw record into a
//! [`ChangeEvent`], enforcing the kind/state rules; records that fail
//! normalization are dropped by the binding, one at a time.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::event::ChangeType;

/// A row as delivered by the upstream store: an opaque JSON object.
pub type Row = serde_json::Map<String, Value>;

/// A raw change record as delivered by the upstream transport.
///
/// Each upstream notification produces exactly one raw record; the
/// multiplexer never buffers or coalesces them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    /// Wire spelling of the event kind ("INSERT", "UPDATE", "DELETE").
    pub event: String,
    /// The table the change occurred on.
    pub table: String,
    /// Row state before the change, if the store provided it.
    pub before: Option<Row>,
    /// Row state after the change, if the store provided it.
    pub after: Option<Row>,
}

impl RawChange {
    /// Create a raw insert record.
    pub fn insert(table: impl Into<String>, after: Row) -> Self {
        Self {
            event: ChangeType::Insert.as_wire().to_string(),
            table: table.into(),
            before: None,
            after: Some(after),
        }
    }

    /// Create a raw update record.
    pub fn update(table: impl Into<String>, before: Option<Row>, after: Row) -> Self {
        Self {
            event: ChangeType::Update.as_wire().to_string(),
            table: table.into(),
            before,
            after: Some(after),
        }
    }

    /// Create a raw delete record.
    pub fn delete(table: impl Into<String>, before: Row) -> Self {
        Self {
            event: ChangeType::Delete.as_wire().to_string(),
            table: table.into(),
            before: Some(before),
            after: None,
        }
    }
}

/// A normalized change event delivered to consumers.
///
/// `before` is `None` on insert; `after` is `None` on delete. Events are
/// created once per upstream notification and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent<T = Row> {
    /// The kind of change.
    pub change_type: ChangeType,
    /// The table the change occurred on.
    pub table: String,
    /// Row state before the change.
    pub before: Option<T>,
    /// Row state after the change.
    pub after: Option<T>,
}

impl ChangeEvent<Row> {
    /// Normalize a raw record into a change event.
    ///
    /// Rules: the event kind must parse to a concrete [`ChangeType`]; an
    /// insert must carry `after` (any stray `before` is discarded); a delete
    /// must carry `before` (any stray `after` is discarded); an update must
    /// carry `after`, while `before` is optional because many stores only
    /// ship the old row when replica identity is configured for it.
    pub fn from_raw(raw: RawChange) -> Result<Self, Error> {
        let change_type: ChangeType = raw.event.parse()?;

        let (before, after) = match change_type {
            ChangeType::Insert => {
                let after = raw.after.ok_or(Error::MissingRowState {
                    kind: change_type,
                    field: "after",
                })?;
                (None, Some(after))
            }
            ChangeType::Update => {
                let after = raw.after.ok_or(Error::MissingRowState {
                    kind: change_type,
                    field: "after",
                })?;
                (raw.before, Some(after))
            }
            ChangeType::Delete => {
                let before = raw.before.ok_or(Error::MissingRowState {
                    kind: change_type,
                    field: "before",
                })?;
                (Some(before), None)
            }
        };

        Ok(Self {
            change_type,
            table: raw.table,
            before,
            after,
        })
    }

    /// Decode the row states into a concrete type.
    pub fn typed<T: DeserializeOwned>(self) -> Result<ChangeEvent<T>, Error> {
        let decode = |row: Row| {
            serde_json::from_value(Value::Object(row))
                .map_err(|e| Error::Deserialization(e.to_string()))
        };

        Ok(ChangeEvent {
            change_type: self.change_type,
            table: self.table,
            before: self.before.map(decode).transpose()?,
            after: self.after.map(decode).transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_normalize_insert() {
        let raw = RawChange::insert("messages", row(&[("id", json!(1))]));
        let event = ChangeEvent::from_raw(raw).unwrap();

        assert_eq!(event.change_type, ChangeType::Insert);
        assert_eq!(event.table, "messages");
        assert!(event.before.is_none());
        assert_eq!(event.after.unwrap()["id"], json!(1));
    }

    #[test]
    fn test_normalize_insert_discards_stray_before() {
        let raw = RawChange {
            event: "INSERT".into(),
            table: "messages".into(),
            before: Some(row(&[("id", json!(0))])),
            after: Some(row(&[("id", json!(1))])),
        };
        let event = ChangeEvent::from_raw(raw).unwrap();
        assert!(event.before.is_none());
    }

    #[test]
    fn test_normalize_insert_missing_after() {
        let raw = RawChange {
            event: "INSERT".into(),
            table: "messages".into(),
            before: None,
            after: None,
        };
        let err = ChangeEvent::from_raw(raw).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingRowState {
                kind: ChangeType::Insert,
                field: "after"
            }
        ));
    }

    #[test]
    fn test_normalize_update() {
        let raw = RawChange::update(
            "messages",
            Some(row(&[("id", json!(1)), ("body", json!("old"))])),
            row(&[("id", json!(1)), ("body", json!("new"))]),
        );
        let event = ChangeEvent::from_raw(raw).unwrap();

        assert_eq!(event.change_type, ChangeType::Update);
        assert_eq!(event.before.unwrap()["body"], json!("old"));
        assert_eq!(event.after.unwrap()["body"], json!("new"));
    }

    #[test]
    fn test_normalize_update_without_before() {
        let raw = RawChange::update("messages", None, row(&[("id", json!(1))]));
        let event = ChangeEvent::from_raw(raw).unwrap();
        assert!(event.before.is_none());
        assert!(event.after.is_some());
    }

    #[test]
    fn test_normalize_delete() {
        let raw = RawChange::delete("messages", row(&[("id", json!(9))]));
        let event = ChangeEvent::from_raw(raw).unwrap();

        assert_eq!(event.change_type, ChangeType::Delete);
        assert_eq!(event.before.unwrap()["id"], json!(9));
        assert!(event.after.is_none());
    }

    #[test]
    fn test_normalize_delete_missing_before() {
        let raw = RawChange {
            event: "DELETE".into(),
            table: "messages".into(),
            before: None,
            after: None,
        };
        let err = ChangeEvent::from_raw(raw).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingRowState {
                kind: ChangeType::Delete,
                field: "before"
            }
        ));
    }

    #[test]
    fn test_normalize_unknown_kind() {
        let raw = RawChange {
            event: "VACUUM".into(),
            table: "messages".into(),
            before: None,
            after: None,
        };
        assert!(matches!(
            ChangeEvent::from_raw(raw),
            Err(Error::UnknownEventKind(_))
        ));
    }

    #[test]
    fn test_normalize_wildcard_kind() {
        let raw = RawChange {
            event: "*".into(),
            table: "messages".into(),
            before: None,
            after: Some(Row::new()),
        };
        assert!(matches!(
            ChangeEvent::from_raw(raw),
            Err(Error::WildcardEvent)
        ));
    }

    #[test]
    fn test_typed_decode() {
        #[derive(Debug, PartialEq, Deserialize)]
        struct Message {
            id: u64,
            body: String,
        }

        let raw = RawChange::insert(
            "messages",
            row(&[("id", json!(3)), ("body", json!("hello"))]),
        );
        let event = ChangeEvent::from_raw(raw).unwrap().typed::<Message>().unwrap();

        assert_eq!(
            event.after,
            Some(Message {
                id: 3,
                body: "hello".into()
            })
        );
        assert_eq!(event.before, None);
    }

    #[test]
    fn test_typed_decode_mismatch() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Message {
            id: u64,
        }

        let raw = RawChange::insert("messages", row(&[("id", json!("not-a-number"))]));
        let result = ChangeEvent::from_raw(raw).unwrap().typed::<Message>();
        assert!(matches!(result, Err(Error::Deserialization(_))));
    }
}
