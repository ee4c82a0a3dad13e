//! Shard reply decoding
//!
//! Replies are JSON documents carrying an `ok` field. A falsy `ok` means the
//! shard reported a structured error (`code`, `codeName`, `errmsg`).

use crate::chunk::Document;
use crate::command::CommandKind;
use crate::error::{BalancerError, Result};
use serde_json::Value;

/// Kind-specific result of a successful command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandPayload {
    /// moveChunk, mergeChunks and splitChunk carry nothing
    Empty,
    /// splitVector: the computed split points
    SplitKeys(Vec<Document>),
    /// dataSize: bytes and document count of the range
    DataSize { size: u64, num_objects: u64 },
}

/// `ok` is sent as a bool, a number or a numeric string depending on the shard version
fn is_ok(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        Some(Value::String(s)) => s == "1" || s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn field_u64(reply: &Document, field: &str) -> Result<u64> {
    let value = reply
        .get(field)
        .ok_or_else(|| BalancerError::MalformedReply(format!("missing field {field}")))?;

    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|v| *v >= 0.0 && v.fract() == 0.0 && *v <= u64::MAX as f64)
                .map(|v| v as u64)
        })
        .ok_or_else(|| BalancerError::MalformedReply(format!("field {field} is not a count")))
}

/// Error codes arrive as integers or as integral doubles
fn error_code(value: Option<&Value>) -> i64 {
    value
        .and_then(|v| {
            v.as_i64().or_else(|| {
                v.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() <= i64::MAX as f64)
                    .map(|f| f as i64)
            })
        })
        .unwrap_or(0)
}

/// Decode a shard reply into the payload expected for `kind`
pub fn decode_reply(kind: CommandKind, raw: &[u8]) -> Result<CommandPayload> {
    let reply: Document = serde_json::from_slice(raw)
        .map_err(|e| BalancerError::MalformedReply(e.to_string()))?;

    if !is_ok(reply.get("ok")) {
        return Err(BalancerError::RemoteCommand {
            code: error_code(reply.get("code")),
            code_name: reply
                .get("codeName")
                .and_then(Value::as_str)
                .unwrap_or("UnknownError")
                .to_string(),
            message: reply
                .get("errmsg")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }

    match kind {
        CommandKind::MoveChunk | CommandKind::MergeChunk | CommandKind::SplitChunk => {
            Ok(CommandPayload::Empty)
        }
        CommandKind::SplitVector => {
            let keys = reply
                .get("splitKeys")
                .and_then(Value::as_array)
                .ok_or_else(|| BalancerError::MalformedReply("missing splitKeys".to_string()))?;

            let split_keys = keys
                .iter()
                .map(|key| {
                    key.as_object().cloned().ok_or_else(|| {
                        BalancerError::MalformedReply("split key is not a document".to_string())
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(CommandPayload::SplitKeys(split_keys))
        }
        CommandKind::DataSize => Ok(CommandPayload::DataSize {
            size: field_u64(&reply, "size")?,
            num_objects: field_u64(&reply, "numObjects")?,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::key_doc;
    use crate::error::ErrorKind;

    #[test]
    fn test_ok_variants() {
        for raw in [
            r#"{"ok": true}"#,
            r#"{"ok": 1}"#,
            r#"{"ok": 1.0}"#,
            r#"{"ok": "1"}"#,
        ] {
            assert_eq!(
                decode_reply(CommandKind::MoveChunk, raw.as_bytes()).unwrap(),
                CommandPayload::Empty
            );
        }
    }

    #[test]
    fn test_split_vector_reply() {
        let raw = br#"{"ok": "1", "splitKeys": [{"x": 5}]}"#;
        let payload = decode_reply(CommandKind::SplitVector, raw).unwrap();
        assert_eq!(payload, CommandPayload::SplitKeys(vec![key_doc("x", 5)]));
    }

    #[test]
    fn test_data_size_reply() {
        let raw = br#"{"ok": "1", "size": 156, "numObjects": 25}"#;
        let payload = decode_reply(CommandKind::DataSize, raw).unwrap();
        assert_eq!(
            payload,
            CommandPayload::DataSize {
                size: 156,
                num_objects: 25
            }
        );
    }

    #[test]
    fn test_split_keys_keep_field_order() {
        let raw = br#"{"ok": 1, "splitKeys": [{"b": 5, "a": 1}]}"#;
        let payload = decode_reply(CommandKind::SplitVector, raw).unwrap();

        let keys = match payload {
            CommandPayload::SplitKeys(keys) => keys,
            other => panic!("expected split keys, got {other:?}"),
        };
        let fields: Vec<_> = keys[0].keys().map(String::as_str).collect();
        assert_eq!(fields, vec!["b", "a"]);
    }

    #[test]
    fn test_fractional_count_is_malformed() {
        let raw = br#"{"ok": 1, "size": 156.7, "numObjects": 25}"#;
        let err = decode_reply(CommandKind::DataSize, raw).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedReply);

        // Integral doubles are still counts
        let raw = br#"{"ok": 1, "size": 156.0, "numObjects": 25}"#;
        assert_eq!(
            decode_reply(CommandKind::DataSize, raw).unwrap(),
            CommandPayload::DataSize {
                size: 156,
                num_objects: 25
            }
        );
    }

    #[test]
    fn test_error_code_sent_as_double() {
        let raw = concat!(
            r#"{"ok": 0.0, "code": 11600.0, "#,
            r#""codeName": "InterruptedAtShutdown", "errmsg": "interrupted"}"#
        );
        match decode_reply(CommandKind::MoveChunk, raw.as_bytes()).unwrap_err() {
            BalancerError::RemoteCommand { code, .. } => assert_eq!(code, 11600),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_structured_error_reply() {
        let raw = concat!(
            r#"{"ok": 0, "code": 117, "codeName": "ConflictingOperationInProgress", "#,
            r#""errmsg": "migration already running"}"#
        );
        let err = decode_reply(CommandKind::MoveChunk, raw.as_bytes()).unwrap_err();
        assert_eq!(
            err,
            BalancerError::RemoteCommand {
                code: 117,
                code_name: "ConflictingOperationInProgress".to_string(),
                message: "migration already running".to_string(),
            }
        );
    }

    #[test]
    fn test_malformed_replies() {
        let err = decode_reply(CommandKind::MoveChunk, b"garbage").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedReply);

        let err = decode_reply(CommandKind::SplitVector, br#"{"ok": 1}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedReply);

        let err = decode_reply(CommandKind::DataSize, br#"{"ok": 1, "size": 3}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedReply);
    }

    #[test]
    fn test_missing_ok_is_failure() {
        let err = decode_reply(CommandKind::MergeChunk, br#"{}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteCommand);
    }
}
