use serde_json::Value;

use crate::error::SyncError;

/// Parse a raw JSON response body.
pub fn parse_json(body: &[u8]) -> Result<Value, SyncError> {
    serde_json::from_slice(body)
        .map_err(|e| SyncError::PayloadFormat(format!("response is not JSON: {e}")))
}

/// Split a callback invocation script `name(<json>);` into the callback
/// name and its JSON argument.
///
/// Accepts surrounding whitespace, a leading `/**/` guard comment and an
/// optional trailing semicolon. Raw JSON without a wrapper is rejected.
pub fn parse_invocation(body: &[u8]) -> Result<(String, Value), SyncError> {
    let text = std::str::from_utf8(body)
        .map_err(|e| SyncError::PayloadFormat(format!("callback script is not UTF-8: {e}")))?;
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("/**/") {
        text = rest.trim_start();
    }
    let text = text.strip_suffix(';').unwrap_or(text).trim_end();

    let open = text
        .find('(')
        .ok_or_else(|| SyncError::PayloadFormat("callback script has no invocation".into()))?;
    let name = text[..open].trim();
    if !is_callback_name(name) {
        return Err(SyncError::PayloadFormat(format!(
            "invalid callback name: {:?}",
            truncate(name, 64)
        )));
    }
    let args = text[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| SyncError::PayloadFormat("callback script is not closed".into()))?;

    let value = serde_json::from_str(args)
        .map_err(|e| SyncError::PayloadFormat(format!("callback argument is not JSON: {e}")))?;
    Ok((name.to_string(), value))
}

/// Identifier characters plus `.` for namespaced callbacks.
pub fn is_callback_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.'))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_json() {
        assert_eq!(parse_json(br#"{"ok":true}"#).unwrap(), json!({"ok": true}));
        assert!(matches!(
            parse_json(b"<html>blocked</html>"),
            Err(SyncError::PayloadFormat(_))
        ));
    }

    #[test]
    fn invocation_variants() {
        let (name, v) = parse_invocation(br#"cb_1({"ok":true,"rows":[]});"#).unwrap();
        assert_eq!(name, "cb_1");
        assert_eq!(v, json!({"ok": true, "rows": []}));

        let (name, _) = parse_invocation(b"  /**/ ns.cb$2 ( {\"ok\":false} )  \n").unwrap();
        assert_eq!(name, "ns.cb$2");
    }

    #[test]
    fn invocation_rejects_unwrapped_or_broken_scripts() {
        for body in [
            &br#"{"ok":true}"#[..],
            b"cb({\"ok\":true}",
            b"alert(1);cb({})",
            b"1cb({})",
            b"cb(not json)",
            b"\xff\xfe",
        ] {
            assert!(
                matches!(parse_invocation(body), Err(SyncError::PayloadFormat(_))),
                "{:?}",
                String::from_utf8_lossy(body)
            );
        }
    }
}
