//! Dot-separated field paths into JSON documents

use serde_json::Value;

use crate::alerting::ObservedValue;

/// Comparable value at `path`, if there is one
pub fn extract(document: &Value, path: &str) -> Option<ObservedValue> {
    lookup(document, path).and_then(ObservedValue::from_json)
}

/// Raw JSON value at `path`. Numeric segments index arrays; an empty path
/// is the document itself.
pub fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(document);
    }

    path.split('.').try_fold(document, |current, segment| match current {
        Value::Object(fields) => fields.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract() {
        let doc = json!({
            "status": "up",
            "load": {"cpu": 0.75, "procs": 182},
            "disks": [{"used": 93}, {"used": 12}],
            "healthy": true
        });

        assert_eq!(extract(&doc, "status"), Some(ObservedValue::String("up".into())));
        assert_eq!(extract(&doc, "load.cpu"), Some(ObservedValue::Float(0.75)));
        assert_eq!(extract(&doc, "load.procs"), Some(ObservedValue::Int(182)));
        assert_eq!(extract(&doc, "disks.1.used"), Some(ObservedValue::Int(12)));
        assert_eq!(extract(&doc, "disks.x.used"), None);
        assert_eq!(extract(&doc, "disks.5.used"), None);
        assert_eq!(extract(&doc, "load.missing"), None);
        assert_eq!(extract(&doc, "status.deeper"), None);
        assert_eq!(extract(&doc, "healthy"), None);
        assert_eq!(extract(&json!(42), ""), Some(ObservedValue::Int(42)));
    }
}
