//! Deserializers for loosely typed request input.
//!
//! Query strings and form bodies only carry strings, JSON bodies carry real
//! numbers and arrays; both arrive through the same DTOs.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

/// Number or numeric string. Blank or unparsable input becomes `None`.
pub fn opt_parse<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_text).and_then(|s| s.parse().ok()))
}

/// Like [`opt_parse`] but rejects present-yet-unparsable input, for fields
/// where a silent default would hide a client bug (ratings, prices).
pub fn opt_strict<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value.as_ref().and_then(scalar_text) {
        None => Ok(None),
        Some(text) => text
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid number '{}'", text))),
    }
}

/// Trimmed string; numbers are accepted as their text, blank becomes `None`.
pub fn opt_trimmed<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_text))
}

/// List input: a JSON array, a JSON array encoded in a string, a
/// comma-separated string, or repeated `key[]` fields. An explicit empty
/// array stays `Some(vec![])`; absent or blank input is `None`.
pub fn opt_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(list_from_value))
}

/// List of integer ids in any of the shapes [`opt_list`] accepts.
pub fn opt_id_list<'de, D>(deserializer: D) -> Result<Option<Vec<i32>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(items) = opt_list(deserializer)? else {
        return Ok(None);
    };
    items
        .iter()
        .map(|item| {
            item.parse()
                .map_err(|_| serde::de::Error::custom(format!("invalid id '{}'", item)))
        })
        .collect::<Result<Vec<i32>, _>>()
        .map(Some)
}

/// JSON object, or a JSON object encoded in a string.
pub fn opt_object<'de, D>(
    deserializer: D,
) -> Result<Option<serde_json::Map<String, Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(Value::String(raw)) if raw.trim().is_empty() => Ok(None),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            _ => Err(serde::de::Error::custom("expected a JSON object")),
        },
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(serde::de::Error::custom("expected a JSON object")),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn list_from_value(value: Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(items.iter().filter_map(scalar_text).collect()),
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return None;
            }
            if trimmed.starts_with('[') {
                if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
                    return Some(items.iter().filter_map(scalar_text).collect());
                }
            }
            Some(
                trimmed
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            )
        }
        Value::Number(n) => Some(vec![n.to_string()]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize, Debug)]
    struct Probe {
        #[serde(default, deserialize_with = "opt_parse")]
        page: Option<u64>,
        #[serde(default, deserialize_with = "opt_strict")]
        rating: Option<i32>,
        #[serde(default, deserialize_with = "opt_trimmed")]
        title: Option<String>,
        #[serde(default, deserialize_with = "opt_list")]
        tags: Option<Vec<String>>,
        #[serde(default, deserialize_with = "opt_id_list")]
        ids: Option<Vec<i32>>,
        #[serde(default, deserialize_with = "opt_object")]
        specs: Option<serde_json::Map<String, Value>>,
    }

    fn probe(v: Value) -> Probe {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn numbers_from_strings_and_numbers() {
        assert_eq!(probe(json!({"page": "3"})).page, Some(3));
        assert_eq!(probe(json!({"page": 4})).page, Some(4));
        assert_eq!(probe(json!({"page": "abc"})).page, None);
        assert_eq!(probe(json!({})).page, None);
    }

    #[test]
    fn strict_numbers_reject_garbage() {
        assert!(serde_json::from_value::<Probe>(json!({"rating": "five"})).is_err());
        assert_eq!(probe(json!({"rating": "5"})).rating, Some(5));
    }

    #[test]
    fn text_is_trimmed_and_blank_is_absent() {
        assert_eq!(probe(json!({"title": "  T "})).title.as_deref(), Some("T"));
        assert_eq!(probe(json!({"title": "   "})).title, None);
    }

    #[test]
    fn list_shapes() {
        assert_eq!(
            probe(json!({"tags": ["a", "b"]})).tags,
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            probe(json!({"tags": "[\"a\",\"b\"]"})).tags,
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            probe(json!({"tags": "a, b"})).tags,
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn empty_array_is_kept_distinct_from_absent() {
        assert_eq!(probe(json!({"tags": []})).tags, Some(vec![]));
        assert_eq!(probe(json!({})).tags, None);
        assert_eq!(probe(json!({"tags": ""})).tags, None);
    }

    #[test]
    fn id_lists() {
        assert_eq!(probe(json!({"ids": [1, "2", 3]})).ids, Some(vec![1, 2, 3]));
        assert!(serde_json::from_value::<Probe>(json!({"ids": ["x"]})).is_err());
    }

    #[test]
    fn objects_from_json_or_string() {
        assert!(probe(json!({"specs": {"ram": "8GB"}})).specs.is_some());
        assert!(probe(json!({"specs": "{\"ram\":\"8GB\"}"})).specs.is_some());
        assert!(serde_json::from_value::<Probe>(json!({"specs": "[1]"})).is_err());
    }
}
