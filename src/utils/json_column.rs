//! TEXT columns holding JSON. `None` maps to SQL NULL and `Some(vec![])`
//! to `"[]"`; the two never collapse into each other.

use serde_json::{Map, Value};

pub fn encode_list(list: Option<&[String]>) -> Option<String> {
    list.and_then(|items| serde_json::to_string(items).ok())
}

pub fn decode_list(raw: Option<&str>) -> Option<Vec<String>> {
    let raw = raw?;
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(items) => Some(items),
        Err(err) => {
            tracing::warn!("Malformed JSON list column '{}': {}", raw, err);
            None
        }
    }
}

pub fn encode_object(object: Option<&Map<String, Value>>) -> Option<String> {
    object.and_then(|map| serde_json::to_string(map).ok())
}

pub fn decode_object(raw: Option<&str>) -> Option<Map<String, Value>> {
    let raw = raw?;
    match serde_json::from_str::<Map<String, Value>>(raw) {
        Ok(map) => Some(map),
        Err(err) => {
            tracing::warn!("Malformed JSON object column '{}': {}", raw, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_and_empty_stay_distinct() {
        assert_eq!(encode_list(None), None);
        assert_eq!(encode_list(Some(&[])).as_deref(), Some("[]"));
        assert_eq!(decode_list(None), None);
        assert_eq!(decode_list(Some("[]")), Some(vec![]));
    }

    #[test]
    fn order_is_preserved() {
        let media = vec!["/uploads/posts/b.png".to_string(), "/uploads/posts/a.png".to_string()];
        let raw = encode_list(Some(&media));
        assert_eq!(decode_list(raw.as_deref()), Some(media));
    }

    #[test]
    fn malformed_list_decodes_to_none() {
        assert_eq!(decode_list(Some("not json")), None);
    }

    #[test]
    fn objects() {
        let raw = r#"{"ram":"8GB","cores":4}"#;
        let map = decode_object(Some(raw)).unwrap();
        assert_eq!(map["cores"], 4);
        assert_eq!(decode_object(encode_object(Some(&map)).as_deref()), Some(map));
        assert_eq!(encode_object(None), None);
    }
}
