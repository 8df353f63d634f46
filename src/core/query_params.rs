use std::collections::HashMap;

use spin_sdk::http::Request;

/// Parse query parameters from a URI string
///
/// Handles URL decoding and returns a HashMap of parameter key-value pairs.
/// Multiple values for the same key are not supported (only the last is kept).
///
/// # Example
/// ```
/// use pinboard::core::query_params::parse_query_params;
///
/// let params = parse_query_params("/accounts/users/?page=2&next=%2Fpins%2F");
/// assert_eq!(params.get("page"), Some(&"2".to_string()));
/// assert_eq!(params.get("next"), Some(&"/pins/".to_string()));
/// ```
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    match uri.find('?') {
        Some(query_start) => parse_urlencoded(&uri[query_start + 1..]),
        None => HashMap::new(),
    }
}

/// Decode an `application/x-www-form-urlencoded` string.
pub fn parse_urlencoded(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for param in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = match param.find('=') {
            Some(eq_idx) => (&param[..eq_idx], &param[eq_idx + 1..]),
            // Flag parameter without value
            None => (param, ""),
        };
        params.insert(decode_component(key), decode_component(value));
    }

    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Read a submitted form from either a urlencoded or a JSON object body.
///
/// JSON strings are kept as-is, numbers and booleans are stringified and
/// arrays of strings are joined with commas.
pub fn parse_form(req: &Request) -> HashMap<String, String> {
    let content_type = req
        .header("content-type")
        .and_then(|h| h.as_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("application/json") {
        let value: serde_json::Value = match serde_json::from_slice(req.body()) {
            Ok(v) => v,
            Err(_) => return HashMap::new(),
        };
        let Some(object) = value.as_object() else {
            return HashMap::new();
        };
        return object
            .iter()
            .filter_map(|(key, value)| json_field(value).map(|v| (key.clone(), v)))
            .collect();
    }

    parse_urlencoded(&String::from_utf8_lossy(req.body()))
}

fn json_field(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(","),
        ),
        _ => None,
    }
}

/// Get a trimmed, non-empty string field
pub fn get_string(params: &HashMap<String, String>, key: &str) -> Option<String> {
    params
        .get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
