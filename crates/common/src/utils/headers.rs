use http::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;

/// Convert HTTP headers to the wire format
///
/// Names are emitted in canonical form (`Content-Type`) because the gateway
/// looks them up by exact key. Multiple values per header are preserved.
pub fn headers_to_map(headers: &HeaderMap) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();

    for (name, value) in headers.iter() {
        let key = canonical_header_name(name.as_str());
        let val = value.to_str().unwrap_or("").to_string();

        map.entry(key).or_default().push(val);
    }

    map
}

/// Convert wire headers to an HTTP HeaderMap, keeping only names accepted by `keep`
///
/// Invalid names or values are skipped.
pub fn map_to_headers(map: &HashMap<String, Vec<String>>, keep: fn(&str) -> bool) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, values) in map.iter() {
        if !keep(name) {
            continue;
        }
        if let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) {
            for value in values {
                if let Ok(header_value) = HeaderValue::from_str(value) {
                    headers.append(header_name.clone(), header_value);
                }
            }
        }
    }

    headers
}

/// Headers forwarded to a local HTTP call
///
/// `Host` is replaced by the relay. Framing headers describe the public hop and
/// are recomputed for the local body.
pub fn relay_header_filter(name: &str) -> bool {
    !(name.eq_ignore_ascii_case("host")
        || name.eq_ignore_ascii_case("content-length")
        || name.eq_ignore_ascii_case("transfer-encoding"))
}

/// Headers forwarded to a local WebSocket handshake
///
/// Connection-establishment headers belong to the new handshake.
pub fn websocket_header_filter(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    !(lower == "upgrade"
        || lower == "connection"
        || lower == "host"
        || lower.starts_with("sec-websocket-"))
}

/// Canonical MIME header form: first letter and letters after '-' upper case
///
/// Names containing characters outside the token set are returned unchanged.
pub fn canonical_header_name(name: &str) -> String {
    if !name.bytes().all(is_token_byte) {
        return name.to_string();
    }

    let mut upper = true;
    name.chars()
        .map(|c| {
            let mapped = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            mapped
        })
        .collect()
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
