use base64::{Engine as _, engine::general_purpose::STANDARD};

/// Content-Type substrings that mark a body as safe to ship as text
const TEXT_LIKE_MARKERS: [&str; 5] = ["text", "json", "javascript", "xml", "html"];

/// Encode bytes to Base64 string
pub fn encode_body(body: &[u8]) -> String {
    STANDARD.encode(body)
}

/// Literal substring match, no case folding
pub fn is_text_like(content_type: &str) -> bool {
    TEXT_LIKE_MARKERS
        .iter()
        .any(|marker| content_type.contains(marker))
}

/// A response body ready to be placed in a JSON message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    pub body: String,
    pub base64: bool,
}

/// Encode a local response body for the wire
///
/// Non-empty bodies whose content type is not text-like are Base64 encoded;
/// everything else is passed through as (lossy) UTF-8 text.
pub fn encode_body_for_content_type(content_type: &str, body: &[u8]) -> EncodedBody {
    if !is_text_like(content_type) && !body.is_empty() {
        EncodedBody {
            body: encode_body(body),
            base64: true,
        }
    } else {
        EncodedBody {
            body: String::from_utf8_lossy(body).into_owned(),
            base64: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_empty() {
        let empty: &[u8] = &[];
        assert_eq!(encode_body(empty), "");
    }

    #[test]
    fn test_encode_binary_data() {
        let binary = vec![0x00, 0x01, 0x02, 0xFF, 0xFE];
        assert_eq!(encode_body(&binary), "AAEC//4=");
    }

    #[test]
    fn test_text_like_content_types() {
        for content_type in [
            "text/plain",
            "text/html; charset=utf-8",
            "application/json",
            "application/javascript",
            "application/xml",
            "application/xhtml+xml",
            "application/problem+json",
        ] {
            assert!(is_text_like(content_type), "{} should be text", content_type);
        }
    }

    #[test]
    fn test_binary_content_types() {
        for content_type in ["image/png", "application/octet-stream", "application/pdf", ""] {
            assert!(!is_text_like(content_type), "{} should be binary", content_type);
        }
    }

    #[test]
    fn test_match_is_case_sensitive() {
        assert!(!is_text_like("Application/JSON"));
        assert!(is_text_like("Text/html"));
    }

    #[test]
    fn test_json_is_never_base64() {
        let encoded = encode_body_for_content_type("application/json", br#"{"ok":true}"#);
        assert!(!encoded.base64);
        assert_eq!(encoded.body, r#"{"ok":true}"#);
    }

    #[test]
    fn test_png_is_base64() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        let encoded = encode_body_for_content_type("image/png", &png);
        assert!(encoded.base64);
        assert_eq!(encoded.body, "iVBORw0KGgo=");
    }

    #[test]
    fn test_empty_binary_body_stays_text() {
        let encoded = encode_body_for_content_type("image/png", &[]);
        assert!(!encoded.base64);
        assert_eq!(encoded.body, "");
    }

    #[test]
    fn test_missing_content_type_with_body_is_base64() {
        let encoded = encode_body_for_content_type("", b"hello");
        assert!(encoded.base64);
        assert_eq!(encoded.body, "aGVsbG8=");
    }

    #[test]
    fn test_invalid_utf8_text_is_lossy() {
        let encoded = encode_body_for_content_type("text/plain", &[b'a', 0xFF, b'b']);
        assert!(!encoded.base64);
        assert_eq!(encoded.body, "a\u{FFFD}b");
    }
}
