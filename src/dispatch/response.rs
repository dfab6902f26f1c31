use crate::{
    error::ErrorKind,
    models::{GenerationFailure, GenerationResult},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::Value;

const REFERENCE_KEYS: [&str; 4] = ["video_url", "image_url", "url", "output"];
const INLINE_KEYS: [&str; 3] = ["b64_json", "image", "video"];

/// Turns the body of a 200 response into a result. The body is either raw
/// media or a JSON envelope pointing at (or embedding) the media.
pub fn classify_success(bytes: Vec<u8>, content_type: Option<&str>, endpoint: &str) -> GenerationResult {
    let essence = content_type
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase());

    if bytes.is_empty() {
        return malformed("empty response body", endpoint);
    }

    match essence.as_deref() {
        Some(ct) if ct.starts_with("video/") || ct.starts_with("image/") => {
            GenerationResult::MediaBytes {
                bytes,
                mime: ct.to_string(),
                endpoint: endpoint.to_string(),
            }
        }
        Some(ct) if ct == "application/json" || ct.ends_with("+json") => {
            let value: Value = match serde_json::from_slice(&bytes) {
                Ok(value) => value,
                Err(e) => return malformed(&format!("invalid JSON body: {}", e), endpoint),
            };
            if let Some(url) = extract_reference(&value) {
                return GenerationResult::MediaReference {
                    url,
                    endpoint: endpoint.to_string(),
                };
            }
            if let Some(media) = extract_inline(&value) {
                let mime = sniff_media(&media).unwrap_or("application/octet-stream");
                return GenerationResult::MediaBytes {
                    bytes: media,
                    mime: mime.to_string(),
                    endpoint: endpoint.to_string(),
                };
            }
            malformed("JSON body has no media reference or inline media", endpoint)
        }
        None | Some("application/octet-stream") | Some("binary/octet-stream") => {
            match sniff_media(&bytes) {
                Some(mime) => GenerationResult::MediaBytes {
                    bytes,
                    mime: mime.to_string(),
                    endpoint: endpoint.to_string(),
                },
                None => malformed("binary body is not recognisable media", endpoint),
            }
        }
        Some(other) => malformed(&format!("unexpected content type '{}'", other), endpoint),
    }
}

fn malformed(message: &str, endpoint: &str) -> GenerationResult {
    GenerationResult::Failure(
        GenerationFailure::new(ErrorKind::MalformedResponse, message)
            .with_status(200)
            .with_endpoint(endpoint),
    )
}

fn as_http_url(value: &Value) -> Option<String> {
    let text = value.as_str()?.trim();
    (text.starts_with("https://") || text.starts_with("http://")).then(|| text.to_string())
}

pub fn extract_reference(value: &Value) -> Option<String> {
    for key in REFERENCE_KEYS {
        match value.get(key) {
            Some(Value::Array(items)) => {
                if let Some(url) = items.first().and_then(as_http_url) {
                    return Some(url);
                }
            }
            Some(other) => {
                if let Some(url) = as_http_url(other) {
                    return Some(url);
                }
            }
            None => {}
        }
    }

    // OpenAI images: {"data": [{"url": "..."}]}
    value
        .get("data")
        .and_then(|data| data.get(0))
        .and_then(|first| first.get("url"))
        .and_then(as_http_url)
}

pub fn extract_inline(value: &Value) -> Option<Vec<u8>> {
    let first = value.get("data").and_then(|data| data.get(0));
    let candidates = INLINE_KEYS
        .iter()
        .filter_map(|key| first.and_then(|f| f.get(*key)).or_else(|| value.get(*key)));

    for candidate in candidates {
        let Some(text) = candidate.as_str() else {
            continue;
        };
        // tolerate data URLs
        let payload = text.split_once("base64,").map(|(_, b64)| b64).unwrap_or(text);
        if let Ok(bytes) = BASE64.decode(payload.trim()) {
            if !bytes.is_empty() {
                return Some(bytes);
            }
        }
    }
    None
}

pub fn sniff_media(bytes: &[u8]) -> Option<&'static str> {
    if let Ok(format) = image::guess_format(bytes) {
        return Some(format.to_mime_type());
    }
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        return Some("video/mp4");
    }
    if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some("video/webm");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MP4_HEADER: &[u8] = b"\x00\x00\x00\x18ftypmp42\x00\x00\x00\x00";

    #[test]
    fn test_media_content_types() {
        let result = classify_success(b"frames".to_vec(), Some("video/mp4"), "e1");
        assert_eq!(
            result,
            GenerationResult::MediaBytes {
                bytes: b"frames".to_vec(),
                mime: "video/mp4".into(),
                endpoint: "e1".into(),
            }
        );
    }

    #[test]
    fn test_json_reference_shapes() {
        for body in [
            json!({"video_url": "https://cdn.example.com/v.mp4"}),
            json!({"output": ["https://cdn.example.com/v.mp4"]}),
            json!({"data": [{"url": "https://cdn.example.com/v.mp4"}]}),
        ] {
            let bytes = serde_json::to_vec(&body).unwrap();
            match classify_success(bytes, Some("application/json; charset=utf-8"), "e") {
                GenerationResult::MediaReference { url, .. } => {
                    assert_eq!(url, "https://cdn.example.com/v.mp4")
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_json_inline_media() {
        let body = json!({"data": [{"b64_json": BASE64.encode(MP4_HEADER)}]});
        match classify_success(serde_json::to_vec(&body).unwrap(), Some("application/json"), "e") {
            GenerationResult::MediaBytes { bytes, mime, .. } => {
                assert_eq!(bytes, MP4_HEADER);
                assert_eq!(mime, "video/mp4");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_octet_stream_is_sniffed() {
        let result = classify_success(MP4_HEADER.to_vec(), None, "e");
        assert!(matches!(result, GenerationResult::MediaBytes { ref mime, .. } if mime == "video/mp4"));
    }

    #[test]
    fn test_malformed_bodies() {
        for (body, ct) in [
            (b"{\"status\": \"queued\"}".to_vec(), Some("application/json")),
            (b"not json".to_vec(), Some("application/json")),
            (b"<html></html>".to_vec(), Some("text/html")),
            (b"random".to_vec(), Some("application/octet-stream")),
            (Vec::new(), Some("video/mp4")),
        ] {
            let result = classify_success(body, ct, "e");
            assert_eq!(result.error_kind(), Some(ErrorKind::MalformedResponse));
        }
    }
}
