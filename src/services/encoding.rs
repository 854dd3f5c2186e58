use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use serde::Serialize;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct EncodingGuess {
    pub name: String,
    pub confidence: f32,
}

/// Best guess for a byte buffer; UTF-8 BOM wins outright.
pub fn detect(bytes: &[u8]) -> (&'static Encoding, EncodingGuess) {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return (
            UTF_8,
            EncodingGuess {
                name: "utf-8-sig".into(),
                confidence: 0.99,
            },
        );
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);

    (
        encoding,
        EncodingGuess {
            name: encoding.name().to_lowercase(),
            confidence: estimate_confidence(bytes, encoding),
        },
    )
}

/// Python source text: UTF-8 first (BOM stripped), detected charset otherwise.
pub fn decode_source(bytes: &[u8]) -> Result<String, String> {
    let body = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(body) {
        return Ok(text.to_string());
    }

    let (encoding, guess) = detect(bytes);
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(format!(
            "undecodable source (best guess {}, confidence {:.2})",
            guess.name, guess.confidence
        ));
    }
    tracing::debug!(encoding = %guess.name, confidence = guess.confidence, "decoded non-UTF-8 source");
    Ok(text.into_owned())
}

fn estimate_confidence(bytes: &[u8], encoding: &'static Encoding) -> f32 {
    let (text, _, had_errors) = encoding.decode(bytes);

    if had_errors {
        return 0.35;
    }

    let len = text.len();
    if len < 64 {
        0.55
    } else if len < 512 {
        0.70
    } else if len < 4096 {
        0.82
    } else {
        0.90
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_utf8_bom() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("x = '种子'".as_bytes());
        assert_eq!(decode_source(&bytes).unwrap(), "x = '种子'");
        assert_eq!(detect(&bytes).1.name, "utf-8-sig");
    }

    #[test]
    fn decodes_detected_legacy_charset() {
        let (bytes, _, _) = encoding_rs::GBK.encode("# 这是一个用于检测编码的中文注释，内容足够长\nx = 1\n");
        assert!(std::str::from_utf8(&bytes).is_err());
        let text = decode_source(&bytes).unwrap();
        assert!(text.ends_with("x = 1\n"));
    }
}
