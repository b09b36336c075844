//! Decodes author/log-message bytes using the ordered `--encoding` list
//! (§6): each named encoding is tried in turn against the raw bytes, and the
//! first one that decodes without error wins. `ascii` is the implicit final
//! fallback even if the caller's list doesn't end with it (§6: "`ascii`
//! always final fallback"), applied losslessly if the bytes are already
//! ASCII and otherwise by replacing anything outside it.

use encoding_rs::Encoding;

/// Decodes `bytes` against `encodings` in order. An empty list behaves as if
/// `["utf-8"]` had been given, since `ascii` is appended unconditionally
/// below regardless of what the caller passed.
pub fn decode(bytes: &[u8], encodings: &[String]) -> String {
    for name in encodings {
        if name.eq_ignore_ascii_case("ascii") {
            if bytes.is_ascii() {
                return String::from_utf8(bytes.to_vec()).expect("ASCII bytes are valid UTF-8");
            }
            continue;
        }
        if name.eq_ignore_ascii_case("utf-8") || name.eq_ignore_ascii_case("utf8") {
            if let Ok(s) = std::str::from_utf8(bytes) {
                return s.to_string();
            }
            continue;
        }
        if let Some(encoding) = Encoding::for_label(name.as_bytes()) {
            let (decoded, _, had_errors) = encoding.decode(bytes);
            if !had_errors {
                return decoded.into_owned();
            }
        } else {
            log::warn!("--encoding: unknown encoding {:?}, skipping it", name);
        }
    }

    // `ascii` final fallback (§6): any byte outside the ASCII range becomes
    // U+FFFD rather than failing the whole ingest pass over one bad byte.
    bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_through_to_the_encoding_that_actually_decodes() {
        // 0xe9 is "é" in windows-1252, but not valid UTF-8 on its own.
        let windows_1252 = vec![b'c', b'a', b'f', 0xe9];
        let decoded = decode(&windows_1252, &["utf-8".to_string(), "windows-1252".to_string()]);
        assert_eq!(decoded, "caf\u{e9}");
    }

    #[test]
    fn falls_back_to_utf8_when_bytes_are_already_valid() {
        let decoded = decode("héllo".as_bytes(), &["utf-8".to_string()]);
        assert_eq!(decoded, "héllo");
    }

    #[test]
    fn empty_list_still_falls_back_to_lossy_ascii() {
        let decoded = decode(&[0xff, b'a'], &[]);
        assert_eq!(decoded, "\u{FFFD}a");
    }

    #[test]
    fn ascii_entry_rejects_non_ascii_bytes_and_keeps_trying() {
        let decoded = decode(&[0xe9], &["ascii".to_string(), "windows-1252".to_string()]);
        assert_eq!(decoded, "\u{e9}");
    }
}
