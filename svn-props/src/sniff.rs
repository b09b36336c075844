//! The NUL/control-byte heuristic used both by `comma-v`'s callers (to
//! decide whether an RCS file needs `-kb` handling) and by this crate's
//! binary-sniffing rule, exposed once here rather than duplicated.

/// How much of a file's content to sample before giving up and assuming text.
pub const SNIFF_WINDOW: usize = 8000;

/// A rough port of the heuristic most version control tools use: a file is
/// binary if it contains a NUL byte, or if more than 30% of its sampled
/// bytes are non-printable control characters.
pub fn looks_binary(sample: &[u8]) -> bool {
    let window = &sample[..sample.len().min(SNIFF_WINDOW)];
    if window.is_empty() {
        return false;
    }
    if window.contains(&0) {
        return true;
    }

    let control = window
        .iter()
        .filter(|&&b| b < 0x20 && b != b'\t' && b != b'\n' && b != b'\r')
        .count();
    (control as f64 / window.len() as f64) > 0.3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_binary() {
        assert!(!looks_binary(b"hello\nworld\n"));
    }

    #[test]
    fn nul_byte_is_always_binary() {
        assert!(looks_binary(b"hello\0world"));
    }

    #[test]
    fn mostly_control_bytes_is_binary() {
        let sample: Vec<u8> = (0u8..20).collect();
        assert!(looks_binary(&sample));
    }
}
