//! Parses an Apache-style `mime.types` file: one mime type per line,
//! followed by whitespace-separated extensions it applies to. Blank lines
//! and `#`-comments are ignored, mirroring the format `--mime-types` expects.

use std::collections::HashMap;

/// Extension (without the leading dot) -> mime type.
pub fn parse(contents: &str) -> HashMap<String, String> {
    let mut table = HashMap::new();
    for line in contents.lines() {
        let line = match line.find('#') {
            Some(idx) => &line[..idx],
            None => line,
        };
        let mut fields = line.split_whitespace();
        let mime_type = match fields.next() {
            Some(t) => t,
            None => continue,
        };
        for ext in fields {
            table.insert(ext.to_ascii_lowercase(), mime_type.to_string());
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_extensions_and_skips_comments() {
        let table = parse(
            "# a comment\n\
             text/plain txt text\n\
             \n\
             image/png png\n",
        );
        assert_eq!(table.get("txt"), Some(&"text/plain".to_string()));
        assert_eq!(table.get("text"), Some(&"text/plain".to_string()));
        assert_eq!(table.get("png"), Some(&"image/png".to_string()));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn ignores_blank_and_comment_only_lines() {
        let table = parse("# nothing here\n\n   \n");
        assert!(table.is_empty());
    }
}
