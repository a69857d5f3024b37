//! Line-oriented text writer with four-space indentation.

const INDENT: &str = "    ";

#[derive(Debug, Default)]
pub struct IndentedWriter {
    out: String,
    level: usize,
}

impl IndentedWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn indent(&mut self) {
        self.level += 1;
    }

    pub fn outdent(&mut self) {
        self.level = self.level.saturating_sub(1);
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.level {
                self.out.push_str(INDENT);
            }
            self.out.push_str(text);
        }
        self.out.push('\n');
    }

    /// Empty line; never carries indentation.
    pub fn blank_line(&mut self) {
        self.out.push('\n');
    }

    /// A `/** ... */` block, one ` * ` line per entry.
    pub fn doc_block<S: AsRef<str>>(&mut self, lines: &[S]) {
        self.line("/**");
        for line in lines {
            self.line(format!(" * {}", escape_doc(line.as_ref())));
        }
        self.line(" */");
    }

    pub fn finish(self) -> String {
        self.out
    }
}

/// JSON string literal for documentation text.
pub fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text))
}

fn escape_doc(text: &str) -> String {
    text.replace("*/", "*\\/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_lines_and_doc_blocks() {
        let mut writer = IndentedWriter::new();
        writer.line("declare namespace a {");
        writer.indent();
        writer.doc_block(&["Task glide record."]);
        writer.line("export type task = GlideRecord;");
        writer.blank_line();
        writer.outdent();
        writer.outdent();
        writer.line("}");
        assert_eq!(
            writer.finish(),
            "declare namespace a {\n    /**\n     * Task glide record.\n     */\n    export type task = GlideRecord;\n\n}\n"
        );
    }

    #[test]
    fn quoting_escapes_like_json() {
        assert_eq!(quote("Short \"desc\""), r#""Short \"desc\"""#);
        assert_eq!(quote("a\\b"), r#""a\\b""#);
    }

    #[test]
    fn comment_terminators_cannot_escape_doc_blocks() {
        let mut writer = IndentedWriter::new();
        writer.doc_block(&["ends */ early"]);
        assert!(writer.finish().contains(" * ends *\\/ early\n"));
    }
}
