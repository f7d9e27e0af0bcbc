use std::iter;

const INDENT: &str = "    ";

/// Text of one C translation unit under construction.
///
/// Tracks brace depth for indentation and numbers the helper locals that
/// lowering introduces (`_iter0`, `_idx1`, ...), which never collide with
/// `_vs_`/`_tmp` names derived from variable ids.
#[derive(Default)]
pub struct CEmitter {
    out: String,
    depth: usize,
    next_local: usize,
}

impl CEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw text, written as is.
    pub fn emit(&mut self, text: &str) {
        self.out.push_str(text);
    }

    pub fn emit_line(&mut self, line: &str) {
        self.out.extend(iter::repeat(INDENT).take(self.depth));
        self.out.push_str(line);
        self.out.push('\n');
    }

    /// Lines produced away from the emitter, such as release sequences.
    /// A line ending in `{` opens a level; one starting with `}` closes it.
    pub fn emit_lines(&mut self, lines: &[String]) {
        for line in lines {
            if line.starts_with('}') {
                self.dedent();
            }
            self.emit_line(line);
            if line.ends_with('{') {
                self.indent();
            }
        }
    }

    /// `header` is expected to end in `{`.
    pub fn open(&mut self, header: &str) {
        self.emit_line(header);
        self.indent();
    }

    pub fn close(&mut self) {
        self.dedent();
        self.emit_line("}");
    }

    pub fn comment(&mut self, text: &str) {
        self.emit_line(&format!("/* {text} */"));
    }

    pub fn blank_line(&mut self) {
        self.out.push('\n');
    }

    pub fn indent(&mut self) {
        self.depth += 1;
    }

    pub fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn fresh_temp(&mut self, prefix: &str) -> String {
        let n = self.next_local;
        self.next_local += 1;
        format!("{prefix}{n}")
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn blocks_indent_their_body() {
        let mut e = CEmitter::new();
        e.open("while (1) {");
        e.emit_line("break;");
        e.close();
        e.emit_line("return 0;");
        assert_eq!(e.finish(), "while (1) {\n    break;\n}\nreturn 0;\n");
    }

    #[test]
    fn emitted_lines_track_braces() {
        let mut e = CEmitter::new();
        e.emit_lines(&[
            "if (p != NULL) {".to_string(),
            "free(p);".to_string(),
            "}".to_string(),
        ]);
        e.comment("after");
        assert_eq!(e.finish(), "if (p != NULL) {\n    free(p);\n}\n/* after */\n");
    }

    #[test]
    fn helper_locals_share_one_counter() {
        let mut e = CEmitter::new();
        assert_eq!(e.fresh_temp("_iter"), "_iter0");
        assert_eq!(e.fresh_temp("_idx"), "_idx1");
    }

    #[test]
    fn dedent_stops_at_column_zero() {
        let mut e = CEmitter::new();
        e.dedent();
        e.emit_line("x;");
        assert_eq!(e.finish(), "x;\n");
    }
}
