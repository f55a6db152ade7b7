use tower_lsp::lsp_types::{Position, Range};

/// A file's live text as the editor sees it, together with the byte
/// offset of every line start. `line_starts[0]` is always 0, every later
/// entry sits immediately after a `'\n'`, and a trailing newline at
/// end-of-file opens no extra line. Line `i` spans
/// `[line_starts[i], line_starts[i + 1])` including its terminator.
#[derive(Debug, Clone, Default)]
pub struct EditedFile {
    content: String,
    line_starts: Vec<usize>,
}

impl EditedFile {
    pub fn new(text: impl Into<String>) -> Self {
        let mut file = EditedFile::default();
        file.set_content(text.into());
        file
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn line_starts(&self) -> &[usize] {
        &self.line_starts
    }

    /// Byte offset of an editor position, via the line-start index.
    pub fn offset_at(&self, position: Position) -> usize {
        let line = position.line as usize;
        debug_assert!(line < self.line_starts.len(), "line {line} out of range");
        self.line_starts[line] + position.character as usize
    }

    pub fn set_content(&mut self, text: String) {
        self.content = text;
        self.line_starts.clear();
        self.line_starts.push(0);
        push_line_starts(&self.content, 0, &mut self.line_starts);
    }

    /// Splices `replacement` over `range`. Entries up to and including the
    /// start line are unaffected by construction; everything after is
    /// rescanned from that line's start. Out-of-range input is a protocol
    /// violation upstream, not a state we recover.
    pub fn update(&mut self, range: Range, replacement: &str) {
        let start = self.offset_at(range.start);
        let end = self.offset_at(range.end);
        debug_assert!(start <= end && end <= self.content.len(), "edit out of range");

        self.content.replace_range(start..end, replacement);

        let start_line = range.start.line as usize;
        self.line_starts.truncate(start_line + 1);
        let rescan_from = self.line_starts[start_line];
        push_line_starts(&self.content, rescan_from, &mut self.line_starts);
    }
}

fn push_line_starts(content: &str, from: usize, line_starts: &mut Vec<usize>) {
    let bytes = content.as_bytes();
    for index in from..bytes.len() {
        // The final byte being '\n' terminates the last line without
        // starting an empty one.
        if bytes[index] == b'\n' && index + 1 < bytes.len() {
            line_starts.push(index + 1);
        }
    }
}
