//! Incremental XML tag extraction over streamed text

/// Piece of streamed text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// Text outside any tag, safe to show
    Text(String),
    /// Interior of a complete tag
    Tag(String),
}

/// Finds `<tag>...</tag>` blocks in text that arrives in arbitrary chunks
///
/// Text that might be the start of an opening tag is held back until the
/// next chunk settles it, so a split tag never leaks to the caller.
#[derive(Debug, Clone)]
pub struct TagExtractor {
    open: String,
    close: String,
    buffer: String,
    inside: bool,
}

impl TagExtractor {
    /// Extractor for `<tag>` blocks
    pub fn new(tag: &str) -> Self {
        Self {
            open: format!("<{tag}>"),
            close: format!("</{tag}>"),
            buffer: String::new(),
            inside: false,
        }
    }

    /// Feed the next chunk
    pub fn push(&mut self, chunk: &str) -> Vec<Extracted> {
        self.buffer.push_str(chunk);
        let mut out = Vec::new();

        loop {
            if self.inside {
                let Some(end) = self.buffer.find(&self.close) else { break };
                let inner = self.buffer[..end].to_owned();
                self.buffer.drain(..end + self.close.len());
                self.inside = false;
                out.push(Extracted::Tag(inner));
                continue;
            }

            if let Some(start) = self.buffer.find(&self.open) {
                if start > 0 {
                    out.push(Extracted::Text(self.buffer[..start].to_owned()));
                }
                self.buffer.drain(..start + self.open.len());
                self.inside = true;
                continue;
            }

            let emit = self.buffer.len() - partial_tag_len(&self.buffer, &self.open);
            if emit > 0 {
                out.push(Extracted::Text(self.buffer.drain(..emit).collect()));
            }
            break;
        }

        out
    }

    /// Flush what is left at end of stream
    ///
    /// An unterminated tag is returned as text with its opening tag restored.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = if std::mem::take(&mut self.inside) {
            format!("{}{rest}", self.open)
        } else {
            rest
        };
        (!rest.is_empty()).then_some(rest)
    }

    /// Discard buffered state
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.inside = false;
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of `tag`
fn partial_tag_len(text: &str, tag: &str) -> usize {
    let longest = tag.len().saturating_sub(1).min(text.len());
    (1..=longest)
        .rev()
        .find(|&n| tag.is_char_boundary(n) && text.ends_with(&tag[..n]))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: &str = "<tool_use><name>x</name><arguments>{}</arguments></tool_use>";
    const INNER: &str = "<name>x</name><arguments>{}</arguments>";

    fn run(chunks: &[&str]) -> (String, Vec<String>) {
        let mut extractor = TagExtractor::new("tool_use");
        let mut text = String::new();
        let mut tags = Vec::new();
        for chunk in chunks {
            for piece in extractor.push(chunk) {
                match piece {
                    Extracted::Text(t) => text.push_str(&t),
                    Extracted::Tag(t) => tags.push(t),
                }
            }
        }
        if let Some(rest) = extractor.finish() {
            text.push_str(&rest);
        }
        (text, tags)
    }

    #[test]
    fn every_split_point_yields_one_tag_and_no_text() {
        for split in 0..=BLOCK.len() {
            let (text, tags) = run(&[&BLOCK[..split], &BLOCK[split..]]);
            assert_eq!(text, "", "split at {split}");
            assert_eq!(tags, [INNER], "split at {split}");
        }
    }

    #[test]
    fn one_byte_chunks() {
        let chunks: Vec<String> = BLOCK.chars().map(String::from).collect();
        let chunks: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let (text, tags) = run(&chunks);
        assert_eq!(text, "");
        assert_eq!(tags, [INNER]);
    }

    #[test]
    fn surrounding_text_passes_through() {
        let (text, tags) = run(&["Let me look ", "that up. <tool_", "use><name>search</name>", "</tool_use> after"]);
        assert_eq!(text, "Let me look that up.  after");
        assert_eq!(tags, ["<name>search</name>"]);
    }

    #[test]
    fn partial_open_tag_is_held_back_until_resolved() {
        let mut extractor = TagExtractor::new("tool_use");
        assert_eq!(extractor.push("a <tool"), [Extracted::Text("a ".to_owned())]);
        assert_eq!(extractor.push("box> b"), [Extracted::Text("<toolbox> b".to_owned())]);
    }

    #[test]
    fn unterminated_tag_is_flushed_as_text() {
        let (text, tags) = run(&["hi <tool_use><name>x</na"]);
        assert_eq!(text, "hi <tool_use><name>x</na");
        assert!(tags.is_empty());
    }

    #[test]
    fn multibyte_text_near_held_back_suffix() {
        let (text, tags) = run(&["héllo wörld <", "not a tag"]);
        assert_eq!(text, "héllo wörld <not a tag");
        assert!(tags.is_empty());
    }

    #[test]
    fn reset_discards_state() {
        let mut extractor = TagExtractor::new("tool_use");
        extractor.push("<tool_use><name>");
        extractor.reset();
        assert_eq!(extractor.push("plain"), [Extracted::Text("plain".to_owned())]);
        assert_eq!(extractor.finish(), None);
    }
}
