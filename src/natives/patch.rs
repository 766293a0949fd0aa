//! Non-destructive edits over an original text.
//!
//! A [`TextPatch`] records replacements against byte spans of the original
//! text. The edited text, a source map and the exact reversal of the edits are
//! all derived from those records; the original is never touched.

use {
    anyhow::{Result, bail, ensure},
    serde::{Deserialize, Serialize},
    std::ops::Range,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub span: Range<usize>,
    pub replacement: String,
}

#[derive(Debug, Clone)]
pub struct TextPatch<'a> {
    original: &'a str,
    /// Sorted by span start, pairwise disjoint.
    edits: Vec<Edit>,
}

impl<'a> TextPatch<'a> {
    pub fn new(original: &'a str) -> Self {
        Self {
            original,
            edits: Vec::new(),
        }
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Whether `span` intersects any recorded edit.
    pub fn overlaps(&self, span: &Range<usize>) -> bool {
        self.edits
            .iter()
            .any(|e| span.start < e.span.end && e.span.start < span.end)
    }

    /// Replace `span` of the original text with `replacement`.
    pub fn overwrite(&mut self, span: Range<usize>, replacement: impl Into<String>) -> Result<()> {
        ensure!(
            span.start <= span.end && span.end <= self.original.len(),
            "span {span:?} is out of bounds"
        );
        ensure!(
            self.original.is_char_boundary(span.start) && self.original.is_char_boundary(span.end),
            "span {span:?} splits a character"
        );
        if self.overlaps(&span) {
            bail!("span {span:?} overlaps an existing edit");
        }

        let idx = self.edits.partition_point(|e| e.span.start < span.start);
        self.edits.insert(
            idx,
            Edit {
                span,
                replacement: replacement.into(),
            },
        );
        Ok(())
    }

    pub fn remove(&mut self, span: Range<usize>) -> Result<()> {
        self.overwrite(span, "")
    }

    /// The original text with every edit applied.
    pub fn apply(&self) -> String {
        let mut out = String::with_capacity(self.original.len());
        let mut pos = 0;
        for edit in &self.edits {
            out.push_str(&self.original[pos..edit.span.start]);
            out.push_str(&edit.replacement);
            pos = edit.span.end;
        }
        out.push_str(&self.original[pos..]);
        out
    }

    /// Undo the recorded edits on `patched`, the output of [`TextPatch::apply`].
    ///
    /// Fails when `patched` does not carry the replacements where they were
    /// put.
    pub fn revert(&self, patched: &str) -> Result<String> {
        let mut out = String::with_capacity(self.original.len());
        let mut pos = 0;
        let mut delta: isize = 0;
        for edit in &self.edits {
            let start = edit.span.start.saturating_add_signed(delta);
            let end = start + edit.replacement.len();
            match patched.get(start..end) {
                Some(found) if found == edit.replacement => {}
                _ => bail!("replacement for {:?} not found in patched text", edit.span),
            }
            out.push_str(&patched[pos..start]);
            out.push_str(&self.original[edit.span.clone()]);
            pos = end;
            delta += edit.replacement.len() as isize - edit.span.len() as isize;
        }
        match patched.get(pos..) {
            Some(rest) => out.push_str(rest),
            None => bail!("patched text is shorter than expected"),
        }
        Ok(out)
    }

    /// Source map (v3) from the patched text back to the original.
    ///
    /// Every line start and every edit boundary gets a segment. Columns count
    /// UTF-16 code units.
    pub fn source_map(&self, source: &str) -> SourceMap {
        let mut writer = MapWriter::new(self.original);
        let mut pos = 0;
        for edit in &self.edits {
            writer.original(pos..edit.span.start);
            writer.inserted(&edit.replacement, edit.span.start);
            pos = edit.span.end;
        }
        writer.original(pos..self.original.len());

        SourceMap {
            version: 3,
            file: None,
            sources: vec![source.to_string()],
            sources_content: vec![Some(self.original.to_string())],
            names: Vec::new(),
            mappings: writer.mappings.finish(),
        }
    }
}

/// Source map v3 document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub sources: Vec<String>,
    pub sources_content: Vec<Option<String>>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Walks the generated text chunk by chunk, emitting segments.
struct MapWriter<'a> {
    original: &'a str,
    line_starts: Vec<usize>,
    mappings: MappingsBuilder,
    gen_line: u32,
    gen_col: u32,
}

impl<'a> MapWriter<'a> {
    fn new(original: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(original.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            original,
            line_starts,
            mappings: MappingsBuilder::default(),
            gen_line: 0,
            gen_col: 0,
        }
    }

    /// Line and UTF-16 column of a byte offset in the original text.
    fn position(&self, offset: usize) -> (u32, u32) {
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let col: usize = self.original[self.line_starts[line]..offset]
            .chars()
            .map(char::len_utf16)
            .sum();
        (line as u32, col as u32)
    }

    /// Copy of the original text: segments at the chunk start and at every
    /// line start inside it.
    fn original(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let (line, col) = self.position(range.start);
        self.mappings.add(self.gen_line, self.gen_col, line, col);

        for (offset, c) in self.original[range.clone()].char_indices() {
            if c == '\n' {
                self.gen_line += 1;
                self.gen_col = 0;
                let next = range.start + offset + 1;
                if next < range.end {
                    let (line, col) = self.position(next);
                    self.mappings.add(self.gen_line, 0, line, col);
                }
            } else {
                self.gen_col += c.len_utf16() as u32;
            }
        }
    }

    /// Inserted text: every generated line of it maps to the start of the
    /// span it replaced.
    fn inserted(&mut self, text: &str, origin: usize) {
        if text.is_empty() {
            return;
        }
        let (line, col) = self.position(origin);
        self.mappings.add(self.gen_line, self.gen_col, line, col);

        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\n' {
                self.gen_line += 1;
                self.gen_col = 0;
                if chars.peek().is_some() {
                    self.mappings.add(self.gen_line, 0, line, col);
                }
            } else {
                self.gen_col += c.len_utf16() as u32;
            }
        }
    }
}

/// Encodes segments into the `mappings` field. Segments must be added in
/// generated order.
#[derive(Debug, Default)]
struct MappingsBuilder {
    out: String,
    line: u32,
    line_has_segment: bool,
    prev_gen_col: i64,
    prev_line: i64,
    prev_col: i64,
}

impl MappingsBuilder {
    fn add(&mut self, gen_line: u32, gen_col: u32, orig_line: u32, orig_col: u32) {
        while self.line < gen_line {
            self.out.push(';');
            self.line += 1;
            self.line_has_segment = false;
            self.prev_gen_col = 0;
        }
        if self.line_has_segment {
            self.out.push(',');
        }
        self.line_has_segment = true;

        vlq(&mut self.out, gen_col as i64 - self.prev_gen_col);
        // Single source, index delta always zero.
        vlq(&mut self.out, 0);
        vlq(&mut self.out, orig_line as i64 - self.prev_line);
        vlq(&mut self.out, orig_col as i64 - self.prev_col);

        self.prev_gen_col = gen_col as i64;
        self.prev_line = orig_line as i64;
        self.prev_col = orig_col as i64;
    }

    fn finish(self) -> String {
        self.out
    }
}

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn vlq(out: &mut String, value: i64) {
    let mut v = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };
    loop {
        let mut digit = (v & 0b1_1111) as usize;
        v >>= 5;
        if v > 0 {
            digit |= 0b10_0000;
        }
        out.push(BASE64[digit] as char);
        if v == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edits_apply_against_original_offsets() {
        let text = "const a = require('x');\nconst b = 1;\n";
        let mut patch = TextPatch::new(text);
        patch.overwrite(10..22, "require(\"y\")").unwrap();
        patch.overwrite(0..5, "let").unwrap();

        assert_eq!(patch.apply(), "let a = require(\"y\");\nconst b = 1;\n");
        assert_eq!(patch.edits()[0].span, 0..5);
    }

    #[test]
    fn overlapping_and_invalid_spans_are_rejected() {
        let mut patch = TextPatch::new("héllo world");
        patch.overwrite(0..5, "x").unwrap();
        assert!(patch.overwrite(4..8, "y").is_err());
        assert!(patch.overwrite(7..40, "y").is_err());
        // Byte 2 is inside `é`.
        assert!(TextPatch::new("héllo").overwrite(2..3, "e").is_err());
    }

    #[test]
    fn revert_restores_original_bytes() {
        let text = "a();\nrequire('bindings')('x');\n// ünïcode\nrequire('./y');";
        let mut patch = TextPatch::new(text);
        patch.overwrite(5..30, "require(\"\\u0000natives:./x.node\")").unwrap();
        patch.remove(0..4).unwrap();
        patch
            .overwrite(text.len() - 15..text.len() - 1, "require(\"z\")")
            .unwrap();

        let patched = patch.apply();
        assert_ne!(patched, text);
        assert_eq!(patch.revert(&patched).unwrap(), text);
        assert!(patch.revert("something else").is_err());
    }

    #[test]
    fn vlq_matches_reference_encoding() {
        let mut out = String::new();
        for v in [0, 1, -1, 15, 16, -17, 1000] {
            vlq(&mut out, v);
            out.push(' ');
        }
        assert_eq!(out, "A C D e gB jB w+B ");
    }

    #[test]
    fn unchanged_text_maps_line_starts() {
        let map = TextPatch::new("a\nb\nc").source_map("in.js");
        assert_eq!(map.mappings, "AAAA;AACA;AACA");
        assert_eq!(map.sources, vec!["in.js".to_string()]);
    }

    #[test]
    fn replacement_shifts_following_columns() {
        // `require('x')` (12 bytes) becomes `R` on the first line.
        let text = "v=require('x');w\nz";
        let mut patch = TextPatch::new(text);
        patch.overwrite(2..14, "R").unwrap();
        let map = patch.source_map("in.js");

        // line 0: [0 -> 0:0], [2 -> 0:2], [3 -> 0:14]; line 1: [0 -> 1:0]
        assert_eq!(map.mappings, "AAAA,EAAE,CAAY;AACd");

        let json = map.to_json().unwrap();
        assert!(json.contains(r#""sourcesContent":["v=require('x');w\nz"]"#));
        assert!(!json.contains("\"file\""));
    }
}
