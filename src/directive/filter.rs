//! Incremental suppression of directive blocks in a token stream.

use crate::directive::{CLOSE_MARKER, OPEN_MARKER};

/// Splits a live token stream into a visible channel and a hidden directive
/// channel, without ever letting marker text (or fragments of it) through
/// to the visible side.
///
/// Markers regularly arrive split across token boundaries, so a small
/// carry buffer holds back any suffix that could still turn out to be the
/// start of a marker.
#[derive(Debug, Default)]
pub struct StreamingTagFilter {
    inside: bool,
    entered: bool,
    carry: String,
    hidden: String,
}

impl StreamingTagFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment and return newly-visible text.
    pub fn push(&mut self, fragment: &str) -> String {
        if fragment.is_empty() {
            return String::new();
        }
        self.carry.push_str(fragment);

        let mut visible = String::new();
        loop {
            if self.inside {
                if let Some(end) = self.carry.find(CLOSE_MARKER) {
                    self.hidden.push_str(&self.carry[..end]);
                    self.carry.drain(..end + CLOSE_MARKER.len());
                    self.inside = false;
                    continue;
                }
                // Keep only the minimal suffix that could still complete the
                // close marker; the rest is directive text.
                let keep = CLOSE_MARKER.len().saturating_sub(1);
                if self.carry.len() > keep {
                    let cut = floor_boundary(&self.carry, self.carry.len() - keep);
                    self.hidden.push_str(&self.carry[..cut]);
                    self.carry.drain(..cut);
                }
                break;
            }

            if let Some(start) = self.carry.find(OPEN_MARKER) {
                visible.push_str(&self.carry[..start]);
                self.carry.drain(..start + OPEN_MARKER.len());
                self.inside = true;
                self.entered = true;
                continue;
            }

            // Keep only a small suffix in case the next fragment starts with
            // the rest of a marker.
            let keep = OPEN_MARKER.len().max(CLOSE_MARKER.len()).saturating_sub(1);
            if self.carry.len() > keep {
                let cut = floor_boundary(&self.carry, self.carry.len() - keep);
                visible.push_str(&self.carry[..cut]);
                self.carry.drain(..cut);
            }
            break;
        }

        visible
    }

    /// Flush at end of stream. Inside a directive block (truncated stream)
    /// the tail belongs to the hidden channel, never the visible one.
    pub fn finish(&mut self) -> String {
        if self.inside {
            let tail = std::mem::take(&mut self.carry);
            self.hidden.push_str(&tail);
            return String::new();
        }
        std::mem::take(&mut self.carry)
    }

    /// True once an open marker has been seen.
    pub fn entered_directive(&self) -> bool {
        self.entered
    }

    /// Directive text accumulated so far, markers excluded.
    pub fn hidden(&self) -> &str {
        &self.hidden
    }
}

/// Largest char boundary at or below `at`.
fn floor_boundary(s: &str, at: usize) -> usize {
    let mut at = at;
    while at > 0 && !s.is_char_boundary(at) {
        at -= 1;
    }
    at
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    /// Run a fragment sequence through a fresh filter; returns (visible, hidden).
    fn run(fragments: &[&str]) -> (String, String) {
        let mut filter = StreamingTagFilter::new();
        let mut visible = String::new();
        for fragment in fragments {
            visible.push_str(&filter.push(fragment));
        }
        visible.push_str(&filter.finish());
        (visible, filter.hidden().to_owned())
    }

    #[test]
    fn plain_text_passes_through() {
        let (visible, hidden) = run(&["Hello ", "there, ", "friend."]);
        assert_eq!(visible, "Hello there, friend.");
        assert_eq!(hidden, "");
    }

    #[test]
    fn directive_block_is_suppressed() {
        let (visible, hidden) = run(&[
            "Sure. <tool_call>{\"name\":\"math\"}</tool_call> Done.",
        ]);
        assert_eq!(visible, "Sure.  Done.");
        assert_eq!(hidden, "{\"name\":\"math\"}");
    }

    #[test]
    fn marker_split_across_fragments_is_suppressed() {
        let (visible, hidden) = run(&[
            "Okay <to",
            "ol_c",
            "all>{\"name\"",
            ":\"x\"}</tool",
            "_call> bye",
        ]);
        assert_eq!(visible, "Okay  bye");
        assert_eq!(hidden, "{\"name\":\"x\"}");
    }

    #[test]
    fn no_partial_marker_ever_emitted() {
        let text = "résumé <tool_call>{\"name\":\"x\",\"arguments\":{}}</tool_call> voilà.";
        let expected_visible = "résumé  voilà.";
        let boundaries: Vec<usize> = (0..=text.len())
            .filter(|&i| text.is_char_boundary(i))
            .collect();
        for &a in &boundaries {
            for &b in &boundaries {
                if b < a {
                    continue;
                }
                let (visible, hidden) = run(&[&text[..a], &text[a..b], &text[b..]]);
                assert!(!visible.contains(OPEN_MARKER), "split {a}/{b}");
                assert!(!visible.contains(CLOSE_MARKER), "split {a}/{b}");
                assert_eq!(visible, expected_visible, "split {a}/{b}");
                assert_eq!(hidden, "{\"name\":\"x\",\"arguments\":{}}", "split {a}/{b}");
            }
        }
    }

    #[test]
    fn truncated_directive_never_leaks() {
        let mut filter = StreamingTagFilter::new();
        let mut visible = filter.push("Let me check. <tool_call>{\"name\":\"math\",");
        visible.push_str(&filter.push("\"arguments\":{\"op\":\"add\""));
        visible.push_str(&filter.finish());

        assert_eq!(visible, "Let me check. ");
        assert!(filter.entered_directive());
        assert_eq!(
            filter.hidden(),
            "{\"name\":\"math\",\"arguments\":{\"op\":\"add\""
        );
    }

    #[test]
    fn incomplete_marker_prefix_flushes_as_text() {
        let (visible, hidden) = run(&["maybe <tool"]);
        assert_eq!(visible, "maybe <tool");
        assert_eq!(hidden, "");
    }

    #[test]
    fn entered_flag_stays_unset_without_marker() {
        let mut filter = StreamingTagFilter::new();
        filter.push("just words");
        filter.finish();
        assert!(!filter.entered_directive());
    }

    #[test]
    fn two_blocks_accumulate_hidden_text() {
        let (visible, hidden) = run(&[
            "a<tool_call>one</tool_call>b<tool_call>two</tool_call>c",
        ]);
        assert_eq!(visible, "abc");
        assert_eq!(hidden, "onetwo");
    }
}
