//! Accumulated note content
//!
//! Transcript events append here in arrival order. The separator check and
//! the append are one operation on `&mut self`, so a finalized utterance is
//! separated from existing content by exactly one space even if this buffer
//! is ever shared across threads behind a lock.

use crate::protocol::TranscriptUpdate;

/// Append-only text target for one transcription session
#[derive(Debug, Default)]
pub struct NoteBuffer {
    content: String,
}

impl NoteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one transcript event's contribution
    pub fn apply(&mut self, update: &TranscriptUpdate) {
        match update {
            TranscriptUpdate::Final(text) => self.append_final(text),
            TranscriptUpdate::Delta(text) => self.append_delta(text),
        }
    }

    /// Append a finalized utterance plus a trailing separator.
    ///
    /// A separating space is inserted only when the existing content does not
    /// already end in whitespace.
    pub fn append_final(&mut self, text: &str) {
        if !self.content.is_empty() && !self.content.ends_with(char::is_whitespace) {
            self.content.push(' ');
        }
        self.content.push_str(text);
        self.content.push(' ');
    }

    /// Append an incremental token run exactly as received; the upstream
    /// stream controls token spacing.
    pub fn append_delta(&mut self, text: &str) {
        self.content.push_str(text);
    }

    pub fn contents(&self) -> &str {
        &self.content
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_append_separator() {
        let mut note = NoteBuffer::new();
        note.append_delta("foo");
        note.append_final("hello");
        assert_eq!(note.contents(), "foo hello ");
    }

    #[test]
    fn test_final_append_no_double_space() {
        let mut note = NoteBuffer::new();
        note.append_delta("foo ");
        note.append_final("hello");
        assert_eq!(note.contents(), "foo hello ");
    }

    #[test]
    fn test_final_append_to_empty() {
        let mut note = NoteBuffer::new();
        note.append_final("hello");
        assert_eq!(note.contents(), "hello ");
    }

    #[test]
    fn test_deltas_append_verbatim() {
        let mut note = NoteBuffer::new();
        note.append_delta("Hel");
        note.append_delta("lo,");
        note.append_delta(" world");
        assert_eq!(note.contents(), "Hello, world");
    }

    #[test]
    fn test_arrival_order_determines_output() {
        let updates = vec![
            TranscriptUpdate::Delta("a".to_string()),
            TranscriptUpdate::Final("b".to_string()),
            TranscriptUpdate::Delta("c".to_string()),
        ];

        let mut in_order = NoteBuffer::new();
        for update in &updates {
            in_order.apply(update);
        }
        assert_eq!(in_order.contents(), "a b c");

        // Swapping two adjacent distinct events changes the output
        let mut swapped = NoteBuffer::new();
        swapped.apply(&updates[1]);
        swapped.apply(&updates[0]);
        swapped.apply(&updates[2]);
        assert_eq!(swapped.contents(), "b ac");
        assert_ne!(swapped.contents(), in_order.contents());
    }

    #[test]
    fn test_deltas_then_completed_are_all_appended() {
        // Deltas are not a preview: the completed utterance is appended after
        // them, duplicating their text. This is the deliberate contract.
        let mut note = NoteBuffer::new();
        note.apply(&TranscriptUpdate::Delta("Hel".to_string()));
        note.apply(&TranscriptUpdate::Delta("lo ".to_string()));
        note.apply(&TranscriptUpdate::Final("Hello world".to_string()));
        assert_eq!(note.contents(), "Hello Hello world ");
    }
}
