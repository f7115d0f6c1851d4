//! Partial-utterance buffer for the streaming socket transport.
//!
//! Each chunk is transcribed independently and its text accumulated until
//! the client flushes; word boundaries may be truncated across chunks, a
//! known approximation of the chunked recognition scheme. The buffer is
//! owned by the connection handler and dies with the connection — there is
//! no process-wide session map to leak.

/// Chunks smaller than this are discarded as noise before transcription.
pub const MIN_CHUNK_BYTES: usize = 2048;

/// Cap on the flushed utterance length, in characters.
pub const MAX_UTTERANCE_CHARS: usize = 1000;

/// Ordered interim transcription fragments for one streaming session.
#[derive(Debug, Default)]
pub struct PartialBuffer {
    fragments: Vec<String>,
}

impl PartialBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts one non-empty fragment of recognized text.
    pub fn push(&mut self, fragment: impl Into<String>) {
        let fragment = fragment.into();
        if !fragment.trim().is_empty() {
            self.fragments.push(fragment.trim().to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// The transcript accumulated so far, without consuming it. Used to
    /// echo interim text back while the speaker is still talking.
    pub fn preview(&self) -> String {
        self.fragments.join(" ")
    }

    /// Concatenates all fragments with single spaces, truncates to
    /// [`MAX_UTTERANCE_CHARS`] on a char boundary, and clears the buffer.
    pub fn flush(&mut self) -> String {
        let joined = self.fragments.join(" ");
        self.fragments.clear();

        if joined.chars().count() <= MAX_UTTERANCE_CHARS {
            joined
        } else {
            joined.chars().take(MAX_UTTERANCE_CHARS).collect()
        }
    }

    /// Discards any accumulated state (stop signal or disconnect).
    pub fn clear(&mut self) {
        self.fragments.clear();
    }
}
