//! Trailing-byte window used to find line and header-block terminators while
//! streaming, without keeping the whole header section around.

pub(crate) const WINDOW_LEN: usize = 4;

/// Filler for slots that have not seen a real byte yet. It never equals CR or
/// LF, so the terminator checks below hold from the first byte onward.
const SENTINEL: u8 = 0;

const LINE_TERMINATOR: &[u8; 2] = b"\r\n";
const BLOCK_TERMINATOR: &[u8; WINDOW_LEN] = b"\r\n\r\n";

/// The last [`WINDOW_LEN`] bytes seen, oldest first.
#[derive(Debug, Clone)]
pub(crate) struct TerminatorWindow {
    bytes: [u8; WINDOW_LEN],
    filled: usize,
}

impl Default for TerminatorWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminatorWindow {
    pub fn new() -> Self {
        Self {
            bytes: [SENTINEL; WINDOW_LEN],
            filled: 0,
        }
    }

    /// Appends `byte`. Once the window is full the oldest byte is evicted and
    /// returned so the caller can move it into its line buffer.
    pub fn push(&mut self, byte: u8) -> Option<u8> {
        let evicted = (self.filled == WINDOW_LEN).then_some(self.bytes[0]);
        self.bytes.rotate_left(1);
        self.bytes[WINDOW_LEN - 1] = byte;
        self.filled = (self.filled + 1).min(WINDOW_LEN);
        evicted
    }

    pub fn ends_line(&self) -> bool {
        &self.bytes[WINDOW_LEN - LINE_TERMINATOR.len()..] == LINE_TERMINATOR
    }

    pub fn ends_header_block(&self) -> bool {
        &self.bytes == BLOCK_TERMINATOR
    }

    /// The newest `n` bytes held by the window, oldest first.
    pub fn tail(&self, n: usize) -> &[u8] {
        let n = n.min(self.filled);
        &self.bytes[WINDOW_LEN - n..]
    }
}
