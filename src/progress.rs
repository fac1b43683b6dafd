//! Two-part extraction progress.
//!
//! Progress is the mean of the completed-entry fraction and the
//! completed-byte fraction, so a bank holding one huge texture next to many
//! small scripts still advances smoothly.  A zero total counts as complete.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub files_done:  usize,
    pub total_files: usize,
    pub bytes_done:  u64,
    pub total_bytes: u64,
}

impl Progress {
    pub fn new(total_files: usize, total_bytes: u64) -> Self {
        Self { files_done: 0, total_files, bytes_done: 0, total_bytes }
    }

    /// Record one completed entry of `bytes` payload bytes.
    pub fn advance(&mut self, bytes: u64) {
        self.files_done += 1;
        self.bytes_done += bytes;
    }

    pub fn file_fraction(&self) -> f64 {
        if self.total_files == 0 { return 1.0; }
        self.files_done as f64 / self.total_files as f64
    }

    pub fn byte_fraction(&self) -> f64 {
        if self.total_bytes == 0 { return 1.0; }
        self.bytes_done as f64 / self.total_bytes as f64
    }

    /// Combined value in `[0.0, 1.0]`.
    pub fn fraction(&self) -> f64 {
        ((self.file_fraction() + self.byte_fraction()) / 2.0).clamp(0.0, 1.0)
    }
}
