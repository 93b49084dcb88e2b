//! Progress reporting for byte transfers using indicatif.
//!
//! Fingerprinting streams a whole file through a checksum and promotion
//! copies a whole file into the pool. Both report through
//! [`TransferProgress`]; the CLI installs [`Progress`] unless `--quiet` is
//! given, and [`NoProgress`] then.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use bytesize::ByteSize;
use indicatif::{ProgressBar, ProgressStyle};

/// Receives updates while bytes are moved from one stream to another.
pub trait TransferProgress {
    /// Called before the first chunk is moved.
    ///
    /// # Arguments
    ///
    /// * `path` - File being read
    /// * `total` - Expected number of bytes
    fn on_start(&self, path: &Path, total: u64);

    /// Called after each chunk with the number of bytes in that chunk.
    fn on_progress(&self, bytes: u64);

    /// Called once the transfer ended, successfully or not.
    fn on_finish(&self);
}

/// Discards all progress updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl TransferProgress for NoProgress {
    fn on_start(&self, _path: &Path, _total: u64) {}

    fn on_progress(&self, _bytes: u64) {}

    fn on_finish(&self) {}
}

/// Progress bar reporter for a sequence of transfers.
///
/// One bar is shown per transfer and cleared when it finishes. Transfers
/// smaller than `min_bytes` are not drawn at all so that trees of small
/// files do not flicker.
pub struct Progress {
    current: Mutex<Option<ProgressBar>>,
    min_bytes: u64,
}

impl Progress {
    /// Create a reporter that draws bars for transfers of at least `min_bytes`.
    ///
    /// # Examples
    ///
    /// ```
    /// use linkdupe::progress::Progress;
    ///
    /// let progress = Progress::new(1024 * 1024);
    /// ```
    #[must_use]
    pub fn new(min_bytes: u64) -> Self {
        Self {
            current: Mutex::new(None),
            min_bytes,
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new(8 * 1024 * 1024)
    }
}

impl TransferProgress for Progress {
    fn on_start(&self, path: &Path, total: u64) {
        if total < self.min_bytes {
            return;
        }
        let bar = ProgressBar::new(total);
        bar.set_style(Self::style());
        bar.set_message(
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        bar.enable_steady_tick(Duration::from_millis(200));
        if let Ok(mut current) = self.current.lock() {
            *current = Some(bar);
        }
    }

    fn on_progress(&self, bytes: u64) {
        if let Ok(current) = self.current.lock() {
            if let Some(bar) = current.as_ref() {
                bar.inc(bytes);
            }
        }
    }

    fn on_finish(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some(bar) = current.take() {
                log::trace!(
                    "Transfer finished: {} in {:?}",
                    ByteSize::b(bar.position()),
                    bar.elapsed()
                );
                bar.finish_and_clear();
            }
        }
    }
}
