//! Raw bitstream capture for offline debugging

use crate::utils::error::Result;
use log::{info, warn};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Appends every submitted unit to a file, as received
///
/// The first write error is logged and disables the dump for good; decoding
/// carries on regardless.
pub struct BitstreamDump {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    bytes_written: u64,
}

impl BitstreamDump {
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        info!("Dumping video bitstream to {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
            bytes_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_active(&self) -> bool {
        self.writer.is_some()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn write(&mut self, data: &[u8]) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };

        match writer.write_all(data) {
            Ok(()) => self.bytes_written += data.len() as u64,
            Err(err) => {
                warn!("Writing bitstream dump {} failed, disabling it: {}", self.path.display(), err);
                self.writer = None;
            }
        }
    }

    /// Flush buffered bytes and stop dumping
    pub fn finish(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(err) = writer.flush() {
                warn!("Flushing bitstream dump {} failed: {}", self.path.display(), err);
            }
        }
    }
}

impl Drop for BitstreamDump {
    fn drop(&mut self) {
        self.finish();
    }
}
