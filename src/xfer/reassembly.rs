//! Reassemble, verify, decrypt and persist a completed transfer.
//!
//! Order matters: the chunk count is checked first, then the checksum of the
//! concatenated payload, then decryption. Only a payload that passes all
//! three reaches the disk, and it is written under a temporary name before
//! being renamed into place.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::codec::ContentCodec;
use super::error::TransferError;
use super::hasher::StreamingChecksum;
use super::store::TransferStore;
use super::types::Transfer;

/// Result of a successful `complete`.
#[derive(Debug, Clone)]
pub struct Finalized {
    pub path: PathBuf,
    pub filename: Option<String>,
    /// Decrypted size. Zero when `already_finalized`.
    pub bytes: u64,
    pub elapsed: Duration,
    /// The transfer had been finalized by an earlier `complete`.
    pub already_finalized: bool,
    /// Store generation of the record that was reassembled.
    pub generation: u64,
}

pub struct Reassembler {
    output_dir: PathBuf,
    codec: ContentCodec,
}

/// Snapshot taken under the store's read lock.
struct Assembled {
    payload: String,
    checksum: String,
    filename: Option<String>,
    file_size: u64,
    elapsed: Duration,
    generation: u64,
}

enum Snapshot {
    Ready(Assembled),
    AlreadyFinalized {
        checksum: String,
        filename: Option<String>,
        elapsed: Duration,
        generation: u64,
    },
}

impl Reassembler {
    pub fn new(output_dir: impl Into<PathBuf>, codec: ContentCodec) -> Self {
        Self {
            output_dir: output_dir.into(),
            codec,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Where a transfer's output lands.
    pub fn output_path(&self, id: &str, filename: Option<&str>) -> PathBuf {
        self.output_dir.join(output_name(id, filename))
    }

    pub async fn finalize(
        &self,
        store: &TransferStore,
        id: &str,
        expected: &str,
    ) -> Result<Finalized, TransferError> {
        let snapshot = store.with(id, snapshot).await??;

        let assembled = match snapshot {
            Snapshot::AlreadyFinalized {
                checksum,
                filename,
                elapsed,
                generation,
            } => {
                if !checksum.eq_ignore_ascii_case(expected) {
                    return Err(TransferError::Integrity {
                        what: "content",
                        expected: expected.to_string(),
                        actual: checksum,
                    });
                }
                info!(transfer_id = %id, "Transfer already finalized");
                return Ok(Finalized {
                    path: self.output_path(id, filename.as_deref()),
                    filename,
                    bytes: 0,
                    elapsed,
                    already_finalized: true,
                    generation,
                });
            }
            Snapshot::Ready(assembled) => assembled,
        };

        if !assembled.checksum.eq_ignore_ascii_case(expected) {
            return Err(TransferError::Integrity {
                what: "content",
                expected: expected.to_string(),
                actual: assembled.checksum,
            });
        }

        if assembled.payload.len() as u64 != assembled.file_size {
            warn!(
                transfer_id = %id,
                declared = assembled.file_size,
                actual = assembled.payload.len(),
                "Payload length differs from declared size"
            );
        }

        let plaintext = self.codec.decode(&assembled.payload)?;
        let path = self.output_path(id, assembled.filename.as_deref());
        write_atomic(&path, &plaintext).await?;

        if !store
            .mark_finalized(id, assembled.generation, &assembled.checksum)
            .await
        {
            warn!(transfer_id = %id, "Transfer evicted or re-initialized during finalization");
        }

        info!(
            transfer_id = %id,
            path = %path.display(),
            bytes = plaintext.len(),
            "File saved"
        );

        Ok(Finalized {
            path,
            filename: assembled.filename,
            bytes: plaintext.len() as u64,
            elapsed: assembled.elapsed,
            already_finalized: false,
            generation: assembled.generation,
        })
    }
}

fn snapshot(transfer: &Transfer) -> Result<Snapshot, TransferError> {
    if let Some(checksum) = &transfer.checksum {
        return Ok(Snapshot::AlreadyFinalized {
            checksum: checksum.clone(),
            filename: transfer.filename.clone(),
            elapsed: transfer.created.elapsed(),
            generation: transfer.generation,
        });
    }

    if transfer.received() != transfer.total_chunks as usize {
        let missing = transfer.missing();
        debug!(
            transfer_id = %transfer.id,
            missing = ?&missing[..missing.len().min(32)],
            "Transfer incomplete"
        );
        return Err(TransferError::Incomplete {
            received: transfer.received(),
            total: transfer.total_chunks,
        });
    }

    let (payload, checksum) = concatenate(transfer);
    Ok(Snapshot::Ready(Assembled {
        payload,
        checksum,
        filename: transfer.filename.clone(),
        file_size: transfer.file_size,
        elapsed: transfer.created.elapsed(),
        generation: transfer.generation,
    }))
}

/// Join chunks in ascending index order and checksum the result in the same
/// pass. A missing index is skipped with a warning.
pub fn concatenate(transfer: &Transfer) -> (String, String) {
    let mut payload = String::with_capacity(
        usize::try_from(transfer.file_size).unwrap_or(0).min(64 << 20),
    );
    let mut hasher = StreamingChecksum::new();

    for index in 0..transfer.total_chunks {
        match transfer.chunks.get(&index) {
            Some(chunk) => {
                hasher.update(chunk);
                payload.push_str(chunk);
            }
            None => warn!(transfer_id = %transfer.id, index, "Missing chunk"),
        }
    }
    (payload, hasher.finalize())
}

/// Final file name: the declared name, or `{id}.bin`.
pub fn output_name(id: &str, filename: Option<&str>) -> String {
    match filename {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("{id}.bin"),
    }
}

/// Write to a hidden temp file beside `path`, then rename over it.
async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = dir.join(format!(".{name}.{:08x}.part", rand::random::<u32>()));

    if let Err(e) = tokio::fs::write(&temp, data).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e);
    }
    Ok(())
}
