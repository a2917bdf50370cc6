//! Chunk sizing policy and the split/join pair.
//!
//! A chunk travels inside a request path, so its size is bounded by the
//! maximum path length minus the fixed addressing overhead
//! (`chunk/` + fingerprint + `/` + index + `/` + checksum + `/`). Within that
//! ceiling the nominal size grows with the payload length in bands, so small
//! files use many small requests and large files fewer, larger ones.

use serde::Deserialize;

/// Default maximum request path length.
pub const DEFAULT_MAX_REQUEST_LENGTH: usize = 2000;

/// Estimated per-chunk path overhead: 32-char fingerprint, 32-char checksum,
/// up to 10 index digits and the separators.
pub const DEFAULT_PATH_OVERHEAD: usize = 84;

/// Chunk size used when the path-length ceiling leaves no room.
pub const DEFAULT_FALLBACK_SIZE: usize = 500;

/// Nominal size for payloads past the last band.
pub const DEFAULT_LARGEST_SIZE: usize = 15_000;

/// One row of the size table: payloads shorter than `below` chars use
/// `size`-char chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SizeBand {
    pub below: u64,
    pub size: usize,
}

pub fn default_bands() -> Vec<SizeBand> {
    vec![
        SizeBand { below: 20_000, size: 1000 },
        SizeBand { below: 200_000, size: 1500 },
        SizeBand { below: 2_000_000, size: 5000 },
        SizeBand { below: 20_000_000, size: 10_000 },
    ]
}

#[derive(Debug, Clone)]
pub struct ChunkPolicy {
    pub max_request_length: usize,
    pub path_overhead: usize,
    pub bands: Vec<SizeBand>,
    pub largest_size: usize,
    pub fallback_size: usize,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            max_request_length: DEFAULT_MAX_REQUEST_LENGTH,
            path_overhead: DEFAULT_PATH_OVERHEAD,
            bands: default_bands(),
            largest_size: DEFAULT_LARGEST_SIZE,
            fallback_size: DEFAULT_FALLBACK_SIZE,
        }
    }
}

impl ChunkPolicy {
    /// Usable chunk size ceiling. Non-positive when the overhead alone
    /// exceeds the path budget.
    #[allow(clippy::cast_possible_wrap)]
    pub fn max_chunk_size(&self) -> i64 {
        self.max_request_length as i64 - self.path_overhead as i64
    }

    /// Chunk size for a payload of `payload_len` characters.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn chunk_size_for(&self, payload_len: usize) -> usize {
        let ceiling = self.max_chunk_size();
        if ceiling <= 0 {
            return self.fallback_size.max(1);
        }

        let nominal = self
            .bands
            .iter()
            .find(|band| (payload_len as u64) < band.below)
            .map_or(self.largest_size, |band| band.size);

        nominal.min(ceiling as usize).max(1)
    }

    /// Check that the band table keeps chunk size monotonic in payload length.
    pub fn validate(&self) -> Result<(), String> {
        for pair in self.bands.windows(2) {
            if pair[1].below <= pair[0].below {
                return Err(format!(
                    "chunk bands must be strictly increasing: {} after {}",
                    pair[1].below, pair[0].below
                ));
            }
            if pair[1].size < pair[0].size {
                return Err(format!(
                    "chunk sizes must not decrease: {} after {}",
                    pair[1].size, pair[0].size
                ));
            }
        }
        if let Some(last) = self.bands.last() {
            if self.largest_size < last.size {
                return Err(format!(
                    "largest_size {} is smaller than the last band size {}",
                    self.largest_size, last.size
                ));
            }
        }
        if self.bands.iter().any(|b| b.size == 0) || self.largest_size == 0 {
            return Err("chunk sizes must be positive".to_string());
        }
        Ok(())
    }
}

/// Split `text` into contiguous slices of `size` characters. The last slice
/// may be shorter; an empty input yields no chunks.
pub fn split(text: &str, size: usize) -> Vec<String> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(chunk_count(text.len(), size));
    let mut start = 0;
    let mut taken = 0;

    for (offset, _) in text.char_indices() {
        if taken == size {
            chunks.push(text[start..offset].to_string());
            start = offset;
            taken = 0;
        }
        taken += 1;
    }
    if taken > 0 {
        chunks.push(text[start..].to_string());
    }
    chunks
}

/// Concatenate chunks given in index order.
pub fn join<S: AsRef<str>>(chunks: &[S]) -> String {
    let total = chunks.iter().map(|c| c.as_ref().len()).sum();
    let mut out = String::with_capacity(total);
    for chunk in chunks {
        out.push_str(chunk.as_ref());
    }
    out
}

/// `ceil(len / size)`.
pub fn chunk_count(len: usize, size: usize) -> usize {
    len.div_ceil(size.max(1))
}
