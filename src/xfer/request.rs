//! Request target grammar.
//!
//! ```text
//! init/{fingerprint}/{totalChunks}/{fileSize}/{filename}
//! chunk/{fingerprint}/{index}/{chunkChecksum}/{chunkPayloadHex}
//! complete/{fingerprint}/{contentChecksum}
//! ```
//!
//! Every target is followed by a fixed suffix on the wire (default
//! [`DEFAULT_PATH_SUFFIX`]) so requests read as module-proxy info lookups.
//! The filename is percent-encoded; all other fields are plain hex or
//! decimal.

use super::error::TransferError;

pub const DEFAULT_PATH_SUFFIX: &str = "/@v/v1.info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Init {
        id: String,
        total_chunks: u32,
        file_size: u64,
        filename: Option<String>,
    },
    Chunk {
        id: String,
        index: u32,
        checksum: String,
        payload: String,
    },
    Complete {
        id: String,
        checksum: String,
    },
}

impl Request {
    /// Parse a request path. A trailing `suffix` is stripped when present.
    ///
    /// Only one leading `/` and the single separator before the suffix are
    /// removed: an empty last field (an `init` without filename) is kept.
    pub fn parse(path: &str, suffix: &str) -> Result<Self, TransferError> {
        let mut path = path.strip_prefix('/').unwrap_or(path);
        let suffix = suffix.trim_matches('/');
        if !suffix.is_empty() {
            if let Some(rest) = path.strip_suffix(suffix) {
                path = rest.strip_suffix('/').unwrap_or(rest);
            }
        }

        let fields: Vec<&str> = path.split('/').collect();
        if fields.len() < 2 {
            return Err(TransferError::validation("Invalid request format"));
        }

        match fields[0] {
            "init" => Self::parse_init(&fields),
            "chunk" => Self::parse_chunk(&fields),
            "complete" => Self::parse_complete(&fields),
            other => Err(TransferError::validation(format!(
                "Unknown action: {other}"
            ))),
        }
    }

    fn parse_init(fields: &[&str]) -> Result<Self, TransferError> {
        if fields.len() != 5 {
            return Err(TransferError::validation("Invalid init request format"));
        }
        let id = parse_id(fields[1])?;
        let total_chunks = fields[2]
            .parse()
            .map_err(|_| TransferError::validation("Invalid total chunks"))?;
        let file_size = fields[3]
            .parse()
            .map_err(|_| TransferError::validation("Invalid file size"))?;
        let filename = parse_filename(fields[4])?;
        Ok(Self::Init {
            id,
            total_chunks,
            file_size,
            filename,
        })
    }

    fn parse_chunk(fields: &[&str]) -> Result<Self, TransferError> {
        if fields.len() != 5 {
            return Err(TransferError::validation("Invalid chunk request format"));
        }
        let id = parse_id(fields[1])?;
        let index = fields[2]
            .parse()
            .map_err(|_| TransferError::validation("Invalid chunk index"))?;
        Ok(Self::Chunk {
            id,
            index,
            checksum: fields[3].to_ascii_lowercase(),
            payload: fields[4].to_string(),
        })
    }

    fn parse_complete(fields: &[&str]) -> Result<Self, TransferError> {
        if fields.len() != 3 {
            return Err(TransferError::validation(
                "Invalid complete request format",
            ));
        }
        Ok(Self::Complete {
            id: parse_id(fields[1])?,
            checksum: fields[2].to_ascii_lowercase(),
        })
    }

    /// Render the request target without the suffix.
    pub fn to_path(&self) -> String {
        match self {
            Self::Init {
                id,
                total_chunks,
                file_size,
                filename,
            } => {
                let name = filename.as_deref().map(urlencoding::encode);
                format!(
                    "init/{id}/{total_chunks}/{file_size}/{}",
                    name.as_deref().unwrap_or("")
                )
            }
            Self::Chunk {
                id,
                index,
                checksum,
                payload,
            } => format!("chunk/{id}/{index}/{checksum}/{payload}"),
            Self::Complete { id, checksum } => format!("complete/{id}/{checksum}"),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Init { id, .. } | Self::Chunk { id, .. } | Self::Complete { id, .. } => id,
        }
    }

    /// Short name for logs.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Chunk { .. } => "chunk",
            Self::Complete { .. } => "complete",
        }
    }
}

fn parse_id(field: &str) -> Result<String, TransferError> {
    if field.is_empty() {
        return Err(TransferError::validation("Missing transfer id"));
    }
    Ok(field.to_string())
}

/// Decode and validate the filename field. Empty means absent.
fn parse_filename(field: &str) -> Result<Option<String>, TransferError> {
    let decoded = urlencoding::decode(field)
        .map_err(|_| TransferError::validation("Invalid filename encoding"))?;
    if decoded.is_empty() {
        return Ok(None);
    }
    if decoded.contains('/')
        || decoded.contains('\\')
        || decoded.contains('\0')
        || decoded == "."
        || decoded == ".."
    {
        return Err(TransferError::validation(format!(
            "Invalid filename: {decoded}"
        )));
    }
    Ok(Some(decoded.into_owned()))
}
