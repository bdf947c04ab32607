//! Versioned binary container for persisted control networks.
//!
//! Layout (all integers little-endian):
//! ```text
//! magic        8 bytes  "CTRLNET\0"
//! version      u32      FORMAT_VERSION
//! header_len   u32
//! header       header_len bytes of JSON (HeaderRecord)
//! point_count  u32
//! repeated point_count times:
//!   record_len u32
//!   record     record_len bytes of JSON (PointRecord)
//! ```
//!
//! Records keep file order; the reader pipeline relies on it.

mod records;

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use thiserror::Error;

use crate::graph::NetworkGraph;

pub use records::{HeaderRecord, MeasureRecord, PointRecord, SurfaceRecord};

/// File signature
pub const MAGIC: [u8; 8] = *b"CTRLNET\0";

/// Container version written by this crate
pub const FORMAT_VERSION: u32 = 2;

/// Upper bound on a single JSON block
const MAX_BLOCK_LEN: u32 = 64 * 1024 * 1024;

/// Errors from decoding or encoding a network container
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a control network file (bad magic)")]
    BadMagic,

    #[error("Unsupported format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("File truncated while reading {0}")]
    Truncated(String),

    #[error("Malformed {what}: {source}")]
    Malformed {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{what} block of {len} bytes exceeds the 64 MiB limit")]
    Oversized { what: String, len: u32 },

    #[error("Decoding interrupted")]
    Interrupted,
}

/// Intermediate result of stage one: header plus records in file order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedNetwork {
    pub header: HeaderRecord,
    pub points: Vec<PointRecord>,
}

fn truncated_or_io(e: std::io::Error, what: &str) -> FormatError {
    if e.kind() == ErrorKind::UnexpectedEof {
        FormatError::Truncated(what.to_string())
    } else {
        FormatError::Io(e)
    }
}

fn read_block<R: Read>(reader: &mut R, what: &str) -> Result<Vec<u8>, FormatError> {
    let len = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| truncated_or_io(e, what))?;
    if len > MAX_BLOCK_LEN {
        return Err(FormatError::Oversized {
            what: what.to_string(),
            len,
        });
    }
    let mut buf = vec![0u8; len as usize];
    reader
        .read_exact(&mut buf)
        .map_err(|e| truncated_or_io(e, what))?;
    Ok(buf)
}

fn write_block<W: Write, T: serde::Serialize>(
    writer: &mut W,
    value: &T,
    what: &str,
) -> Result<(), FormatError> {
    let bytes = serde_json::to_vec(value).map_err(|source| FormatError::Malformed {
        what: what.to_string(),
        source,
    })?;
    let len = u32::try_from(bytes.len())
        .ok()
        .filter(|&len| len <= MAX_BLOCK_LEN)
        .ok_or_else(|| FormatError::Oversized {
            what: what.to_string(),
            len: u32::MAX,
        })?;
    writer.write_u32::<LittleEndian>(len)?;
    writer.write_all(&bytes)?;
    Ok(())
}

/// Decode a full container.
pub fn decode<R: Read>(reader: R) -> Result<DecodedNetwork, FormatError> {
    decode_with(reader, |_| true)
}

/// Decode a container, asking `keep_going` before every point record.
///
/// Returning false from `keep_going` aborts with `FormatError::Interrupted`.
pub fn decode_with<R, F>(mut reader: R, mut keep_going: F) -> Result<DecodedNetwork, FormatError>
where
    R: Read,
    F: FnMut(usize) -> bool,
{
    let mut magic = [0u8; 8];
    reader
        .read_exact(&mut magic)
        .map_err(|e| truncated_or_io(e, "magic"))?;
    if magic != MAGIC {
        return Err(FormatError::BadMagic);
    }

    let version = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| truncated_or_io(e, "version"))?;
    if version != FORMAT_VERSION {
        return Err(FormatError::UnsupportedVersion {
            found: version,
            expected: FORMAT_VERSION,
        });
    }

    let header_bytes = read_block(&mut reader, "header")?;
    let header: HeaderRecord =
        serde_json::from_slice(&header_bytes).map_err(|source| FormatError::Malformed {
            what: "header".to_string(),
            source,
        })?;

    let count = reader
        .read_u32::<LittleEndian>()
        .map_err(|e| truncated_or_io(e, "point count"))? as usize;
    debug!(
        "Decoding network '{}' with {count} point records",
        header.network_id
    );

    let mut points = Vec::with_capacity(count.min(1 << 20));
    for index in 0..count {
        if !keep_going(index) {
            return Err(FormatError::Interrupted);
        }
        let what = format!("point record {index}");
        let bytes = read_block(&mut reader, &what)?;
        let record: PointRecord = serde_json::from_slice(&bytes)
            .map_err(|source| FormatError::Malformed { what, source })?;
        points.push(record);
    }

    Ok(DecodedNetwork { header, points })
}

/// Encode a header and records into a container.
pub fn encode<W: Write>(
    mut writer: W,
    header: &HeaderRecord,
    points: &[PointRecord],
) -> Result<(), FormatError> {
    writer.write_all(&MAGIC)?;
    writer.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    write_block(&mut writer, header, "header")?;

    let count = u32::try_from(points.len()).map_err(|_| FormatError::Oversized {
        what: "point table".to_string(),
        len: u32::MAX,
    })?;
    writer.write_u32::<LittleEndian>(count)?;
    for (index, record) in points.iter().enumerate() {
        write_block(&mut writer, record, &format!("point record {index}"))?;
    }
    writer.flush()?;
    Ok(())
}

/// Read and decode a network file.
pub fn read_network_file(path: &Path) -> Result<DecodedNetwork, FormatError> {
    decode(BufReader::new(File::open(path)?))
}

/// Write a graph's header and points (in insertion order) to `path`.
pub fn write_network(path: &Path, graph: &NetworkGraph) -> Result<(), FormatError> {
    let header = HeaderRecord::from(graph.header());
    let points: Vec<PointRecord> = graph.points().map(PointRecord::from).collect();
    encode(BufWriter::new(File::create(path)?), &header, &points)?;
    debug!("Wrote {} points to {}", points.len(), path.display());
    Ok(())
}
