use std::{
    collections::HashSet,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use super::header::{HEADER_LENGTH_SIZE, METADATA_KEY};
use crate::{DataType, Tensor, TensorMap, tensor::size_for_shape};

#[derive(Debug, Error)]
pub enum ArchiveWriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(
        "Invalid tensor data for \"{name}\": expected {expected} bytes, got {actual} bytes"
    )]
    InvalidTensorData {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("Tensor \"{0}\" is declared more than once")]
    DuplicateTensor(String),
    #[error("Failed to serialize archive header: {0}")]
    HeaderJson(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    pub name: &'a str,
    pub data_type: DataType,
    pub shape: &'a [usize],
    pub data: &'a [u8],
}

impl<'a> TensorView<'a> {
    pub fn new(
        name: &'a str,
        tensor: &'a Tensor,
    ) -> Self {
        Self {
            name,
            data_type: tensor.data_type(),
            shape: tensor.shape(),
            data: tensor.as_bytes(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub data_type: DataType,
    pub shape: Box<[usize]>,
    pub byte_len: usize,
}

#[derive(Serialize)]
struct HeaderRecord<'a> {
    dtype: &'static str,
    shape: &'a [usize],
    data_offsets: (usize, usize),
}

#[derive(Serialize)]
struct SerializedHeader<'a> {
    #[serde(rename = "__metadata__")]
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a IndexMap<String, String>>,
    #[serde(flatten)]
    tensors: IndexMap<&'a str, HeaderRecord<'a>>,
}

/// Lays out tensors contiguously in declaration order and returns the
/// padded header bytes.
fn build_header<'a>(
    entries: impl Iterator<Item = (&'a str, DataType, &'a [usize], usize)>,
    metadata: Option<&'a IndexMap<String, String>>,
) -> Result<Vec<u8>, ArchiveWriteError> {
    let mut offset: usize = 0;
    let mut header = SerializedHeader {
        metadata,
        tensors: IndexMap::new(),
    };

    let mut seen = HashSet::new();
    for (name, data_type, shape, byte_len) in entries {
        if name == METADATA_KEY || !seen.insert(name) {
            return Err(ArchiveWriteError::DuplicateTensor(name.to_string()));
        }
        let expected = size_for_shape(shape, data_type);
        if expected != byte_len {
            return Err(ArchiveWriteError::InvalidTensorData {
                name: name.to_string(),
                expected,
                actual: byte_len,
            });
        }

        let begin = offset;
        let end = offset + byte_len;
        offset = end;

        header.tensors.insert(
            name,
            HeaderRecord {
                dtype: data_type.archive_name(),
                shape,
                data_offsets: (begin, end),
            },
        );
    }

    let mut header_bytes = serde_json::to_vec(&header)?;

    // Pad so the data segment starts on an 8-byte boundary.
    let padding = (HEADER_LENGTH_SIZE - (header_bytes.len() % 8)) % 8;
    header_bytes.extend(std::iter::repeat_n(b' ', padding));
    Ok(header_bytes)
}

fn write_header(
    w: &mut impl Write,
    header_bytes: &[u8],
) -> Result<(), ArchiveWriteError> {
    let header_len = header_bytes.len() as u64;
    w.write_all(&header_len.to_le_bytes())?;
    w.write_all(header_bytes)?;
    Ok(())
}

pub fn write_archive(
    path: &Path,
    tensors: &[TensorView<'_>],
    metadata: Option<&IndexMap<String, String>>,
) -> Result<(), ArchiveWriteError> {
    let header_bytes = build_header(
        tensors.iter().map(|t| (t.name, t.data_type, t.shape, t.data.len())),
        metadata,
    )?;

    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    write_header(&mut w, &header_bytes)?;
    for t in tensors {
        w.write_all(t.data)?;
    }
    w.flush()?;
    Ok(())
}

/// Writes the header first, then asks `write_tensor_data` for each entry's
/// bytes so large tensors never need to be held in memory together.
pub fn write_archive_streaming<F>(
    path: &Path,
    tensors: &[ArchiveEntry],
    metadata: Option<&IndexMap<String, String>>,
    mut write_tensor_data: F,
) -> Result<(), ArchiveWriteError>
where
    F: FnMut(
        &mut dyn Write,
        &ArchiveEntry,
    ) -> Result<(), ArchiveWriteError>,
{
    let header_bytes = build_header(
        tensors
            .iter()
            .map(|t| (t.name.as_str(), t.data_type, &*t.shape, t.byte_len)),
        metadata,
    )?;

    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    write_header(&mut w, &header_bytes)?;
    for t in tensors {
        write_tensor_data(&mut w, t)?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_tensors(
    path: &Path,
    tensors: &TensorMap,
    metadata: Option<&IndexMap<String, String>>,
) -> Result<(), ArchiveWriteError> {
    let views: Vec<TensorView<'_>> = tensors
        .iter()
        .map(|(name, tensor)| TensorView::new(name, tensor))
        .collect();
    write_archive(path, &views, metadata)
}
