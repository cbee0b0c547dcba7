// Header layout follows the safetensors format: an 8-byte little-endian
// length followed by a JSON object describing every tensor.

use indexmap::IndexMap;
use serde_json::Value;

use super::error::ArchiveError;
use crate::DataType;

pub const METADATA_KEY: &str = "__metadata__";
pub const HEADER_LENGTH_SIZE: usize = size_of::<u64>();
pub(crate) const MAX_HEADER_SIZE: u64 = 100_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDescriptor {
    name: String,
    data_type: DataType,
    shape: Box<[usize]>,
    data_offsets: (usize, usize),
}

impl TensorDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Start of the tensor's bytes, relative to the data segment.
    pub fn byte_offset_start(&self) -> usize {
        self.data_offsets.0
    }

    /// End (exclusive) of the tensor's bytes, relative to the data segment.
    pub fn byte_offset_end(&self) -> usize {
        self.data_offsets.1
    }

    pub fn element_count(&self) -> usize {
        element_count(&self.shape)
    }

    pub fn byte_count(&self) -> usize {
        self.data_offsets.1 - self.data_offsets.0
    }
}

pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// What is wrong with a single tensor entry. Kept separate from
/// `ArchiveError` so lenient archives can store it and report it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DescriptorIssue {
    MissingField(&'static str),
    UnsupportedDType(String),
    InvalidOffsets,
    InvalidShape,
}

impl DescriptorIssue {
    pub(crate) fn into_error(
        self,
        name: &str,
    ) -> ArchiveError {
        match self {
            DescriptorIssue::MissingField(field) => {
                ArchiveError::TensorMetadataMissing {
                    name: name.to_string(),
                    field,
                }
            },
            DescriptorIssue::UnsupportedDType(raw) => {
                ArchiveError::UnsupportedDType(raw)
            },
            DescriptorIssue::InvalidOffsets => {
                ArchiveError::InvalidOffsets(name.to_string())
            },
            DescriptorIssue::InvalidShape => {
                ArchiveError::InvalidShape(name.to_string())
            },
        }
    }
}

pub(crate) type HeaderEntry = Result<TensorDescriptor, DescriptorIssue>;

#[derive(Debug)]
pub(crate) struct Header {
    pub user_metadata: IndexMap<String, String>,
    pub entries: IndexMap<String, HeaderEntry>,
}

/// Validates the length prefix against the file size and returns the
/// header length in bytes.
pub(crate) fn read_header_length(
    prefix: [u8; HEADER_LENGTH_SIZE],
    file_size: u64,
) -> Result<usize, ArchiveError> {
    let header_length = u64::from_le_bytes(prefix);
    let invalid = || ArchiveError::InvalidHeaderLength {
        header_length,
        file_size,
    };
    if header_length > MAX_HEADER_SIZE {
        return Err(invalid());
    }
    let stop = header_length
        .checked_add(HEADER_LENGTH_SIZE as u64)
        .ok_or_else(invalid)?;
    if stop > file_size {
        return Err(invalid());
    }
    usize::try_from(header_length).map_err(|_| invalid())
}

pub(crate) fn parse_header(
    json: &[u8],
    data_segment_length: usize,
) -> Result<Header, ArchiveError> {
    let string = core::str::from_utf8(json).map_err(|_| {
        ArchiveError::MalformedHeader(
            "The header is an invalid UTF-8 string.".to_string(),
        )
    })?;
    let raw: IndexMap<String, Value> = serde_json::from_str(string)
        .map_err(|err| ArchiveError::MalformedHeader(err.to_string()))?;

    let mut user_metadata = IndexMap::new();
    let mut entries = IndexMap::with_capacity(raw.len());
    for (key, value) in raw {
        if key == METADATA_KEY {
            user_metadata = parse_user_metadata(value)?;
            continue;
        }
        let entry = parse_descriptor(&key, &value, data_segment_length);
        entries.insert(key, entry);
    }

    Ok(Header {
        user_metadata,
        entries,
    })
}

fn parse_user_metadata(
    value: Value
) -> Result<IndexMap<String, String>, ArchiveError> {
    let Value::Object(object) = value else {
        return Err(ArchiveError::MalformedHeader(format!(
            "\"{METADATA_KEY}\" must be an object"
        )));
    };
    Ok(object
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(text) => (key, text),
            other => (key, other.to_string()),
        })
        .collect())
}

fn parse_descriptor(
    name: &str,
    value: &Value,
    data_segment_length: usize,
) -> HeaderEntry {
    let require = |field: &'static str| {
        value.get(field).ok_or(DescriptorIssue::MissingField(field))
    };
    let raw_dtype = require("dtype")?;
    let raw_shape = require("shape")?;
    let raw_offsets = require("data_offsets")?;

    let data_type = match raw_dtype {
        Value::String(text) => DataType::from_archive_name(text)
            .ok_or_else(|| DescriptorIssue::UnsupportedDType(text.clone()))?,
        other => {
            return Err(DescriptorIssue::UnsupportedDType(other.to_string()));
        },
    };

    let shape = raw_shape
        .as_array()
        .ok_or(DescriptorIssue::InvalidShape)?
        .iter()
        .map(|dim| {
            dim.as_u64()
                .and_then(|dim| usize::try_from(dim).ok())
                .ok_or(DescriptorIssue::InvalidShape)
        })
        .collect::<Result<Box<[usize]>, _>>()?;

    let data_offsets = match raw_offsets.as_array().map(Vec::as_slice) {
        Some([start, end]) => {
            let offset = |value: &Value| {
                value.as_u64().and_then(|value| usize::try_from(value).ok())
            };
            match (offset(start), offset(end)) {
                (Some(start), Some(end))
                    if start <= end && end <= data_segment_length =>
                {
                    (start, end)
                },
                _ => return Err(DescriptorIssue::InvalidOffsets),
            }
        },
        _ => return Err(DescriptorIssue::InvalidOffsets),
    };

    let expected_bytes = shape
        .iter()
        .try_fold(data_type.size_in_bytes(), |acc, &dim| acc.checked_mul(dim))
        .ok_or(DescriptorIssue::InvalidShape)?;
    if data_offsets.1 - data_offsets.0 != expected_bytes {
        return Err(DescriptorIssue::InvalidShape);
    }

    Ok(TensorDescriptor {
        name: name.to_string(),
        data_type,
        shape,
        data_offsets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Header {
        parse_header(json.as_bytes(), 64).expect("header parses")
    }

    #[test]
    fn test_element_count() {
        assert_eq!(element_count(&[]), 1);
        assert_eq!(element_count(&[10, 20, 30]), 6000);
        assert_eq!(element_count(&[4, 0]), 0);
    }

    #[test]
    fn test_header_length_bounds() {
        assert_eq!(read_header_length(16u64.to_le_bytes(), 24).unwrap(), 16);
        assert!(matches!(
            read_header_length(17u64.to_le_bytes(), 24),
            Err(ArchiveError::InvalidHeaderLength {
                header_length: 17,
                file_size: 24,
            })
        ));
        assert!(matches!(
            read_header_length(u64::MAX.to_le_bytes(), 24),
            Err(ArchiveError::InvalidHeaderLength { .. })
        ));
    }

    #[test]
    fn test_declaration_order_and_metadata() {
        let header = parse(
            r#"{
                "z": {"dtype": "F32", "shape": [2], "data_offsets": [0, 8]},
                "__metadata__": {"format": "pt", "step": 3},
                "a": {"dtype": "U8", "shape": [], "data_offsets": [8, 9]}
            }"#,
        );
        let names: Vec<&str> = header.entries.keys().map(String::as_str).collect();
        assert_eq!(names, ["z", "a"]);
        assert_eq!(header.user_metadata["format"], "pt");
        assert_eq!(header.user_metadata["step"], "3");
        let scalar = header.entries["a"].as_ref().unwrap();
        assert_eq!(scalar.element_count(), 1);
        assert_eq!(scalar.byte_count(), 1);
    }

    #[test]
    fn test_descriptor_issues() {
        let header = parse(
            r#"{
                "missing": {"dtype": "F32", "shape": [2]},
                "dtype": {"dtype": "F8_E4M3", "shape": [2], "data_offsets": [0, 2]},
                "negative": {"dtype": "F32", "shape": [-2], "data_offsets": [0, 8]},
                "span": {"dtype": "F32", "shape": [3], "data_offsets": [0, 8]},
                "descending": {"dtype": "F32", "shape": [2], "data_offsets": [8, 0]},
                "outside": {"dtype": "F32", "shape": [2], "data_offsets": [60, 68]},
                "triple": {"dtype": "F32", "shape": [2], "data_offsets": [0, 4, 8]}
            }"#,
        );
        let issue = |name: &str| header.entries[name].clone().unwrap_err();
        assert_eq!(issue("missing"), DescriptorIssue::MissingField("data_offsets"));
        assert_eq!(
            issue("dtype"),
            DescriptorIssue::UnsupportedDType("F8_E4M3".to_string())
        );
        assert_eq!(issue("negative"), DescriptorIssue::InvalidShape);
        assert_eq!(issue("span"), DescriptorIssue::InvalidShape);
        assert_eq!(issue("descending"), DescriptorIssue::InvalidOffsets);
        assert_eq!(issue("outside"), DescriptorIssue::InvalidOffsets);
        assert_eq!(issue("triple"), DescriptorIssue::InvalidOffsets);
    }

    #[test]
    fn test_malformed_headers() {
        assert!(matches!(
            parse_header(b"{not json", 0),
            Err(ArchiveError::MalformedHeader(_))
        ));
        assert!(matches!(
            parse_header(&[0xff, 0xfe], 0),
            Err(ArchiveError::MalformedHeader(_))
        ));
        assert!(matches!(
            parse_header(br#"{"__metadata__": [1]}"#, 0),
            Err(ArchiveError::MalformedHeader(_))
        ));
    }
}
