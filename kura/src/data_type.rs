use bytemuck::Pod;
use half::{bf16, f16};
use num_traits::NumCast;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Copy,
    Clone,
)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    // Floating point
    BF16,
    F16,
    F32,
    F64,
    // Integers
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    // Stored as one byte, zero is false
    Bool,
}

impl DataType {
    pub const fn size_in_bits(&self) -> usize {
        match self {
            DataType::I8 | DataType::U8 | DataType::Bool => 8,
            DataType::I16 | DataType::U16 => 16,
            DataType::BF16 | DataType::F16 => 16,
            DataType::F32 | DataType::I32 | DataType::U32 => 32,
            DataType::F64 | DataType::I64 | DataType::U64 => 64,
        }
    }

    pub const fn size_in_bytes(&self) -> usize {
        self.size_in_bits().div_ceil(8)
    }

    pub const fn is_floating_point(&self) -> bool {
        matches!(
            self,
            DataType::BF16 | DataType::F16 | DataType::F32 | DataType::F64
        )
    }

    /// Name used for this type inside archive headers.
    pub const fn archive_name(&self) -> &'static str {
        match self {
            DataType::BF16 => "BF16",
            DataType::F16 => "F16",
            DataType::F32 => "F32",
            DataType::F64 => "F64",
            DataType::I8 => "I8",
            DataType::U8 => "U8",
            DataType::I16 => "I16",
            DataType::U16 => "U16",
            DataType::I32 => "I32",
            DataType::U32 => "U32",
            DataType::I64 => "I64",
            DataType::U64 => "U64",
            DataType::Bool => "BOOL",
        }
    }

    pub fn from_archive_name(name: &str) -> Option<Self> {
        let data_type = match name {
            "BF16" => DataType::BF16,
            "F16" => DataType::F16,
            "F32" => DataType::F32,
            "F64" => DataType::F64,
            "I8" => DataType::I8,
            "U8" => DataType::U8,
            "I16" => DataType::I16,
            "U16" => DataType::U16,
            "I32" => DataType::I32,
            "U32" => DataType::U32,
            "I64" => DataType::I64,
            "U64" => DataType::U64,
            "BOOL" => DataType::Bool,
            _ => return None,
        };
        Some(data_type)
    }
}

pub trait ArrayElement: NumCast + Pod {
    fn data_type() -> DataType;
}

macro_rules! impl_array_element {
    ($($type:ty => $variant:ident),+ $(,)?) => {
        $(
            impl ArrayElement for $type {
                fn data_type() -> DataType {
                    DataType::$variant
                }
            }
        )+
    };
}

impl_array_element! {
    f16 => F16,
    bf16 => BF16,
    f32 => F32,
    f64 => F64,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
}

/// Runs `$body` with `$element` aliased to the Rust type backing
/// `$data_type`. Booleans are handled as their `u8` storage.
macro_rules! with_element_type {
    ($data_type:expr, $element:ident => $body:expr) => {
        match $data_type {
            $crate::DataType::BF16 => {
                type $element = ::half::bf16;
                $body
            },
            $crate::DataType::F16 => {
                type $element = ::half::f16;
                $body
            },
            $crate::DataType::F32 => {
                type $element = f32;
                $body
            },
            $crate::DataType::F64 => {
                type $element = f64;
                $body
            },
            $crate::DataType::I8 => {
                type $element = i8;
                $body
            },
            $crate::DataType::U8 | $crate::DataType::Bool => {
                type $element = u8;
                $body
            },
            $crate::DataType::I16 => {
                type $element = i16;
                $body
            },
            $crate::DataType::U16 => {
                type $element = u16;
                $body
            },
            $crate::DataType::I32 => {
                type $element = i32;
                $body
            },
            $crate::DataType::U32 => {
                type $element = u32;
                $body
            },
            $crate::DataType::I64 => {
                type $element = i64;
                $body
            },
            $crate::DataType::U64 => {
                type $element = u64;
                $body
            },
        }
    };
}

pub(crate) use with_element_type;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_names_round_trip() {
        let all = [
            DataType::BF16,
            DataType::F16,
            DataType::F32,
            DataType::F64,
            DataType::I8,
            DataType::U8,
            DataType::I16,
            DataType::U16,
            DataType::I32,
            DataType::U32,
            DataType::I64,
            DataType::U64,
            DataType::Bool,
        ];
        for data_type in all {
            assert_eq!(
                DataType::from_archive_name(data_type.archive_name()),
                Some(data_type)
            );
        }
    }

    #[test]
    fn test_unknown_archive_names() {
        assert_eq!(DataType::from_archive_name("F8_E4M3"), None);
        assert_eq!(DataType::from_archive_name("f32"), None);
        assert_eq!(DataType::from_archive_name(""), None);
    }

    #[test]
    fn test_sizes() {
        assert_eq!(DataType::BF16.size_in_bytes(), 2);
        assert_eq!(DataType::Bool.size_in_bytes(), 1);
        assert_eq!(DataType::U64.size_in_bytes(), 8);
        assert!(DataType::F16.is_floating_point());
        assert!(!DataType::I32.is_floating_point());
    }
}
