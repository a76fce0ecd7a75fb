use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewerError};
use crate::gpu_raycaster::WGPU;

/// Element types a volume can be decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    Float32,
    UInt8,
}

impl Dtype {
    /// Resolves the dtype from the last two characters of a `descr` string.
    pub fn from_descr(descr: &str) -> Result<Self> {
        let suffix = descr
            .char_indices()
            .rev()
            .nth(1)
            .map(|(i, _)| &descr[i..])
            .unwrap_or(descr);
        match suffix {
            "f4" => Ok(Dtype::Float32),
            "u1" => Ok(Dtype::UInt8),
            _ => Err(ViewerError::UnsupportedDtype(descr.to_string())),
        }
    }

    pub fn byte_width(self) -> usize {
        match self {
            Dtype::Float32 => 4,
            Dtype::UInt8 => 1,
        }
    }

    /// Canonical little-endian descriptor written by the encoder.
    pub fn descr(self) -> &'static str {
        match self {
            Dtype::Float32 => "<f4",
            Dtype::UInt8 => "|u1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
    Native,
    NotApplicable,
}

impl ByteOrder {
    pub fn from_descr(descr: &str) -> Self {
        match descr.chars().next() {
            Some('<') => ByteOrder::Little,
            Some('>') => ByteOrder::Big,
            Some('|') => ByteOrder::NotApplicable,
            _ => ByteOrder::Native,
        }
    }

    pub(crate) fn needs_swap(self) -> bool {
        match self {
            ByteOrder::Little => cfg!(target_endian = "big"),
            ByteOrder::Big => cfg!(target_endian = "little"),
            ByteOrder::Native | ByteOrder::NotApplicable => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    #[default]
    Linear,
    Nearest,
}

/// Where the volume mapper runs.
#[derive(Default)]
pub enum Processor {
    #[default]
    CPU,
    GPU(WGPU),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtype_is_resolved_from_suffix_only() {
        assert_eq!(Dtype::from_descr("<f4").unwrap(), Dtype::Float32);
        assert_eq!(Dtype::from_descr(">f4").unwrap(), Dtype::Float32);
        assert_eq!(Dtype::from_descr("|u1").unwrap(), Dtype::UInt8);
        assert_eq!(Dtype::from_descr("u1").unwrap(), Dtype::UInt8);
    }

    #[test]
    fn unknown_dtypes_are_rejected() {
        for descr in ["<i8", "<f8", "|b1", "", "4"] {
            assert!(matches!(
                Dtype::from_descr(descr),
                Err(ViewerError::UnsupportedDtype(d)) if d == descr
            ));
        }
    }

    #[test]
    fn byte_order_prefix() {
        assert_eq!(ByteOrder::from_descr("<f4"), ByteOrder::Little);
        assert_eq!(ByteOrder::from_descr(">f4"), ByteOrder::Big);
        assert_eq!(ByteOrder::from_descr("|u1"), ByteOrder::NotApplicable);
        assert_eq!(ByteOrder::from_descr("f4"), ByteOrder::Native);
        assert!(!ByteOrder::Native.needs_swap());
    }
}
