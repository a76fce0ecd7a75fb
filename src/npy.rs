//! Reading and writing of the NumPy `.npy` container.
//!
//! Only what a scalar volume needs is supported: `float32` and `uint8`
//! payloads with two or three dimensions. The header dictionary is parsed
//! just far enough to extract `descr`, `shape` and `fortran_order`.

use log::{debug, warn};
use web_time::Instant;

use crate::enums::{ByteOrder, Dtype};
use crate::error::{Result, ViewerError};

pub const MAGIC: &[u8; 6] = b"\x93NUMPY";
const PREFIX_LEN: usize = 8;
const HEADER_ALIGNMENT: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpyHeader {
    pub descr: String,
    pub dtype: Dtype,
    pub byte_order: ByteOrder,
    pub shape: Vec<usize>,
    /// Read but never acted upon, payloads are always taken in the given order.
    pub fortran_order: bool,
}

/// Typed sample buffer of a decoded array.
#[derive(Debug, Clone, PartialEq)]
pub enum Elements {
    Float32(Vec<f32>),
    UInt8(Vec<u8>),
}

impl Elements {
    pub fn len(&self) -> usize {
        match self {
            Elements::Float32(values) => values.len(),
            Elements::UInt8(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            Elements::Float32(_) => Dtype::Float32,
            Elements::UInt8(_) => Dtype::UInt8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedArray {
    pub header: NpyHeader,
    pub elements: Elements,
}

impl DecodedArray {
    pub fn shape(&self) -> &[usize] {
        &self.header.shape
    }

    pub fn dtype(&self) -> Dtype {
        self.header.dtype
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Decode a complete `.npy` buffer.
///
/// # Errors
///
/// * [`ViewerError::Format`] for a bad prefix or malformed header
/// * [`ViewerError::UnsupportedDtype`] for anything but `f4` and `u1`
/// * [`ViewerError::Shape`] unless the shape holds 2 or 3 positive dimensions
/// * [`ViewerError::TruncatedBuffer`] when the payload is shorter than declared
pub fn decode(buffer: &[u8]) -> Result<DecodedArray> {
    let started = Instant::now();
    let (header, payload_offset) = read_header(buffer)?;

    let element_count = element_count(&header.shape)?;
    let required = element_count
        .checked_mul(header.dtype.byte_width())
        .ok_or_else(|| ViewerError::Shape(format!("{:?} overflows", header.shape)))?;
    let available = buffer.len() - payload_offset;
    if available < required {
        return Err(ViewerError::TruncatedBuffer {
            required,
            available,
        });
    }

    let payload = &buffer[payload_offset..payload_offset + required];
    let elements = match header.dtype {
        Dtype::Float32 => {
            let mut values: Vec<f32> = bytemuck::pod_collect_to_vec(payload);
            if header.byte_order.needs_swap() {
                values
                    .iter_mut()
                    .for_each(|v| *v = f32::from_bits(v.to_bits().swap_bytes()));
            }
            Elements::Float32(values)
        }
        Dtype::UInt8 => Elements::UInt8(payload.to_vec()),
    };

    debug!(
        "decoded {} {:?} array of shape {:?} in {:?}",
        header.descr,
        header.dtype,
        header.shape,
        started.elapsed()
    );
    Ok(DecodedArray { header, elements })
}

/// Parse the prefix and header dictionary, returning the header together
/// with the byte offset at which the payload starts.
pub fn read_header(buffer: &[u8]) -> Result<(NpyHeader, usize)> {
    if buffer.len() < PREFIX_LEN {
        return Err(ViewerError::Format(format!(
            "{} bytes is shorter than the magic prefix",
            buffer.len()
        )));
    }
    if &buffer[..MAGIC.len()] != MAGIC {
        return Err(ViewerError::Format("magic signature mismatch".into()));
    }
    let (major, minor) = (buffer[6], buffer[7]);
    let length_width = match major {
        1 => 2,
        2 | 3 => 4,
        _ => {
            return Err(ViewerError::Format(format!(
                "unsupported format version {major}.{minor}"
            )));
        }
    };

    let length_bytes = buffer
        .get(PREFIX_LEN..PREFIX_LEN + length_width)
        .ok_or_else(|| ViewerError::Format("missing header length".into()))?;
    let header_len = match *length_bytes {
        [a, b] => u16::from_le_bytes([a, b]) as usize,
        [a, b, c, d] => u32::from_le_bytes([a, b, c, d]) as usize,
        _ => return Err(ViewerError::Format("malformed header length".into())),
    };

    let header_start = PREFIX_LEN + length_width;
    let header_bytes = buffer
        .get(header_start..header_start + header_len)
        .ok_or_else(|| {
            ViewerError::Format(format!("header of {header_len} bytes runs past the buffer"))
        })?;
    let text = std::str::from_utf8(header_bytes)
        .map_err(|e| ViewerError::Format(format!("header is not UTF-8: {e}")))?;

    let header = parse_header(text)?;
    Ok((header, header_start + header_len))
}

fn element_count(shape: &[usize]) -> Result<usize> {
    if !(2..=3).contains(&shape.len()) {
        return Err(ViewerError::Shape(format!(
            "{:?} has {} dimensions, expected 2 or 3",
            shape,
            shape.len()
        )));
    }
    if shape.contains(&0) {
        return Err(ViewerError::Shape(format!("{shape:?} has an empty dimension")));
    }
    shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| ViewerError::Shape(format!("{shape:?} overflows")))
}

fn parse_header(text: &str) -> Result<NpyHeader> {
    let mut descr = None;
    let mut shape = None;
    let mut fortran_order = None;

    let mut parser = HeaderParser::new(text);
    parser.expect('{')?;
    loop {
        parser.skip_whitespace();
        if parser.eat('}') {
            break;
        }
        let key = parser.string()?;
        parser.expect(':')?;
        match key.as_str() {
            "descr" => descr = Some(parser.string()?),
            "fortran_order" => fortran_order = Some(parser.boolean()?),
            "shape" => shape = Some(parser.shape()?),
            other => {
                debug!("skipping unknown header key {other:?}");
                parser.skip_value()?;
            }
        }
        parser.skip_whitespace();
        if !parser.eat(',') {
            parser.expect('}')?;
            break;
        }
    }

    let descr = descr.ok_or_else(|| ViewerError::Format("header has no 'descr'".into()))?;
    let shape = shape.ok_or_else(|| ViewerError::Format("header has no 'shape'".into()))?;
    let fortran_order = fortran_order
        .ok_or_else(|| ViewerError::Format("header has no 'fortran_order'".into()))?;
    if fortran_order {
        warn!("fortran_order is set, payload is read in the declared order regardless");
    }

    Ok(NpyHeader {
        dtype: Dtype::from_descr(&descr)?,
        byte_order: ByteOrder::from_descr(&descr),
        descr,
        shape,
        fortran_order,
    })
}

/// Minimal reader for the Python literal dictionary of an `.npy` header.
struct HeaderParser<'a> {
    rest: &'a str,
}

impl<'a> HeaderParser<'a> {
    fn new(text: &'a str) -> Self {
        Self { rest: text }
    }

    fn skip_whitespace(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_whitespace();
        match self.rest.strip_prefix(c) {
            Some(rest) => {
                self.rest = rest;
                true
            }
            None => false,
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{c}'")))
        }
    }

    fn error(&self, message: &str) -> ViewerError {
        let context: String = self.rest.chars().take(16).collect();
        ViewerError::Format(format!("{message} in header near {context:?}"))
    }

    fn string(&mut self) -> Result<String> {
        self.skip_whitespace();
        let quote = match self.rest.chars().next() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.error("expected a string")),
        };
        let body = &self.rest[1..];
        let end = body
            .find(quote)
            .ok_or_else(|| self.error("unterminated string"))?;
        let value = body[..end].to_string();
        self.rest = &body[end + 1..];
        Ok(value)
    }

    fn boolean(&mut self) -> Result<bool> {
        self.skip_whitespace();
        if let Some(rest) = self.rest.strip_prefix("True") {
            self.rest = rest;
            Ok(true)
        } else if let Some(rest) = self.rest.strip_prefix("False") {
            self.rest = rest;
            Ok(false)
        } else {
            Err(self.error("expected True or False"))
        }
    }

    /// Reads `(a, b, ...)`. Entries that are not positive integers are a
    /// shape problem, not a syntax problem.
    fn shape(&mut self) -> Result<Vec<usize>> {
        self.expect('(')?;
        let end = self
            .rest
            .find(')')
            .ok_or_else(|| self.error("unterminated shape tuple"))?;
        let inner = &self.rest[..end];
        self.rest = &self.rest[end + 1..];

        inner
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| {
                item.trim_end_matches('L')
                    .parse::<usize>()
                    .map_err(|_| ViewerError::Shape(format!("dimension {item:?} is not a positive integer")))
            })
            .collect()
    }

    fn skip_value(&mut self) -> Result<()> {
        self.skip_whitespace();
        match self.rest.chars().next() {
            Some('\'' | '"') => self.string().map(drop),
            Some('(') => {
                let end = self
                    .rest
                    .find(')')
                    .ok_or_else(|| self.error("unterminated tuple"))?;
                self.rest = &self.rest[end + 1..];
                Ok(())
            }
            Some(_) => {
                let end = self
                    .rest
                    .find([',', '}'])
                    .ok_or_else(|| self.error("unterminated value"))?;
                self.rest = &self.rest[end..];
                Ok(())
            }
            None => Err(self.error("expected a value")),
        }
    }
}

/// Encode an array as a version 1.0 `.npy` buffer in little-endian order.
pub fn encode(shape: &[usize], elements: &Elements) -> Result<Vec<u8>> {
    let count = element_count(shape)?;
    if count != elements.len() {
        return Err(ViewerError::Shape(format!(
            "{:?} needs {} elements, got {}",
            shape,
            count,
            elements.len()
        )));
    }

    let dims = shape
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': ({}), }}",
        elements.dtype().descr(),
        dims
    );
    let unpadded = PREFIX_LEN + 2 + header.len() + 1;
    let padding = (HEADER_ALIGNMENT - unpadded % HEADER_ALIGNMENT) % HEADER_ALIGNMENT;
    header.extend(std::iter::repeat_n(' ', padding));
    header.push('\n');

    let header_len = u16::try_from(header.len())
        .map_err(|_| ViewerError::Format("header does not fit a version 1.0 file".into()))?;

    let payload_len = count * elements.dtype().byte_width();
    let mut buffer = Vec::with_capacity(PREFIX_LEN + 2 + header.len() + payload_len);
    buffer.extend_from_slice(MAGIC);
    buffer.extend_from_slice(&[1, 0]);
    buffer.extend_from_slice(&header_len.to_le_bytes());
    buffer.extend_from_slice(header.as_bytes());
    match elements {
        Elements::Float32(values) => values
            .iter()
            .for_each(|v| buffer.extend_from_slice(&v.to_le_bytes())),
        Elements::UInt8(values) => buffer.extend_from_slice(values),
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_npy(major: u8, header: &str, payload: &[u8]) -> Vec<u8> {
        let mut buffer = MAGIC.to_vec();
        buffer.extend_from_slice(&[major, 0]);
        if major == 1 {
            buffer.extend_from_slice(&(header.len() as u16).to_le_bytes());
        } else {
            buffer.extend_from_slice(&(header.len() as u32).to_le_bytes());
        }
        buffer.extend_from_slice(header.as_bytes());
        buffer.extend_from_slice(payload);
        buffer
    }

    #[test]
    fn decodes_float32_scenario() {
        let values = vec![0.0f32, 0.5, 1.0, 1.0];
        let buffer = encode(&[2, 2], &Elements::Float32(values.clone())).unwrap();

        let array = decode(&buffer).unwrap();
        assert_eq!(array.shape(), &[2, 2]);
        assert_eq!(array.dtype(), Dtype::Float32);
        assert_eq!(array.elements, Elements::Float32(values));
    }

    #[test]
    fn encoded_header_is_aligned() {
        let buffer = encode(&[3, 4, 5], &Elements::UInt8(vec![7; 60])).unwrap();
        let header_len = u16::from_le_bytes([buffer[8], buffer[9]]) as usize;
        assert_eq!((10 + header_len) % HEADER_ALIGNMENT, 0);
        assert_eq!(buffer[10 + header_len - 1], b'\n');
        assert_eq!(buffer.len(), 10 + header_len + 60);
    }

    #[test]
    fn decodes_version_two_header() {
        let header = "{'descr': '|u1', 'fortran_order': False, 'shape': (2, 3), }\n";
        let buffer = raw_npy(2, header, &[1, 2, 3, 4, 5, 6]);

        let array = decode(&buffer).unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(array.elements, Elements::UInt8(vec![1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn decodes_big_endian_floats() {
        let payload: Vec<u8> = [1.5f32, -2.0]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        let header = "{'descr': '>f4', 'fortran_order': False, 'shape': (1, 2), }\n";
        let array = decode(&raw_npy(1, header, &payload)).unwrap();

        assert_eq!(array.header.byte_order, ByteOrder::Big);
        assert_eq!(array.elements, Elements::Float32(vec![1.5, -2.0]));
    }

    #[test]
    fn keys_may_appear_in_any_order() {
        let header = "{\"shape\": (2, 2), \"fortran_order\": True, \"descr\": \"|u1\"}";
        let array = decode(&raw_npy(1, header, &[0, 1, 2, 3])).unwrap();

        assert!(array.header.fortran_order);
        assert_eq!(array.elements, Elements::UInt8(vec![0, 1, 2, 3]));
    }

    #[test]
    fn trailing_payload_bytes_are_ignored() {
        let mut buffer = encode(&[2, 2], &Elements::UInt8(vec![9, 8, 7, 6])).unwrap();
        buffer.extend_from_slice(&[0xff; 5]);

        let array = decode(&buffer).unwrap();
        assert_eq!(array.len(), 4);
        assert_eq!(array.elements, Elements::UInt8(vec![9, 8, 7, 6]));
    }

    #[test]
    fn bad_magic_is_a_format_error() {
        let mut buffer = encode(&[2, 2], &Elements::UInt8(vec![0; 4])).unwrap();
        buffer[0] = b'\\';
        assert!(matches!(decode(&buffer), Err(ViewerError::Format(_))));

        // Only the 8-byte prefix exists, nothing beyond it may be required.
        assert!(matches!(
            decode(b"\\x93NUMP"),
            Err(ViewerError::Format(_))
        ));
        assert!(matches!(decode(b"\x93NUM"), Err(ViewerError::Format(_))));
    }

    #[test]
    fn unknown_major_version_is_a_format_error() {
        let header = "{'descr': '|u1', 'fortran_order': False, 'shape': (1, 1), }\n";
        let mut buffer = raw_npy(1, header, &[0]);
        buffer[6] = 9;
        assert!(matches!(decode(&buffer), Err(ViewerError::Format(_))));
    }

    #[test]
    fn header_running_past_buffer_is_a_format_error() {
        let mut buffer = MAGIC.to_vec();
        buffer.extend_from_slice(&[1, 0, 200, 0]);
        buffer.extend_from_slice(b"{'descr': '|u1'");
        assert!(matches!(decode(&buffer), Err(ViewerError::Format(_))));
    }

    #[test]
    fn missing_keys_are_format_errors() {
        let header = "{'descr': '|u1', 'shape': (2, 2), }";
        let buffer = raw_npy(1, header, &[0; 4]);
        assert!(matches!(decode(&buffer), Err(ViewerError::Format(_))));
    }

    #[test]
    fn truncated_payload_scenario() {
        let header = "{'descr': '|u1', 'fortran_order': False, 'shape': (10, 10), }\n";
        let buffer = raw_npy(1, header, &[1; 50]);

        match decode(&buffer) {
            Err(ViewerError::TruncatedBuffer {
                required,
                available,
            }) => {
                assert_eq!(required, 100);
                assert_eq!(available, 50);
            }
            other => panic!("expected truncated buffer, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_dtype_is_never_coerced() {
        let header = "{'descr': '<i8', 'fortran_order': False, 'shape': (2, 2), }\n";
        let buffer = raw_npy(1, header, &[0; 32]);
        assert!(matches!(
            decode(&buffer),
            Err(ViewerError::UnsupportedDtype(d)) if d == "<i8"
        ));
    }

    #[test]
    fn invalid_shapes_are_rejected() {
        for shape in ["(4,)", "(1, 1, 1, 4)", "(0, 4)", "(-2, 2)", "(2.5, 2)", "()"] {
            let header = format!("{{'descr': '|u1', 'fortran_order': False, 'shape': {shape}, }}");
            let buffer = raw_npy(1, &header, &[0; 8]);
            assert!(
                matches!(decode(&buffer), Err(ViewerError::Shape(_))),
                "shape {shape} should be rejected"
            );
        }
    }

    #[test]
    fn encode_checks_element_count() {
        assert!(matches!(
            encode(&[2, 2], &Elements::UInt8(vec![0; 3])),
            Err(ViewerError::Shape(_))
        ));
    }
}
