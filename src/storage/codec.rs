//! Binary bulk-load codec
//!
//! ```text
//! Header(label) := label NUL  prop_count:u32-LE  (prop_name NUL){prop_count}
//! Node record   := (tag:u8 payload){prop_count}
//! Edge record   := src:u64-LE dst:u64-LE (tag:u8 payload){prop_count}
//! ```
//!
//! All multi-byte payloads are little-endian regardless of host.

use crate::error::{ImportError, Result};
use crate::graph::{Property, Value};

pub const TAG_NULL: u8 = 0;
pub const TAG_BOOL: u8 = 1;
pub const TAG_NUMBER: u8 = 2;
pub const TAG_STRING: u8 = 3;
pub const TAG_INTEGER: u8 = 4;

const NUL: u8 = 0x00;

/// Decoded label header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub label: String,
    pub property_names: Vec<String>,
}

/// Decoded edge record
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRecord {
    pub src: u64,
    pub dst: u64,
    pub values: Vec<Value>,
}

pub fn tag_of(value: &Value) -> u8 {
    match value {
        Value::Null => TAG_NULL,
        Value::Bool(_) => TAG_BOOL,
        Value::Number(_) => TAG_NUMBER,
        Value::String(_) => TAG_STRING,
        Value::Integer(_) => TAG_INTEGER,
    }
}

pub fn write_header<S: AsRef<str>>(buf: &mut Vec<u8>, label: &str, property_names: &[S]) {
    buf.extend_from_slice(label.as_bytes());
    buf.push(NUL);
    buf.extend_from_slice(&(property_names.len() as u32).to_le_bytes());
    for name in property_names {
        buf.extend_from_slice(name.as_ref().as_bytes());
        buf.push(NUL);
    }
}

pub fn write_value(buf: &mut Vec<u8>, value: &Value) {
    buf.push(tag_of(value));
    match value {
        Value::Null => {}
        Value::Bool(b) => buf.push(u8::from(*b)),
        Value::Number(n) => buf.extend_from_slice(&n.to_le_bytes()),
        Value::Integer(i) => buf.extend_from_slice(&i.to_le_bytes()),
        Value::String(s) => {
            buf.extend_from_slice(s.as_bytes());
            buf.push(NUL);
        }
    }
}

pub fn write_properties(buf: &mut Vec<u8>, properties: &[Property]) {
    for prop in properties {
        write_value(buf, &prop.value);
    }
}

pub fn write_edge(buf: &mut Vec<u8>, src: u64, dst: u64, properties: &[Property]) {
    buf.extend_from_slice(&src.to_le_bytes());
    buf.extend_from_slice(&dst.to_le_bytes());
    write_properties(buf, properties);
}

// === decoding ===

/// Cursor over an encoded blob
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(ImportError::Protocol(format!(
                "truncated blob: need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.data.len() - self.pos
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_cstr(&mut self) -> Result<String> {
        let rest = &self.data[self.pos.min(self.data.len())..];
        let end = rest.iter().position(|&b| b == NUL).ok_or_else(|| {
            ImportError::Protocol(format!("unterminated string at offset {}", self.pos))
        })?;
        let s = std::str::from_utf8(&rest[..end])
            .map_err(|e| ImportError::Protocol(format!("invalid UTF-8 at offset {}: {}", self.pos, e)))?
            .to_string();
        self.pos += end + 1;
        Ok(s)
    }

    pub fn read_header(&mut self) -> Result<Header> {
        let label = self.read_cstr()?;
        let count = u32::from_le_bytes(self.read_array::<4>()?) as usize;
        let mut property_names = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            property_names.push(self.read_cstr()?);
        }
        Ok(Header {
            label,
            property_names,
        })
    }

    pub fn read_value(&mut self) -> Result<Value> {
        match self.read_u8()? {
            TAG_NULL => Ok(Value::Null),
            TAG_BOOL => Ok(Value::Bool(self.read_u8()? != 0)),
            TAG_NUMBER => Ok(Value::Number(f64::from_le_bytes(self.read_array::<8>()?))),
            TAG_INTEGER => Ok(Value::Integer(i64::from_le_bytes(self.read_array::<8>()?))),
            TAG_STRING => Ok(Value::String(self.read_cstr()?)),
            tag => Err(ImportError::Protocol(format!(
                "unknown type tag {} at offset {}",
                tag,
                self.pos - 1
            ))),
        }
    }

    pub fn read_node(&mut self, prop_count: usize) -> Result<Vec<Value>> {
        (0..prop_count).map(|_| self.read_value()).collect()
    }

    pub fn read_edge(&mut self, prop_count: usize) -> Result<EdgeRecord> {
        let src = u64::from_le_bytes(self.read_array::<8>()?);
        let dst = u64::from_le_bytes(self.read_array::<8>()?);
        let values = self.read_node(prop_count)?;
        Ok(EdgeRecord { src, dst, values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let mut buf = Vec::new();
        write_header(&mut buf, "Person", &["name", "age"]);
        let mut expected = b"Person\0".to_vec();
        expected.extend_from_slice(&2u32.to_le_bytes());
        expected.extend_from_slice(b"name\0age\0");
        assert_eq!(buf, expected);
    }

    #[test]
    fn test_header_roundtrip() {
        let mut buf = Vec::new();
        write_header(&mut buf, "Person", &["id", "name", "age"]);
        let header = Decoder::new(&buf).read_header().unwrap();
        assert_eq!(header.label, "Person");
        assert_eq!(header.property_names, vec!["id", "name", "age"]);
    }

    #[test]
    fn test_header_without_properties() {
        let mut buf = Vec::new();
        write_header::<&str>(&mut buf, "KNOWS", &[]);
        assert_eq!(buf.len(), "KNOWS".len() + 1 + 4);
        let mut dec = Decoder::new(&buf);
        assert!(dec.read_header().unwrap().property_names.is_empty());
        assert!(dec.is_empty());
    }

    #[test]
    fn test_value_payloads() {
        let mut buf = Vec::new();
        write_value(&mut buf, &Value::Bool(true));
        assert_eq!(buf, vec![TAG_BOOL, 1]);

        buf.clear();
        write_value(&mut buf, &Value::Number(1.5));
        assert_eq!(buf[0], TAG_NUMBER);
        assert_eq!(&buf[1..], &1.5f64.to_le_bytes());

        buf.clear();
        write_value(&mut buf, &Value::Integer(-2));
        assert_eq!(buf[0], TAG_INTEGER);
        assert_eq!(&buf[1..], &(-2i64).to_le_bytes());

        buf.clear();
        write_value(&mut buf, &Value::String("ab".into()));
        assert_eq!(buf, vec![TAG_STRING, b'a', b'b', 0]);

        buf.clear();
        write_value(&mut buf, &Value::Null);
        assert_eq!(buf, vec![TAG_NULL]);
    }

    #[test]
    fn test_node_properties_roundtrip() {
        let props = vec![
            Property::new("name", "alice"),
            Property::new("age", 30.0),
            Property::new("active", false),
            Property::new("visits", 7i64),
        ];
        let mut buf = Vec::new();
        write_properties(&mut buf, &props);

        let values = Decoder::new(&buf).read_node(props.len()).unwrap();
        let expected: Vec<Value> = props.into_iter().map(|p| p.value).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn test_edge_record_roundtrip() {
        let mut buf = Vec::new();
        write_edge(&mut buf, 3, 9, &[Property::new("since", 2020i64)]);
        assert_eq!(&buf[0..8], &3u64.to_le_bytes());
        assert_eq!(&buf[8..16], &9u64.to_le_bytes());

        let rec = Decoder::new(&buf).read_edge(1).unwrap();
        assert_eq!(rec.src, 3);
        assert_eq!(rec.dst, 9);
        assert_eq!(rec.values, vec![Value::Integer(2020)]);
    }

    #[test]
    fn test_truncated_and_bad_tag() {
        let err = Decoder::new(&[TAG_NUMBER, 1, 2]).read_value().unwrap_err();
        assert!(err.to_string().contains("truncated"));

        let err = Decoder::new(&[9]).read_value().unwrap_err();
        assert!(err.to_string().contains("unknown type tag 9"));

        let err = Decoder::new(b"abc").read_header().unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }
}
