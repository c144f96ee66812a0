//! MessagePack reader producing `serde_json::Value`.
//!
//! Handles the producer's extensions on top of plain MessagePack:
//! - maps always become objects (non-string keys are stringified)
//! - integers beyond +/-(2^53 - 1) become floats
//! - ext `-1` timestamps become epoch milliseconds
//! - ext `0x62` opens a string bundle; `0xc1` + length then slices from it
//!   (positive length: latin bundle by bytes, negative: wide bundle by UTF-16 units)

use rmp::Marker;
use serde_json::{Map, Number, Value};

use super::DecodeError;

const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;
const EXT_TIMESTAMP: i8 = -1;
const EXT_BUNDLE: i8 = 0x62;

struct Bundle {
    wide: Vec<u16>,
    wide_pos: usize,
    latin: String,
    latin_pos: usize,
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    bundle: Option<Bundle>,
}

pub fn unpack(bytes: &[u8]) -> Result<Value, DecodeError> {
    let mut reader = Reader {
        buf: bytes,
        pos: 0,
        bundle: None,
    };
    reader.read()
}

fn int_u64(v: u64) -> Value {
    if v <= MAX_SAFE_INTEGER {
        Value::from(v)
    } else {
        float(v as f64)
    }
}

fn int_i64(v: i64) -> Value {
    if v.unsigned_abs() <= MAX_SAFE_INTEGER {
        Value::from(v)
    } else {
        float(v as f64)
    }
}

/// Non-finite floats have no JSON form and read as null.
fn float(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

fn key_string(key: Value) -> String {
    match key {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

impl<'a> Reader<'a> {
    fn error(&self, at: usize, reason: impl Into<String>) -> DecodeError {
        DecodeError::Unpack {
            offset: at,
            reason: reason.into(),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                self.error(
                    self.pos,
                    format!("need {} bytes, {} left", n, self.buf.len().saturating_sub(self.pos)),
                )
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn be<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn len8(&mut self) -> Result<usize, DecodeError> {
        Ok(u8::from_be_bytes(self.be()?) as usize)
    }

    fn len16(&mut self) -> Result<usize, DecodeError> {
        Ok(u16::from_be_bytes(self.be()?) as usize)
    }

    fn len32(&mut self) -> Result<usize, DecodeError> {
        Ok(u32::from_be_bytes(self.be()?) as usize)
    }

    fn read(&mut self) -> Result<Value, DecodeError> {
        let at = self.pos;
        let [byte] = self.be::<1>()?;
        match Marker::from_u8(byte) {
            Marker::FixPos(n) => Ok(Value::from(n)),
            Marker::FixNeg(n) => Ok(Value::from(n)),
            Marker::Null => Ok(Value::Null),
            Marker::True => Ok(Value::Bool(true)),
            Marker::False => Ok(Value::Bool(false)),
            Marker::U8 => Ok(Value::from(u8::from_be_bytes(self.be()?))),
            Marker::U16 => Ok(Value::from(u16::from_be_bytes(self.be()?))),
            Marker::U32 => Ok(Value::from(u32::from_be_bytes(self.be()?))),
            Marker::U64 => Ok(int_u64(u64::from_be_bytes(self.be()?))),
            Marker::I8 => Ok(Value::from(i8::from_be_bytes(self.be()?))),
            Marker::I16 => Ok(Value::from(i16::from_be_bytes(self.be()?))),
            Marker::I32 => Ok(Value::from(i32::from_be_bytes(self.be()?))),
            Marker::I64 => Ok(int_i64(i64::from_be_bytes(self.be()?))),
            Marker::F32 => Ok(float(f32::from_be_bytes(self.be()?) as f64)),
            Marker::F64 => Ok(float(f64::from_be_bytes(self.be()?))),
            Marker::FixStr(n) => self.str(n as usize),
            Marker::Str8 => {
                let n = self.len8()?;
                self.str(n)
            }
            Marker::Str16 => {
                let n = self.len16()?;
                self.str(n)
            }
            Marker::Str32 => {
                let n = self.len32()?;
                self.str(n)
            }
            Marker::Bin8 => {
                let n = self.len8()?;
                self.bin(n)
            }
            Marker::Bin16 => {
                let n = self.len16()?;
                self.bin(n)
            }
            Marker::Bin32 => {
                let n = self.len32()?;
                self.bin(n)
            }
            Marker::FixArray(n) => self.array(n as usize),
            Marker::Array16 => {
                let n = self.len16()?;
                self.array(n)
            }
            Marker::Array32 => {
                let n = self.len32()?;
                self.array(n)
            }
            Marker::FixMap(n) => self.map(n as usize),
            Marker::Map16 => {
                let n = self.len16()?;
                self.map(n)
            }
            Marker::Map32 => {
                let n = self.len32()?;
                self.map(n)
            }
            Marker::FixExt1 => self.ext(1),
            Marker::FixExt2 => self.ext(2),
            Marker::FixExt4 => self.ext(4),
            Marker::FixExt8 => self.ext(8),
            Marker::FixExt16 => self.ext(16),
            Marker::Ext8 => {
                let n = self.len8()?;
                self.ext(n)
            }
            Marker::Ext16 => {
                let n = self.len16()?;
                self.ext(n)
            }
            Marker::Ext32 => {
                let n = self.len32()?;
                self.ext(n)
            }
            Marker::Reserved => self.bundled(at),
        }
    }

    fn str(&mut self, n: usize) -> Result<Value, DecodeError> {
        let at = self.pos;
        let bytes = self.take(n)?;
        std::str::from_utf8(bytes)
            .map(|s| Value::String(s.to_string()))
            .map_err(|e| self.error(at, format!("invalid utf-8 in string: {}", e)))
    }

    fn bin(&mut self, n: usize) -> Result<Value, DecodeError> {
        let bytes = self.take(n)?;
        Ok(Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()))
    }

    fn array(&mut self, n: usize) -> Result<Value, DecodeError> {
        // every element takes at least one byte
        let mut items = Vec::with_capacity(n.min(self.buf.len() - self.pos));
        for _ in 0..n {
            items.push(self.read()?);
        }
        Ok(Value::Array(items))
    }

    fn map(&mut self, n: usize) -> Result<Value, DecodeError> {
        let mut object = Map::new();
        for _ in 0..n {
            let key = key_string(self.read()?);
            let value = self.read()?;
            object.insert(key, value);
        }
        Ok(Value::Object(object))
    }

    fn ext(&mut self, n: usize) -> Result<Value, DecodeError> {
        let at = self.pos;
        let [kind] = self.be::<1>()?;
        let kind = kind as i8;
        let data_start = self.pos;
        let data = self.take(n)?;
        match kind {
            EXT_TIMESTAMP => timestamp_ms(data)
                .map(float)
                .ok_or_else(|| self.error(at, format!("timestamp with {} data bytes", n))),
            EXT_BUNDLE if n == 4 => {
                let size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
                self.open_bundle(data_start, size)
            }
            other => Err(self.error(at, format!("unsupported extension type {}", other))),
        }
    }

    /// The bundle header sits right before the value it covers; both strings live
    /// `size` bytes past the header data, after that value.
    fn open_bundle(&mut self, data_start: usize, size: usize) -> Result<Value, DecodeError> {
        let resume = self.pos;
        self.pos = data_start
            .checked_add(size)
            .filter(|p| *p <= self.buf.len())
            .ok_or_else(|| self.error(data_start, format!("bundle offset {} past end", size)))?;
        let wide = self.bundle_string()?;
        let latin = self.bundle_string()?;
        self.bundle = Some(Bundle {
            wide: wide.encode_utf16().collect(),
            wide_pos: 0,
            latin,
            latin_pos: 0,
        });
        self.pos = resume;
        self.read()
    }

    fn bundle_string(&mut self) -> Result<String, DecodeError> {
        let at = self.pos;
        match self.read()? {
            Value::String(s) => Ok(s),
            _ => Err(self.error(at, "bundle entry is not a string")),
        }
    }

    fn bundled(&mut self, at: usize) -> Result<Value, DecodeError> {
        if self.bundle.is_none() {
            return Err(self.error(at, "reserved marker 0xc1 outside a string bundle"));
        }
        let len = self
            .read()?
            .as_i64()
            .ok_or_else(|| self.error(at, "bundled string length is not an integer"))?;
        let Some(bundle) = self.bundle.as_mut() else {
            return Err(self.error(at, "string bundle closed"));
        };
        let sliced = if len > 0 {
            let end = bundle.latin_pos + len as usize;
            let text = bundle.latin.get(bundle.latin_pos..end).map(str::to_string);
            bundle.latin_pos = end;
            text
        } else {
            let end = bundle.wide_pos + len.unsigned_abs() as usize;
            let text = bundle
                .wide
                .get(bundle.wide_pos..end)
                .and_then(|units| String::from_utf16(units).ok());
            bundle.wide_pos = end;
            text
        };
        sliced
            .map(Value::String)
            .ok_or_else(|| self.error(at, format!("bundled string of length {} out of range", len)))
    }
}

fn timestamp_ms(data: &[u8]) -> Option<f64> {
    match data.len() {
        4 => {
            let secs = u32::from_be_bytes(data.try_into().ok()?);
            Some(secs as f64 * 1000.0)
        }
        8 => {
            let raw = u64::from_be_bytes(data.try_into().ok()?);
            let nanos = raw >> 34;
            let secs = raw & 0x3_ffff_ffff;
            Some(secs as f64 * 1000.0 + nanos as f64 / 1e6)
        }
        12 => {
            let nanos = u32::from_be_bytes(data[0..4].try_into().ok()?);
            let secs = i64::from_be_bytes(data[4..12].try_into().ok()?);
            Some(secs as f64 * 1000.0 + nanos as f64 / 1e6)
        }
        _ => None,
    }
}
