//! Thrift binary protocol primitives.
//!
//! Strict binary encoding as spoken by Cassandra's Thrift interface:
//! big-endian integers, i32-length-prefixed strings, `(type, id)` field
//! headers terminated by a STOP byte.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{CqlError, CqlResult};

/// Strict protocol version marker, OR'ed with the message type.
const VERSION_1: u32 = 0x8001_0000;
const VERSION_MASK: u32 = 0xffff_0000;

/// Refuse to allocate for absurd lengths read off the wire.
const MAX_LENGTH: usize = 64 * 1024 * 1024;

/// Deepest container nesting `skip` will follow.
const MAX_SKIP_DEPTH: usize = 64;

/// Thrift wire types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TType {
    Stop = 0,
    Bool = 2,
    Byte = 3,
    Double = 4,
    I16 = 6,
    I32 = 8,
    I64 = 10,
    String = 11,
    Struct = 12,
    Map = 13,
    Set = 14,
    List = 15,
}

impl TType {
    fn from_u8(b: u8) -> CqlResult<TType> {
        Ok(match b {
            0 => TType::Stop,
            2 => TType::Bool,
            3 => TType::Byte,
            4 => TType::Double,
            6 => TType::I16,
            8 => TType::I32,
            10 => TType::I64,
            11 => TType::String,
            12 => TType::Struct,
            13 => TType::Map,
            14 => TType::Set,
            15 => TType::List,
            other => return Err(CqlError::protocol(format!("unknown thrift type {}", other))),
        })
    }
}

/// Thrift message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Call = 1,
    Reply = 2,
    Exception = 3,
    Oneway = 4,
}

/// Message header: name, kind and sequence id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub name: String,
    pub kind: MessageType,
    pub seqid: i32,
}

/// Encodes Thrift values into a buffer.
pub struct ThriftWriter<'a> {
    buf: &'a mut BytesMut,
}

impl<'a> ThriftWriter<'a> {
    pub fn new(buf: &'a mut BytesMut) -> Self {
        Self { buf }
    }

    pub fn message_begin(&mut self, name: &str, kind: MessageType, seqid: i32) {
        self.buf.put_u32(VERSION_1 | kind as u32);
        self.string(name);
        self.buf.put_i32(seqid);
    }

    pub fn field(&mut self, ttype: TType, id: i16) {
        self.buf.put_u8(ttype as u8);
        self.buf.put_i16(id);
    }

    pub fn field_stop(&mut self) {
        self.buf.put_u8(TType::Stop as u8);
    }

    pub fn bool(&mut self, v: bool) {
        self.buf.put_u8(v as u8);
    }

    pub fn i32(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn i64(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    pub fn double(&mut self, v: f64) {
        self.buf.put_f64(v);
    }

    pub fn binary(&mut self, v: &[u8]) {
        self.buf.put_i32(v.len() as i32);
        self.buf.put_slice(v);
    }

    pub fn string(&mut self, v: &str) {
        self.binary(v.as_bytes());
    }

    pub fn list_begin(&mut self, elem: TType, size: usize) {
        self.buf.put_u8(elem as u8);
        self.buf.put_i32(size as i32);
    }

    pub fn map_begin(&mut self, key: TType, value: TType, size: usize) {
        self.buf.put_u8(key as u8);
        self.buf.put_u8(value as u8);
        self.buf.put_i32(size as i32);
    }
}

/// Decodes Thrift values from a byte slice.
pub struct ThriftReader<'a> {
    buf: &'a [u8],
}

impl<'a> ThriftReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, n: usize) -> CqlResult<()> {
        if self.buf.remaining() < n {
            return Err(CqlError::protocol(format!(
                "truncated message: need {} bytes, have {}",
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub fn message_begin(&mut self) -> CqlResult<MessageHeader> {
        let word = self.u32()?;
        if word & VERSION_MASK != VERSION_1 {
            return Err(CqlError::protocol(format!("bad thrift version word {:#x}", word)));
        }
        let kind = match word & 0xff {
            1 => MessageType::Call,
            2 => MessageType::Reply,
            3 => MessageType::Exception,
            4 => MessageType::Oneway,
            other => return Err(CqlError::protocol(format!("bad message type {}", other))),
        };
        let name = self.string()?;
        let seqid = self.i32()?;
        Ok(MessageHeader { name, kind, seqid })
    }

    /// Next field header, or `None` at STOP.
    pub fn field(&mut self) -> CqlResult<Option<(TType, i16)>> {
        let ttype = TType::from_u8(self.u8()?)?;
        if ttype == TType::Stop {
            return Ok(None);
        }
        let id = self.i16()?;
        Ok(Some((ttype, id)))
    }

    fn u8(&mut self) -> CqlResult<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn u32(&mut self) -> CqlResult<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn bool(&mut self) -> CqlResult<bool> {
        Ok(self.u8()? != 0)
    }

    pub fn i16(&mut self) -> CqlResult<i16> {
        self.need(2)?;
        Ok(self.buf.get_i16())
    }

    pub fn i32(&mut self) -> CqlResult<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn i64(&mut self) -> CqlResult<i64> {
        self.need(8)?;
        Ok(self.buf.get_i64())
    }

    pub fn double(&mut self) -> CqlResult<f64> {
        self.need(8)?;
        Ok(self.buf.get_f64())
    }

    pub fn binary(&mut self) -> CqlResult<Vec<u8>> {
        let len = self.length()?;
        self.need(len)?;
        let out = self.buf[..len].to_vec();
        self.buf.advance(len);
        Ok(out)
    }

    pub fn string(&mut self) -> CqlResult<String> {
        String::from_utf8(self.binary()?)
            .map_err(|e| CqlError::protocol(format!("invalid UTF-8 in thrift string: {}", e)))
    }

    /// Element type and size.
    pub fn list_begin(&mut self) -> CqlResult<(TType, usize)> {
        let elem = TType::from_u8(self.u8()?)?;
        let size = self.length()?;
        Ok((elem, size))
    }

    /// Key type, value type and size.
    pub fn map_begin(&mut self) -> CqlResult<(TType, TType, usize)> {
        let key = TType::from_u8(self.u8()?)?;
        let value = TType::from_u8(self.u8()?)?;
        let size = self.length()?;
        Ok((key, value, size))
    }

    fn length(&mut self) -> CqlResult<usize> {
        let len = self.i32()?;
        if len < 0 || len as usize > MAX_LENGTH {
            return Err(CqlError::protocol(format!("bad length {}", len)));
        }
        Ok(len as usize)
    }

    /// Skip a value of the given type, recursing into containers.
    pub fn skip(&mut self, ttype: TType) -> CqlResult<()> {
        self.skip_nested(ttype, 0)
    }

    fn skip_nested(&mut self, ttype: TType, depth: usize) -> CqlResult<()> {
        if depth > MAX_SKIP_DEPTH {
            return Err(CqlError::protocol(format!(
                "values nested deeper than {}",
                MAX_SKIP_DEPTH
            )));
        }

        match ttype {
            TType::Stop => Ok(()),
            TType::Bool | TType::Byte => self.u8().map(|_| ()),
            TType::I16 => self.i16().map(|_| ()),
            TType::I32 => self.i32().map(|_| ()),
            TType::I64 | TType::Double => self.i64().map(|_| ()),
            TType::String => {
                let len = self.length()?;
                self.need(len)?;
                self.buf.advance(len);
                Ok(())
            }
            TType::Struct => {
                while let Some((t, _)) = self.field()? {
                    self.skip_nested(t, depth + 1)?;
                }
                Ok(())
            }
            TType::Map => {
                let (k, v, size) = self.map_begin()?;
                for _ in 0..size {
                    self.skip_nested(k, depth + 1)?;
                    self.skip_nested(v, depth + 1)?;
                }
                Ok(())
            }
            TType::Set | TType::List => {
                let (elem, size) = self.list_begin()?;
                for _ in 0..size {
                    self.skip_nested(elem, depth + 1)?;
                }
                Ok(())
            }
        }
    }
}
