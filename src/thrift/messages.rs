//! Cassandra Thrift structs and the four calls the driver makes.
//!
//! Field ids follow `cassandra.thrift`. Unknown fields are skipped so newer
//! servers with extra CfDef options still decode.

use std::collections::HashMap;

use bytes::BytesMut;

use super::protocol::{TType, ThriftReader, ThriftWriter};
use crate::error::{ApplicationException, CqlError, CqlResult};

/// `Compression` enum of `execute_cql_query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip = 1,
    None = 2,
}

/// `CqlResultType` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CqlResultType {
    Rows = 1,
    Void = 2,
    Int = 3,
}

impl CqlResultType {
    pub fn from_i32(tag: i32) -> Option<CqlResultType> {
        match tag {
            1 => Some(CqlResultType::Rows),
            2 => Some(CqlResultType::Void),
            3 => Some(CqlResultType::Int),
            _ => None,
        }
    }
}

/// `AuthenticationRequest { 1: map<string,string> credentials }`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthenticationRequest {
    pub credentials: HashMap<String, String>,
}

impl AuthenticationRequest {
    pub fn new(user: &str, password: &str) -> Self {
        let mut credentials = HashMap::new();
        credentials.insert("username".to_string(), user.to_string());
        credentials.insert("password".to_string(), password.to_string());
        Self { credentials }
    }
}

/// `ColumnDef`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: Vec<u8>,
    pub validation_class: String,
}

/// `CfDef`, reduced to what decoding needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CfDef {
    pub keyspace: String,
    pub name: String,
    pub comparator_type: String,
    pub default_validation_class: String,
    pub key_validation_class: String,
    pub column_metadata: Vec<ColumnDef>,
}

/// `KsDef`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KsDef {
    pub name: String,
    pub strategy_class: String,
    pub cf_defs: Vec<CfDef>,
}

/// `Column`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThriftColumn {
    pub name: Vec<u8>,
    pub value: Option<Vec<u8>>,
    pub timestamp: Option<i64>,
    pub ttl: Option<i32>,
}

/// `CqlRow`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CqlRow {
    pub key: Vec<u8>,
    pub columns: Vec<ThriftColumn>,
}

/// `CqlResult`. `kind` is the raw tag so unrecognised shapes survive to the
/// caller as an error instead of a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CqlReply {
    pub kind: i32,
    pub rows: Vec<CqlRow>,
    pub num: Option<i32>,
}

// ========== Call arguments ==========

pub fn write_login_args(w: &mut ThriftWriter<'_>, auth: &AuthenticationRequest) {
    w.field(TType::Struct, 1);
    w.field(TType::Map, 1);
    w.map_begin(TType::String, TType::String, auth.credentials.len());
    for (k, v) in &auth.credentials {
        w.string(k);
        w.string(v);
    }
    w.field_stop();
    w.field_stop();
}

pub fn write_keyspace_args(w: &mut ThriftWriter<'_>, keyspace: &str) {
    w.field(TType::String, 1);
    w.string(keyspace);
    w.field_stop();
}

pub fn write_execute_cql_args(w: &mut ThriftWriter<'_>, query: &[u8], compression: Compression) {
    w.field(TType::String, 1);
    w.binary(query);
    w.field(TType::I32, 2);
    w.i32(compression as i32);
    w.field_stop();
}

/// Encode a complete call message (without framing).
pub fn encode_call(
    method: &str,
    seqid: i32,
    args: impl FnOnce(&mut ThriftWriter<'_>),
) -> BytesMut {
    let mut buf = BytesMut::with_capacity(256);
    let mut w = ThriftWriter::new(&mut buf);
    w.message_begin(method, super::protocol::MessageType::Call, seqid);
    args(&mut w);
    buf
}

// ========== Results ==========

/// `login` result: void, or AuthenticationException (1) / AuthorizationException (2).
pub fn read_login_result(r: &mut ThriftReader<'_>, addr: &str) -> CqlResult<()> {
    use crate::error::ConnectError;
    while let Some((ttype, id)) = r.field()? {
        match (id, ttype) {
            (1, TType::Struct) => {
                let why = read_why(r)?;
                return Err(ConnectError::Authentication { addr: addr.to_string(), why }.into());
            }
            (2, TType::Struct) => {
                let why = read_why(r)?;
                return Err(ConnectError::Authorization { addr: addr.to_string(), why }.into());
            }
            _ => r.skip(ttype)?,
        }
    }
    Ok(())
}

/// `set_keyspace` result: void or InvalidRequestException (1).
pub fn read_set_keyspace_result(r: &mut ThriftReader<'_>) -> CqlResult<()> {
    while let Some((ttype, id)) = r.field()? {
        match (id, ttype) {
            (1, TType::Struct) => {
                return Err(ApplicationException::InvalidRequest(read_why(r)?).into());
            }
            _ => r.skip(ttype)?,
        }
    }
    Ok(())
}

/// `describe_keyspace` result: KsDef (0), NotFoundException (1) or
/// InvalidRequestException (2).
pub fn read_describe_keyspace_result(
    r: &mut ThriftReader<'_>,
    addr: &str,
    keyspace: &str,
) -> CqlResult<KsDef> {
    let mut success = None;
    while let Some((ttype, id)) = r.field()? {
        match (id, ttype) {
            (0, TType::Struct) => success = Some(read_ks_def(r)?),
            (1, TType::Struct) => {
                r.skip(ttype)?;
                return Err(crate::error::ConnectError::KeyspaceNotFound {
                    addr: addr.to_string(),
                    keyspace: keyspace.to_string(),
                }
                .into());
            }
            (2, TType::Struct) => {
                return Err(ApplicationException::InvalidRequest(read_why(r)?).into());
            }
            _ => r.skip(ttype)?,
        }
    }
    success.ok_or_else(|| CqlError::protocol("describe_keyspace returned no result"))
}

/// `execute_cql_query` result: CqlResult (0) or one of the four application
/// exceptions. `None` when the server sent neither.
pub fn read_execute_cql_result(r: &mut ThriftReader<'_>) -> CqlResult<Option<CqlReply>> {
    let mut success = None;
    while let Some((ttype, id)) = r.field()? {
        match (id, ttype) {
            (0, TType::Struct) => success = Some(read_cql_reply(r)?),
            (1, TType::Struct) => {
                return Err(ApplicationException::InvalidRequest(read_why(r)?).into());
            }
            (2, TType::Struct) => {
                r.skip(ttype)?;
                return Err(ApplicationException::Unavailable.into());
            }
            (3, TType::Struct) => {
                r.skip(ttype)?;
                return Err(ApplicationException::Timeout.into());
            }
            (4, TType::Struct) => {
                r.skip(ttype)?;
                return Err(ApplicationException::SchemaDisagreement.into());
            }
            _ => r.skip(ttype)?,
        }
    }
    Ok(success)
}

/// `TApplicationException { 1: string message, 2: i32 type }`
pub fn read_application_exception(r: &mut ThriftReader<'_>) -> CqlResult<String> {
    let mut message = String::new();
    let mut kind = 0;
    while let Some((ttype, id)) = r.field()? {
        match (id, ttype) {
            (1, TType::String) => message = r.string()?,
            (2, TType::I32) => kind = r.i32()?,
            _ => r.skip(ttype)?,
        }
    }
    Ok(format!("{} (type {})", message, kind))
}

/// Exceptions carrying `1: string why`; others come back empty.
fn read_why(r: &mut ThriftReader<'_>) -> CqlResult<String> {
    let mut why = String::new();
    while let Some((ttype, id)) = r.field()? {
        match (id, ttype) {
            (1, TType::String) => why = r.string()?,
            _ => r.skip(ttype)?,
        }
    }
    Ok(why)
}

fn read_ks_def(r: &mut ThriftReader<'_>) -> CqlResult<KsDef> {
    let mut ks = KsDef::default();
    while let Some((ttype, id)) = r.field()? {
        match (id, ttype) {
            (1, TType::String) => ks.name = r.string()?,
            (2, TType::String) => ks.strategy_class = r.string()?,
            (5, TType::List) => {
                let (elem, size) = r.list_begin()?;
                for _ in 0..size {
                    if elem == TType::Struct {
                        ks.cf_defs.push(read_cf_def(r)?);
                    } else {
                        r.skip(elem)?;
                    }
                }
            }
            _ => r.skip(ttype)?,
        }
    }
    Ok(ks)
}

fn read_cf_def(r: &mut ThriftReader<'_>) -> CqlResult<CfDef> {
    let mut cf = CfDef::default();
    while let Some((ttype, id)) = r.field()? {
        match (id, ttype) {
            (1, TType::String) => cf.keyspace = r.string()?,
            (2, TType::String) => cf.name = r.string()?,
            (5, TType::String) => cf.comparator_type = r.string()?,
            (13, TType::List) => {
                let (elem, size) = r.list_begin()?;
                for _ in 0..size {
                    if elem == TType::Struct {
                        cf.column_metadata.push(read_column_def(r)?);
                    } else {
                        r.skip(elem)?;
                    }
                }
            }
            (15, TType::String) => cf.default_validation_class = r.string()?,
            (26, TType::String) => cf.key_validation_class = r.string()?,
            _ => r.skip(ttype)?,
        }
    }
    Ok(cf)
}

fn read_column_def(r: &mut ThriftReader<'_>) -> CqlResult<ColumnDef> {
    let mut col = ColumnDef::default();
    while let Some((ttype, id)) = r.field()? {
        match (id, ttype) {
            (1, TType::String) => col.name = r.binary()?,
            (2, TType::String) => col.validation_class = r.string()?,
            _ => r.skip(ttype)?,
        }
    }
    Ok(col)
}

fn read_cql_reply(r: &mut ThriftReader<'_>) -> CqlResult<CqlReply> {
    let mut reply = CqlReply::default();
    while let Some((ttype, id)) = r.field()? {
        match (id, ttype) {
            (1, TType::I32) => reply.kind = r.i32()?,
            (2, TType::List) => {
                let (elem, size) = r.list_begin()?;
                for _ in 0..size {
                    if elem == TType::Struct {
                        reply.rows.push(read_cql_row(r)?);
                    } else {
                        r.skip(elem)?;
                    }
                }
            }
            (3, TType::I32) => reply.num = Some(r.i32()?),
            _ => r.skip(ttype)?,
        }
    }
    Ok(reply)
}

fn read_cql_row(r: &mut ThriftReader<'_>) -> CqlResult<CqlRow> {
    let mut row = CqlRow::default();
    while let Some((ttype, id)) = r.field()? {
        match (id, ttype) {
            (1, TType::String) => row.key = r.binary()?,
            (2, TType::List) => {
                let (elem, size) = r.list_begin()?;
                for _ in 0..size {
                    if elem == TType::Struct {
                        row.columns.push(read_column(r)?);
                    } else {
                        r.skip(elem)?;
                    }
                }
            }
            _ => r.skip(ttype)?,
        }
    }
    Ok(row)
}

fn read_column(r: &mut ThriftReader<'_>) -> CqlResult<ThriftColumn> {
    let mut col = ThriftColumn::default();
    while let Some((ttype, id)) = r.field()? {
        match (id, ttype) {
            (1, TType::String) => col.name = r.binary()?,
            (2, TType::String) => col.value = Some(r.binary()?),
            (3, TType::I64) => col.timestamp = Some(r.i64()?),
            (4, TType::I32) => col.ttl = Some(r.i32()?),
            _ => r.skip(ttype)?,
        }
    }
    Ok(col)
}

// ========== Server-side encoders ==========
//
// The mirror image of the readers above, used by the in-memory server in
// the transport tests.

#[cfg(test)]
pub(crate) fn write_cql_reply(w: &mut ThriftWriter<'_>, reply: &CqlReply) {
    w.field(TType::Struct, 0);
    w.field(TType::I32, 1);
    w.i32(reply.kind);
    if !reply.rows.is_empty() {
        w.field(TType::List, 2);
        w.list_begin(TType::Struct, reply.rows.len());
        for row in &reply.rows {
            w.field(TType::String, 1);
            w.binary(&row.key);
            w.field(TType::List, 2);
            w.list_begin(TType::Struct, row.columns.len());
            for col in &row.columns {
                w.field(TType::String, 1);
                w.binary(&col.name);
                if let Some(value) = &col.value {
                    w.field(TType::String, 2);
                    w.binary(value);
                }
                if let Some(ts) = col.timestamp {
                    w.field(TType::I64, 3);
                    w.i64(ts);
                }
                w.field_stop();
            }
            w.field_stop();
        }
    }
    if let Some(num) = reply.num {
        w.field(TType::I32, 3);
        w.i32(num);
    }
    w.field_stop();
    w.field_stop();
}

#[cfg(test)]
pub(crate) fn write_ks_def(w: &mut ThriftWriter<'_>, ks: &KsDef) {
    w.field(TType::Struct, 0);
    w.field(TType::String, 1);
    w.string(&ks.name);
    w.field(TType::String, 2);
    w.string(&ks.strategy_class);
    // replication_factor, deprecated; readers must skip it
    w.field(TType::I32, 4);
    w.i32(1);
    w.field(TType::List, 5);
    w.list_begin(TType::Struct, ks.cf_defs.len());
    for cf in &ks.cf_defs {
        w.field(TType::String, 1);
        w.string(&cf.keyspace);
        w.field(TType::String, 2);
        w.string(&cf.name);
        w.field(TType::String, 5);
        w.string(&cf.comparator_type);
        w.field(TType::List, 13);
        w.list_begin(TType::Struct, cf.column_metadata.len());
        for col in &cf.column_metadata {
            w.field(TType::String, 1);
            w.binary(&col.name);
            w.field(TType::String, 2);
            w.string(&col.validation_class);
            w.field_stop();
        }
        w.field(TType::Double, 9);
        w.double(0.0);
        w.field(TType::String, 15);
        w.string(&cf.default_validation_class);
        w.field(TType::String, 26);
        w.string(&cf.key_validation_class);
        w.field_stop();
    }
    w.field_stop();
    w.field_stop();
}
