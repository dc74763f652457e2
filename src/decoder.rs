//! Raw Thrift rows to decoded [`Row`]s.

use tracing::debug;

use crate::error::CqlResult;
use crate::row::{Column, Row, Rows};
use crate::schema::ColumnFamilySchema;
use crate::thrift::CqlRow;
use crate::validator::{DecodeOptions, Validator};

/// Raw name of the column CQL adds for the row key.
const KEY_SENTINEL: &[u8] = b"KEY";

/// Decodes the rows of one reply against one column family.
pub struct Decoder<'a> {
    family: &'a ColumnFamilySchema,
    options: DecodeOptions,
    count: bool,
}

impl<'a> Decoder<'a> {
    /// `count` decodes every value as a long, for `SELECT COUNT(...)`.
    pub fn new(family: &'a ColumnFamilySchema, options: DecodeOptions, count: bool) -> Self {
        Self {
            family,
            options,
            count,
        }
    }

    pub fn decode_row(&self, raw: &CqlRow) -> CqlResult<Row> {
        let key = self.family.key.decode(&raw.key, self.options)?;

        let mut columns = Vec::with_capacity(raw.columns.len());
        for col in &raw.columns {
            let value = match &col.value {
                Some(v) if !v.is_empty() => v,
                _ => continue,
            };
            if col.name == KEY_SENTINEL {
                continue;
            }

            let value = if self.count {
                Validator::Long.decode(value, self.options)?
            } else {
                self.family
                    .value_validator(&col.name)
                    .decode(value, self.options)?
            };

            columns.push(Column {
                name: self.family.comparator.decode(&col.name, self.options)?,
                value,
            });
        }

        Ok(Row::new(key, columns))
    }

    pub fn decode_rows(&self, raw: &[CqlRow]) -> CqlResult<Rows> {
        raw.iter()
            .map(|r| self.decode_row(r))
            .collect::<CqlResult<Vec<_>>>()
            .map(Rows::new)
    }
}

/// Decode a ROWS reply, falling back to raw bytes when the column family
/// is not in the schema cache.
pub fn decode_reply_rows(
    family: Option<&ColumnFamilySchema>,
    column_family: &str,
    raw: &[CqlRow],
    options: DecodeOptions,
    count: bool,
) -> CqlResult<Rows> {
    match family {
        Some(family) => Decoder::new(family, options, count).decode_rows(raw),
        None => {
            debug!(column_family, "column family not in schema cache; decoding as bytes");
            let bytes = ColumnFamilySchema::default();
            Decoder::new(&bytes, options, count).decode_rows(raw)
        }
    }
}
