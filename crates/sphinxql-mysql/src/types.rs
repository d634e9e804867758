//! Column descriptors of text-protocol result sets.
//!
//! SphinxQL sends every value as text, so a result only needs the column
//! names; decoding happens later through `FromCell`.

use sphinxql_core::{Error, ProtocolError, Result};

use crate::protocol::PacketReader;

/// Width of the fixed block after the names: charset, column length,
/// type, flags and decimals.
const FIXED_FIELDS_LEN: usize = 2 + 4 + 1 + 2 + 1;

/// Column definition packet (protocol 4.1).
#[derive(Debug, Clone)]
pub struct ColumnDef {
    /// Column name or alias
    pub name: String,
}

fn missing(what: &str) -> Error {
    Error::Protocol(ProtocolError {
        message: format!("Truncated column definition: missing {}", what),
        raw_data: None,
    })
}

impl ColumnDef {
    /// Parse a column definition payload, checking that every field is
    /// present even though only the name is kept.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut reader = PacketReader::new(payload);
        for what in ["catalog", "schema", "table", "org_table"] {
            reader.read_lenenc_bytes().ok_or_else(|| missing(what))?;
        }
        let name = reader.read_lenenc_string().ok_or_else(|| missing("name"))?;
        reader
            .read_lenenc_bytes()
            .ok_or_else(|| missing("org_name"))?;

        // length of the fixed-size block, always 0x0c
        reader
            .read_lenenc_int()
            .ok_or_else(|| missing("fixed length"))?;
        if !reader.skip(FIXED_FIELDS_LEN) {
            return Err(missing("type and flags"));
        }

        Ok(Self { name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PacketWriter;

    fn column_payload(name: &str, column_type: u8) -> Vec<u8> {
        let mut writer = PacketWriter::new();
        for part in ["def", "", "idx", "idx", name, name] {
            writer.write_lenenc_string(part);
        }
        writer.write_u8(0x0c);
        writer.write_u16_le(33);
        writer.write_u32_le(255);
        writer.write_u8(column_type);
        writer.write_u16_le(0);
        writer.write_u8(0);
        writer.write_zeros(2);
        writer.into_bytes()
    }

    #[test]
    fn parses_column_definition() {
        let col = ColumnDef::parse(&column_payload("int_data", 0x03)).unwrap();
        assert_eq!(col.name, "int_data");
    }

    #[test]
    fn truncated_definition_is_a_protocol_error() {
        let payload = column_payload("json_data", 0xFE);
        let err = ColumnDef::parse(&payload[..payload.len() - 8]).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(err.to_string().contains("type and flags"));

        let err = ColumnDef::parse(&payload[..6]).unwrap_err();
        assert!(err.to_string().contains("missing table"));
    }
}
