//! Document ⇄ bytes pipeline: JSON serialization plus optional DEFLATE.

use crate::document::DatabaseDocument;
use crate::error::{CodecError, CodecResult};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Encodes a document to bytes: JSON, then optional zlib/DEFLATE.
pub fn encode_document(doc: &DatabaseDocument, compress: bool) -> CodecResult<Vec<u8>> {
    let json = serde_json::to_vec_pretty(doc)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;

    if !compress {
        return Ok(json);
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .and_then(|()| encoder.finish())
        .map_err(|e| CodecError::compression_failed(e.to_string()))
}

/// Decodes bytes back into a document: optional zlib/DEFLATE, then JSON.
pub fn decode_document(bytes: &[u8], compressed: bool) -> CodecResult<DatabaseDocument> {
    let json;
    let json_bytes: &[u8] = if compressed {
        let mut decoder = ZlibDecoder::new(bytes);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CodecError::compression_failed(e.to_string()))?;
        json = out;
        &json
    } else {
        bytes
    };

    serde_json::from_slice(json_bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ColumnData, RecordDocument, TableDocument};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn sample_document() -> DatabaseDocument {
        let mut data = ColumnData::new();
        data.insert("product".into(), json!("Laptop"));
        data.insert("price".into(), json!(1200));

        let mut tables = BTreeMap::new();
        tables.insert(
            "orders".to_string(),
            TableDocument {
                name: "orders".into(),
                columns: vec!["product".into(), "price".into()],
                records: vec![RecordDocument { id: 1, data }],
                next_id: 2,
                constraints: BTreeMap::new(),
            },
        );
        DatabaseDocument {
            name: "shop".into(),
            tables,
        }
    }

    #[test]
    fn roundtrip_plain() {
        let doc = sample_document();
        let bytes = encode_document(&doc, false).unwrap();
        let decoded = decode_document(&bytes, false).unwrap();
        assert_eq!(doc, decoded);
    }

    #[test]
    fn roundtrip_compressed() {
        let doc = sample_document();
        let bytes = encode_document(&doc, true).unwrap();
        let decoded = decode_document(&bytes, true).unwrap();
        assert_eq!(doc, decoded);
    }

    #[test]
    fn compressed_output_is_not_json() {
        let doc = sample_document();
        let bytes = encode_document(&doc, true).unwrap();
        assert_ne!(bytes.first(), Some(&b'{'));
    }

    #[test]
    fn garbage_input_is_rejected() {
        assert!(decode_document(b"not json", false).is_err());
        assert!(decode_document(b"not zlib either", true).is_err());
    }

    #[test]
    fn wrong_compression_flag_fails() {
        let doc = sample_document();
        let plain = encode_document(&doc, false).unwrap();
        assert!(decode_document(&plain, true).is_err());
    }
}
