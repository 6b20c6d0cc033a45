//! WOFF 1.0: sfnt tables individually zlib-compressed.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::sfnt::{checksum, padded, read_tag, read_u16, read_u32, Sfnt, Table};
use super::FontError;

pub const SIGNATURE: u32 = u32::from_be_bytes(*b"wOFF");

const HEADER_LEN: usize = 44;
const ENTRY_LEN: usize = 20;

/// Encode an sfnt as WOFF 1.0.
pub fn encode(font: &Sfnt) -> Result<Vec<u8>, FontError> {
    let mut entries = Vec::with_capacity(font.tables.len());
    for table in &font.tables {
        let compressed = compress(&table.data)?;
        // Tables that don't shrink are stored as-is.
        let stored = if compressed.len() < table.data.len() {
            compressed
        } else {
            table.data.clone()
        };
        entries.push((table, stored));
    }

    let mut offset = HEADER_LEN + ENTRY_LEN * entries.len();
    let mut directory = Vec::with_capacity(ENTRY_LEN * entries.len());
    for (table, stored) in &entries {
        directory.extend_from_slice(&table.tag);
        directory.extend_from_slice(&(offset as u32).to_be_bytes());
        directory.extend_from_slice(&(stored.len() as u32).to_be_bytes());
        directory.extend_from_slice(&(table.data.len() as u32).to_be_bytes());
        directory.extend_from_slice(&table_checksum(table).to_be_bytes());
        offset += padded(stored.len());
    }
    let total_len = offset;

    let mut out = Vec::with_capacity(total_len);
    out.extend_from_slice(&SIGNATURE.to_be_bytes());
    out.extend_from_slice(&font.flavor.to_be_bytes());
    out.extend_from_slice(&(total_len as u32).to_be_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&(font.total_size() as u32).to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes()); // majorVersion
    out.extend_from_slice(&0u16.to_be_bytes()); // minorVersion
    out.extend_from_slice(&[0u8; 20]); // no metadata or private block
    out.extend_from_slice(&directory);

    for (_, stored) in &entries {
        out.extend_from_slice(stored);
        out.resize(padded(out.len()), 0);
    }

    Ok(out)
}

/// Decode WOFF 1.0 back to an sfnt.
pub fn decode(data: &[u8]) -> Result<Sfnt, FontError> {
    if read_u32(data, 0)? != SIGNATURE {
        return Err(FontError::BadSignature);
    }
    let flavor = read_u32(data, 4)?;
    let num_tables = read_u16(data, 12)? as usize;

    let mut tables = Vec::with_capacity(num_tables);
    for i in 0..num_tables {
        let entry = HEADER_LEN + i * ENTRY_LEN;
        let tag = read_tag(data, entry)?;
        let offset = read_u32(data, entry + 4)? as usize;
        let comp_len = read_u32(data, entry + 8)? as usize;
        let orig_len = read_u32(data, entry + 12)? as usize;

        let stored = data
            .get(offset..offset + comp_len)
            .ok_or(FontError::Truncated)?;
        let bytes = if comp_len < orig_len {
            let mut out = Vec::with_capacity(orig_len);
            ZlibDecoder::new(stored).read_to_end(&mut out)?;
            out
        } else {
            stored.to_vec()
        };
        if bytes.len() != orig_len {
            return Err(FontError::Truncated);
        }

        tables.push(Table { tag, data: bytes });
    }

    Ok(Sfnt::new(flavor, tables))
}

fn compress(data: &[u8]) -> Result<Vec<u8>, FontError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn table_checksum(table: &Table) -> u32 {
    if &table.tag == b"head" && table.data.len() >= 12 {
        let mut data = table.data.clone();
        data[8..12].fill(0);
        checksum(&data)
    } else {
        checksum(&table.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::sfnt::sample_font;

    #[test]
    fn decodes_what_it_encodes() {
        let font = Sfnt::parse(&sample_font(5)).unwrap();

        let woff = encode(&font).unwrap();

        assert_eq!(read_u32(&woff, 0).unwrap(), SIGNATURE);
        assert_eq!(read_u32(&woff, 8).unwrap() as usize, woff.len());
        assert_eq!(decode(&woff).unwrap(), font);
    }

    #[test]
    fn compresses_repetitive_tables() {
        let bytes = sample_font(5);
        let woff = encode(&Sfnt::parse(&bytes).unwrap()).unwrap();
        assert!(woff.len() < bytes.len() + HEADER_LEN);
    }

    #[test]
    fn rejects_other_signatures() {
        assert!(matches!(decode(&sample_font(1)), Err(FontError::BadSignature)));
    }
}
