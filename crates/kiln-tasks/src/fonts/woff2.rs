//! WOFF 2.0 with null table transforms.
//!
//! All tables are concatenated into one Brotli stream. `glyf`/`loca` are
//! stored untransformed (transform version 3), which every conforming
//! decoder accepts.

use std::io::{Read, Write};

use super::sfnt::{padded, read_tag, read_u16, read_u32, Sfnt, Table};
use super::FontError;

pub const SIGNATURE: u32 = u32::from_be_bytes(*b"wOF2");

const HEADER_LEN: usize = 48;

/// Tags with a one-byte directory encoding, by index.
const KNOWN_TAGS: [&[u8; 4]; 63] = [
    b"cmap", b"head", b"hhea", b"hmtx", b"maxp", b"name", b"OS/2", b"post", b"cvt ", b"fpgm",
    b"glyf", b"loca", b"prep", b"CFF ", b"VORG", b"EBDT", b"EBLC", b"gasp", b"hdmx", b"kern",
    b"LTSH", b"PCLT", b"VDMX", b"vhea", b"vmtx", b"BASE", b"GDEF", b"GPOS", b"GSUB", b"EBSC",
    b"JSTF", b"MATH", b"CBDT", b"CBLC", b"COLR", b"CPAL", b"SVG ", b"sbix", b"acnt", b"avar",
    b"bdat", b"bloc", b"bsln", b"cvar", b"fdsc", b"feat", b"fmtx", b"fvar", b"gvar", b"hsty",
    b"just", b"lcar", b"mort", b"morx", b"opbd", b"prop", b"trak", b"Zapf", b"Silf", b"Glat",
    b"Gloc", b"Feat", b"Sill",
];

const ARBITRARY_TAG: u8 = 63;
const NULL_GLYF_TRANSFORM: u8 = 3 << 6;

/// Encode an sfnt as WOFF 2.0.
pub fn encode(font: &Sfnt) -> Result<Vec<u8>, FontError> {
    let tables = directory_order(&font.tables);

    let mut directory = Vec::new();
    let mut stream = Vec::new();
    for table in &tables {
        let index = KNOWN_TAGS
            .iter()
            .position(|known| *known == &table.tag)
            .map(|i| i as u8)
            .unwrap_or(ARBITRARY_TAG);
        let transform = if &table.tag == b"glyf" || &table.tag == b"loca" {
            NULL_GLYF_TRANSFORM
        } else {
            0
        };

        directory.push(index | transform);
        if index == ARBITRARY_TAG {
            directory.extend_from_slice(&table.tag);
        }
        write_base128(&mut directory, table.data.len() as u32);
        stream.extend_from_slice(&table.data);
    }

    let compressed = compress(&stream)?;
    let total_len = padded(HEADER_LEN + directory.len() + compressed.len());

    let mut out = Vec::with_capacity(total_len);
    out.extend_from_slice(&SIGNATURE.to_be_bytes());
    out.extend_from_slice(&font.flavor.to_be_bytes());
    out.extend_from_slice(&(total_len as u32).to_be_bytes());
    out.extend_from_slice(&(tables.len() as u16).to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&(font.total_size() as u32).to_be_bytes());
    out.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
    out.extend_from_slice(&1u16.to_be_bytes()); // majorVersion
    out.extend_from_slice(&0u16.to_be_bytes()); // minorVersion
    out.extend_from_slice(&[0u8; 20]); // no metadata or private block
    out.extend_from_slice(&directory);
    out.extend_from_slice(&compressed);
    out.resize(total_len, 0);

    Ok(out)
}

/// Decode WOFF 2.0 produced with null transforms.
pub fn decode(data: &[u8]) -> Result<Sfnt, FontError> {
    if read_u32(data, 0)? != SIGNATURE {
        return Err(FontError::BadSignature);
    }
    let flavor = read_u32(data, 4)?;
    let num_tables = read_u16(data, 12)? as usize;
    let compressed_len = read_u32(data, 20)? as usize;

    let mut cursor = HEADER_LEN;
    let mut entries = Vec::with_capacity(num_tables);
    for _ in 0..num_tables {
        let flags = *data.get(cursor).ok_or(FontError::Truncated)?;
        cursor += 1;

        let index = flags & 0x3F;
        let transform = flags >> 6;
        let tag = if index == ARBITRARY_TAG {
            let tag = read_tag(data, cursor)?;
            cursor += 4;
            tag
        } else {
            *KNOWN_TAGS[index as usize]
        };

        let orig_len = read_base128(data, &mut cursor)? as usize;
        let transformed = if &tag == b"glyf" || &tag == b"loca" {
            transform != 3
        } else {
            transform != 0
        };
        if transformed {
            return Err(FontError::Unsupported(format!(
                "transformed {} table",
                String::from_utf8_lossy(&tag)
            )));
        }
        entries.push((tag, orig_len));
    }

    let compressed = data
        .get(cursor..cursor + compressed_len)
        .ok_or(FontError::Truncated)?;
    let mut stream = Vec::new();
    brotli::Decompressor::new(compressed, 4096).read_to_end(&mut stream)?;

    let mut offset = 0;
    let mut tables = Vec::with_capacity(entries.len());
    for (tag, len) in entries {
        let bytes = stream
            .get(offset..offset + len)
            .ok_or(FontError::Truncated)?;
        tables.push(Table {
            tag,
            data: bytes.to_vec(),
        });
        offset += len;
    }

    Ok(Sfnt::new(flavor, tables))
}

/// Tag order, except `loca` directly follows `glyf`.
fn directory_order(tables: &[Table]) -> Vec<&Table> {
    let mut ordered: Vec<&Table> = tables.iter().filter(|t| &t.tag != b"loca").collect();
    if let Some(loca) = tables.iter().find(|t| &t.tag == b"loca") {
        match ordered.iter().position(|t| &t.tag == b"glyf") {
            Some(glyf) => ordered.insert(glyf + 1, loca),
            None => ordered.push(loca),
        }
    }
    ordered
}

fn compress(data: &[u8]) -> Result<Vec<u8>, FontError> {
    let mut compressed = Vec::new();
    {
        let mut writer = brotli::CompressorWriter::new(&mut compressed, 4096, 11, 22);
        writer.write_all(data)?;
        writer.flush()?;
    }
    Ok(compressed)
}

/// WOFF2 `UIntBase128`: big-endian 7-bit groups, high bit marks continuation.
fn write_base128(out: &mut Vec<u8>, value: u32) {
    let mut groups = [0u8; 5];
    let mut len = 0;
    let mut v = value;
    loop {
        groups[len] = (v & 0x7F) as u8;
        len += 1;
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    for i in (0..len).rev() {
        let continuation = if i > 0 { 0x80 } else { 0 };
        out.push(groups[i] | continuation);
    }
}

fn read_base128(data: &[u8], cursor: &mut usize) -> Result<u32, FontError> {
    let mut value: u32 = 0;
    for i in 0..5 {
        let byte = *data.get(*cursor).ok_or(FontError::Truncated)?;
        *cursor += 1;

        if i == 0 && byte == 0x80 {
            return Err(FontError::Invalid("leading zero in UIntBase128".to_string()));
        }
        if value & 0xFE00_0000 != 0 {
            return Err(FontError::Invalid("UIntBase128 overflow".to_string()));
        }
        value = (value << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(FontError::Invalid("UIntBase128 longer than 5 bytes".to_string()))
}
