//! Minimal sfnt (TrueType/OpenType) container reader and writer.
//!
//! Only the table directory is interpreted; table contents are carried as
//! opaque bytes.

use super::FontError;

/// `head.checkSumAdjustment` target value.
const CHECKSUM_MAGIC: u32 = 0xB1B0_AFBA;

/// A single font table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub tag: [u8; 4],
    pub data: Vec<u8>,
}

impl Table {
    pub fn tag_str(&self) -> String {
        String::from_utf8_lossy(&self.tag).into_owned()
    }
}

/// An sfnt font: flavor plus tables sorted by tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sfnt {
    /// `0x00010000` for TrueType outlines, `OTTO` for CFF
    pub flavor: u32,
    pub tables: Vec<Table>,
}

impl Sfnt {
    pub fn new(flavor: u32, mut tables: Vec<Table>) -> Self {
        tables.sort_by(|a, b| a.tag.cmp(&b.tag));
        Self { flavor, tables }
    }

    /// Parse a raw sfnt.
    pub fn parse(data: &[u8]) -> Result<Self, FontError> {
        let flavor = read_u32(data, 0)?;
        if flavor == u32::from_be_bytes(*b"ttcf") {
            return Err(FontError::Unsupported("font collections".to_string()));
        }

        let num_tables = read_u16(data, 4)? as usize;
        let mut tables = Vec::with_capacity(num_tables);

        for i in 0..num_tables {
            let record = 12 + i * 16;
            let tag = read_tag(data, record)?;
            let offset = read_u32(data, record + 8)? as usize;
            let length = read_u32(data, record + 12)? as usize;
            let bytes = data
                .get(offset..offset + length)
                .ok_or(FontError::Truncated)?;
            tables.push(Table {
                tag,
                data: bytes.to_vec(),
            });
        }

        Ok(Self::new(flavor, tables))
    }

    /// Size of the serialized font.
    pub fn total_size(&self) -> usize {
        12 + 16 * self.tables.len() + self.tables.iter().map(|t| padded(t.data.len())).sum::<usize>()
    }

    /// Serialize with a fresh table directory, checksums and `head` adjustment.
    pub fn to_bytes(&self) -> Vec<u8> {
        let num_tables = self.tables.len() as u16;
        let entry_selector = if num_tables == 0 { 0 } else { 15 - num_tables.leading_zeros() as u16 };
        let search_range = (1u16 << entry_selector) * 16;
        let range_shift = num_tables * 16 - search_range.min(num_tables * 16);

        let mut out = Vec::with_capacity(self.total_size());
        out.extend_from_slice(&self.flavor.to_be_bytes());
        out.extend_from_slice(&num_tables.to_be_bytes());
        out.extend_from_slice(&search_range.to_be_bytes());
        out.extend_from_slice(&entry_selector.to_be_bytes());
        out.extend_from_slice(&range_shift.to_be_bytes());

        let mut offset = 12 + 16 * self.tables.len();
        let mut head_offset = None;
        for table in &self.tables {
            let data = normalized_table(table);
            if &table.tag == b"head" {
                head_offset = Some(offset);
            }
            out.extend_from_slice(&table.tag);
            out.extend_from_slice(&checksum(&data).to_be_bytes());
            out.extend_from_slice(&(offset as u32).to_be_bytes());
            out.extend_from_slice(&(table.data.len() as u32).to_be_bytes());
            offset += padded(table.data.len());
        }

        for table in &self.tables {
            out.extend_from_slice(&normalized_table(table));
            out.resize(padded(out.len()), 0);
        }

        if let Some(head) = head_offset {
            if out.len() >= head + 12 {
                let adjustment = CHECKSUM_MAGIC.wrapping_sub(checksum(&out));
                out[head + 8..head + 12].copy_from_slice(&adjustment.to_be_bytes());
            }
        }

        out
    }
}

/// Table bytes as they take part in checksums: `head` with a zeroed adjustment.
fn normalized_table(table: &Table) -> Vec<u8> {
    let mut data = table.data.clone();
    if &table.tag == b"head" && data.len() >= 12 {
        data[8..12].fill(0);
    }
    data
}

/// OpenType table checksum: sum of big-endian u32 words, zero padded.
pub fn checksum(data: &[u8]) -> u32 {
    data.chunks(4).fold(0u32, |sum, chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        sum.wrapping_add(u32::from_be_bytes(word))
    })
}

/// Round up to a 4-byte boundary.
pub fn padded(len: usize) -> usize {
    (len + 3) & !3
}

pub(crate) fn read_u16(data: &[u8], at: usize) -> Result<u16, FontError> {
    data.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(FontError::Truncated)
}

pub(crate) fn read_u32(data: &[u8], at: usize) -> Result<u32, FontError> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(FontError::Truncated)
}

pub(crate) fn read_tag(data: &[u8], at: usize) -> Result<[u8; 4], FontError> {
    read_u32(data, at).map(u32::to_be_bytes)
}

/// A tiny but parseable TrueType font for tests.
#[cfg(test)]
pub(crate) fn sample_font(glyphs: u16) -> Vec<u8> {
    let mut head = vec![0u8; 54];
    head[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
    head[12..16].copy_from_slice(&0x5F0F_3CF5u32.to_be_bytes());
    head[18..20].copy_from_slice(&1000u16.to_be_bytes());

    let mut hhea = vec![0u8; 36];
    hhea[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
    hhea[4..6].copy_from_slice(&800i16.to_be_bytes());
    hhea[6..8].copy_from_slice(&(-200i16).to_be_bytes());
    hhea[34..36].copy_from_slice(&1u16.to_be_bytes());

    let mut maxp = vec![0u8; 6];
    maxp[0..4].copy_from_slice(&0x0000_5000u32.to_be_bytes());
    maxp[4..6].copy_from_slice(&glyphs.to_be_bytes());

    let mut hmtx = Vec::new();
    hmtx.extend_from_slice(&500u16.to_be_bytes());
    hmtx.extend_from_slice(&0i16.to_be_bytes());
    for _ in 1..glyphs {
        hmtx.extend_from_slice(&0i16.to_be_bytes());
    }

    // Some compressible filler so the compressed containers are exercised.
    let name = b"kiln sample font ".repeat(16);

    Sfnt::new(
        0x0001_0000,
        vec![
            Table { tag: *b"head", data: head },
            Table { tag: *b"hhea", data: hhea },
            Table { tag: *b"maxp", data: maxp },
            Table { tag: *b"hmtx", data: hmtx },
            Table { tag: *b"name", data: name },
        ],
    )
    .to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trips_table_directory() {
        let bytes = sample_font(3);
        let font = Sfnt::parse(&bytes).unwrap();

        let tags: Vec<String> = font.tables.iter().map(Table::tag_str).collect();
        assert_eq!(tags, vec!["head", "hhea", "hmtx", "maxp", "name"]);
        assert_eq!(font.to_bytes(), bytes);
        assert_eq!(bytes.len(), font.total_size());
    }

    #[test]
    fn whole_font_checksums_to_magic() {
        let bytes = sample_font(2);
        assert_eq!(checksum(&bytes), CHECKSUM_MAGIC);
    }

    #[test]
    fn sample_font_is_readable() {
        let bytes = sample_font(4);
        let face = ttf_parser::Face::parse(&bytes, 0).unwrap();
        assert_eq!(face.number_of_glyphs(), 4);
    }

    #[test]
    fn rejects_truncated_input() {
        let bytes = sample_font(1);
        assert!(matches!(Sfnt::parse(&bytes[..20]), Err(FontError::Truncated)));
    }
}
