//! DEX class-definition reader.
//!
//! Only the tables needed to name every class defined in the container are
//! read: header, `string_ids`, `type_ids` and `class_defs`. Method bodies and
//! everything else stay untouched, so nothing from the container is ever run.
//!
//! Decoding is all-or-nothing: any structural problem yields a `DecodeError`
//! and no class names at all.

use std::io::Read;

use crate::error::DecodeError;

const HEADER_SIZE: usize = 0x70;
const ENDIAN_CONSTANT: u32 = 0x1234_5678;
const CLASS_DEF_SIZE: u64 = 0x20;
/// Upper bound on the buffer reserved up front from an entry's declared size.
const MAX_PREALLOC_BYTES: u64 = 16 * 1024 * 1024;

const FILE_SIZE_OFF: usize = 0x20;
const HEADER_SIZE_OFF: usize = 0x24;
const ENDIAN_TAG_OFF: usize = 0x28;
const STRING_IDS_OFF: usize = 0x38;
const TYPE_IDS_OFF: usize = 0x40;
const CLASS_DEFS_OFF: usize = 0x60;

/// Turns a class container stream into fully-qualified class names.
pub trait ClassDecoder: Send + Sync {
    fn decode(&self, stream: &mut dyn Read, size_hint: u64) -> Result<Vec<String>, DecodeError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DexDecoder;

impl ClassDecoder for DexDecoder {
    fn decode(&self, stream: &mut dyn Read, size_hint: u64) -> Result<Vec<String>, DecodeError> {
        let reserve = size_hint.min(MAX_PREALLOC_BYTES);
        let mut data = Vec::with_capacity(usize::try_from(reserve).unwrap_or(0));
        stream.read_to_end(&mut data)?;
        class_names(&data)
    }
}

/// Names of every class defined in `data`, in `class_defs` order.
pub fn class_names(data: &[u8]) -> Result<Vec<String>, DecodeError> {
    let dex = DexView::parse(data)?;
    let mut names = Vec::with_capacity(dex.class_defs.size as usize);
    for i in 0..dex.class_defs.size {
        let descriptor = dex.class_descriptor(i)?;
        names.push(descriptor_to_class_name(&descriptor)?);
    }
    Ok(names)
}

/// `Lpkg/sub/Outer$Inner;` -> `pkg.sub.Outer.Inner`
pub fn descriptor_to_class_name(descriptor: &str) -> Result<String, DecodeError> {
    let body = descriptor
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
        .filter(|body| !body.is_empty())
        .ok_or_else(|| DecodeError::BadDescriptor(descriptor.to_string()))?;
    Ok(body.replace(['/', '$'], "."))
}

#[derive(Debug, Clone, Copy)]
struct Table {
    size: u32,
    offset: u32,
}

struct DexView<'a> {
    data: &'a [u8],
    string_ids: Table,
    type_ids: Table,
    class_defs: Table,
}

impl<'a> DexView<'a> {
    fn parse(data: &'a [u8]) -> Result<Self, DecodeError> {
        if data.len() < HEADER_SIZE {
            return Err(DecodeError::Truncated(data.len()));
        }
        let mut magic = [0u8; 8];
        magic.copy_from_slice(&data[..8]);
        if !is_dex_magic(&magic) {
            return Err(DecodeError::BadMagic(magic));
        }

        let endian = read_u32(data, ENDIAN_TAG_OFF, "endian tag")?;
        if endian != ENDIAN_CONSTANT {
            return Err(DecodeError::UnsupportedEndian(endian));
        }
        let header_size = read_u32(data, HEADER_SIZE_OFF, "header size")?;
        if (header_size as usize) < HEADER_SIZE {
            return Err(DecodeError::Truncated(header_size as usize));
        }
        let file_size = read_u32(data, FILE_SIZE_OFF, "file size")?;
        if file_size as usize > data.len() {
            return Err(DecodeError::OutOfBounds {
                what: "file",
                offset: u64::from(file_size),
            });
        }

        let view = Self {
            data,
            string_ids: read_table(data, STRING_IDS_OFF)?,
            type_ids: read_table(data, TYPE_IDS_OFF)?,
            class_defs: read_table(data, CLASS_DEFS_OFF)?,
        };
        view.check_table(view.string_ids, 4, "string_ids")?;
        view.check_table(view.type_ids, 4, "type_ids")?;
        view.check_table(view.class_defs, CLASS_DEF_SIZE, "class_defs")?;
        Ok(view)
    }

    fn check_table(&self, table: Table, item_size: u64, what: &'static str) -> Result<(), DecodeError> {
        let end = u64::from(table.offset) + u64::from(table.size) * item_size;
        if end > self.data.len() as u64 {
            return Err(DecodeError::OutOfBounds {
                what,
                offset: u64::from(table.offset),
            });
        }
        Ok(())
    }

    fn class_descriptor(&self, class_def: u32) -> Result<String, DecodeError> {
        let def_off = self.class_defs.offset as usize + class_def as usize * CLASS_DEF_SIZE as usize;
        let class_idx = read_u32(self.data, def_off, "class_def")?;
        let descriptor_idx = self.item(self.type_ids, class_idx, "type_ids")?;
        let string_data_off = self.item(self.string_ids, descriptor_idx, "string_ids")?;
        read_mutf8(self.data, string_data_off)
    }

    fn item(&self, table: Table, index: u32, what: &'static str) -> Result<u32, DecodeError> {
        if index >= table.size {
            return Err(DecodeError::IndexOutOfRange {
                what,
                index,
                size: table.size,
            });
        }
        read_u32(self.data, table.offset as usize + index as usize * 4, what)
    }
}

fn is_dex_magic(magic: &[u8; 8]) -> bool {
    magic.starts_with(b"dex\n")
        && magic[4..7].iter().all(u8::is_ascii_digit)
        && magic[7] == 0
}

fn read_table(data: &[u8], at: usize) -> Result<Table, DecodeError> {
    Ok(Table {
        size: read_u32(data, at, "table size")?,
        offset: read_u32(data, at + 4, "table offset")?,
    })
}

fn read_u32(data: &[u8], at: usize, what: &'static str) -> Result<u32, DecodeError> {
    data.get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(DecodeError::OutOfBounds {
            what,
            offset: at as u64,
        })
}

fn read_uleb128(data: &[u8], at: &mut usize) -> Option<u32> {
    let mut result = 0u32;
    for shift in (0..35).step_by(7) {
        let byte = *data.get(*at)?;
        *at += 1;
        result |= u32::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Some(result);
        }
    }
    None
}

/// Reads a `string_data_item`: ULEB128 UTF-16 length, then modified UTF-8
/// terminated by a zero byte.
fn read_mutf8(data: &[u8], offset: u32) -> Result<String, DecodeError> {
    let bad = || DecodeError::BadString(offset);
    let mut at = offset as usize;
    let utf16_len = read_uleb128(data, &mut at).ok_or_else(bad)? as usize;
    // every UTF-16 unit takes at least one byte
    if utf16_len > data.len().saturating_sub(at) {
        return Err(bad());
    }

    let mut units: Vec<u16> = Vec::with_capacity(utf16_len);
    loop {
        let b0 = *data.get(at).ok_or_else(bad)?;
        at += 1;
        match b0 {
            0 => break,
            0x01..=0x7f => units.push(u16::from(b0)),
            0xc0..=0xdf => {
                let b1 = continuation(data, &mut at).ok_or_else(bad)?;
                units.push((u16::from(b0 & 0x1f) << 6) | b1);
            }
            0xe0..=0xef => {
                let b1 = continuation(data, &mut at).ok_or_else(bad)?;
                let b2 = continuation(data, &mut at).ok_or_else(bad)?;
                units.push((u16::from(b0 & 0x0f) << 12) | (b1 << 6) | b2);
            }
            _ => return Err(bad()),
        }
    }
    if units.len() != utf16_len {
        return Err(bad());
    }
    String::from_utf16(&units).map_err(|_| bad())
}

fn continuation(data: &[u8], at: &mut usize) -> Option<u16> {
    let b = *data.get(*at)?;
    if b & 0xc0 != 0x80 {
        return None;
    }
    *at += 1;
    Some(u16::from(b & 0x3f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::build_dex;

    #[test]
    fn decodes_class_defs_to_dotted_names() {
        let dex = build_dex(&["Lcom/tencent/Foo;", "Lcom/example/Bar;"]);
        let names = class_names(&dex).unwrap();
        assert_eq!(names, vec!["com.tencent.Foo", "com.example.Bar"]);
    }

    #[test]
    fn inner_class_separator_becomes_dot() {
        let dex = build_dex(&["Lcom/example/Outer$Inner;", "Lcom/example/Outer$1;"]);
        assert_eq!(
            class_names(&dex).unwrap(),
            vec!["com.example.Outer.Inner", "com.example.Outer.1"]
        );
    }

    #[test]
    fn decoder_reads_from_stream() {
        let dex = build_dex(&["Lorg/demo/Main;"]);
        let mut stream = std::io::Cursor::new(dex.clone());
        let names = DexDecoder.decode(&mut stream, dex.len() as u64).unwrap();
        assert_eq!(names, vec!["org.demo.Main"]);
    }

    #[test]
    fn empty_class_defs_is_not_an_error() {
        let dex = build_dex(&[]);
        assert!(class_names(&dex).unwrap().is_empty());
    }

    #[test]
    fn non_ascii_descriptor_round_trips_through_mutf8() {
        let dex = build_dex(&["Lcom/example/Caf\u{e9};"]);
        assert_eq!(class_names(&dex).unwrap(), vec!["com.example.Caf\u{e9}"]);
    }

    #[test]
    fn truncated_container_is_rejected() {
        let dex = build_dex(&["Lcom/tencent/Foo;"]);
        for cut in [0, 7, HEADER_SIZE - 1, dex.len() - 3] {
            assert!(class_names(&dex[..cut]).is_err(), "cut at {cut}");
        }
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut dex = build_dex(&["Lcom/tencent/Foo;"]);
        dex[0] = b'x';
        assert!(matches!(class_names(&dex), Err(DecodeError::BadMagic(_))));
    }

    #[test]
    fn out_of_range_type_index_is_rejected() {
        let mut dex = build_dex(&["Lcom/tencent/Foo;"]);
        let class_defs_off = read_u32(&dex, CLASS_DEFS_OFF + 4, "").unwrap() as usize;
        dex[class_defs_off..class_defs_off + 4].copy_from_slice(&9u32.to_le_bytes());
        assert!(matches!(
            class_names(&dex),
            Err(DecodeError::IndexOutOfRange { what: "type_ids", .. })
        ));
    }

    #[test]
    fn reversed_endian_tag_is_rejected() {
        let mut dex = build_dex(&[]);
        dex[ENDIAN_TAG_OFF..ENDIAN_TAG_OFF + 4].copy_from_slice(&0x7856_3412u32.to_le_bytes());
        assert!(matches!(class_names(&dex), Err(DecodeError::UnsupportedEndian(_))));
    }

    #[test]
    fn string_length_past_end_of_container_is_rejected() {
        let mut dex = build_dex(&["La/B;"]);
        let moved = dex.len() as u32;
        dex.extend_from_slice(&[0xff, 0xff, 0xff, 0xff, 0x0f]);
        dex.extend_from_slice(b"La/B;\0");
        let string_ids_off = read_u32(&dex, STRING_IDS_OFF + 4, "").unwrap() as usize;
        dex[string_ids_off..string_ids_off + 4].copy_from_slice(&moved.to_le_bytes());

        assert!(matches!(class_names(&dex), Err(DecodeError::BadString(off)) if off == moved));
    }

    #[test]
    fn declared_size_does_not_drive_allocation() {
        let dex = build_dex(&["Lorg/demo/Main;"]);
        let mut stream = std::io::Cursor::new(dex);
        let names = DexDecoder.decode(&mut stream, u64::MAX).unwrap();
        assert_eq!(names, vec!["org.demo.Main"]);
    }

    #[test]
    fn descriptor_must_be_a_class_type() {
        assert!(descriptor_to_class_name("I").is_err());
        assert!(descriptor_to_class_name("[Lcom/a/B;").is_err());
        assert!(descriptor_to_class_name("L;").is_err());
        assert_eq!(descriptor_to_class_name("La/B;").unwrap(), "a.B");
    }
}
