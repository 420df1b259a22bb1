//! Synthetic DEX images for tests. Std-only so integration tests can
//! include it by path.

/// Minimal DEX image with one class_def per descriptor. Checksum and
/// signature are left zeroed.
pub fn build_dex(descriptors: &[&str]) -> Vec<u8> {
    let n = descriptors.len() as u32;
    let string_ids_off = 0x70u32;
    let type_ids_off = string_ids_off + 4 * n;
    let class_defs_off = type_ids_off + 4 * n;
    let data_off = class_defs_off + 0x20 * n;

    let mut string_data = Vec::new();
    let mut string_offsets = Vec::new();
    for d in descriptors {
        string_offsets.push(data_off + string_data.len() as u32);
        write_uleb128(&mut string_data, d.encode_utf16().count() as u32);
        string_data.extend_from_slice(d.as_bytes());
        string_data.push(0);
    }

    let mut out = vec![0u8; 0x70];
    out[..8].copy_from_slice(b"dex\n035\0");
    put_u32(&mut out, 0x24, 0x70);
    put_u32(&mut out, 0x28, 0x1234_5678);
    put_u32(&mut out, 0x38, n);
    put_u32(&mut out, 0x3c, string_ids_off);
    put_u32(&mut out, 0x40, n);
    put_u32(&mut out, 0x44, type_ids_off);
    put_u32(&mut out, 0x60, n);
    put_u32(&mut out, 0x64, class_defs_off);
    put_u32(&mut out, 0x68, string_data.len() as u32);
    put_u32(&mut out, 0x6c, data_off);

    for off in &string_offsets {
        out.extend_from_slice(&off.to_le_bytes());
    }
    for i in 0..n {
        out.extend_from_slice(&i.to_le_bytes());
    }
    for i in 0..n {
        out.extend_from_slice(&i.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&u32::MAX.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&u32::MAX.to_le_bytes());
        out.extend_from_slice(&[0u8; 12]);
    }
    out.extend_from_slice(&string_data);

    let file_size = out.len() as u32;
    put_u32(&mut out, 0x20, file_size);
    out
}

fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_uleb128(buf: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}
