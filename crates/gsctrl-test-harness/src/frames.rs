//! Device report frames for tests.
//!
//! The `CAPTURED_*` constants are datagrams recorded from a Divine unit.
//! The builder functions produce synthetic frames of each report shape
//! with the fields the decoder reads set to caller-chosen values; every
//! other byte is zero apart from the header.

/// "GS Ctrl" followed by NUL.
pub const MAGIC: [u8; 8] = *b"GS Ctrl\0";

/// Info report (opcode 4, 144 bytes): firmware "36 0", product 49,
/// host name "DIV-01-91e980", friendly name "Divine-Marcin".
pub const CAPTURED_INFO_REPORT: [u8; 144] = [
    0x47, 0x53, 0x20, 0x43, 0x74, 0x72, 0x6C, 0x00, 0x90, 0x00, 0x04, 0x0C,
    0x00, 0x91, 0xE9, 0x80, 0x00, 0x24, 0x17, 0xDF, 0xEF, 0xFE, 0x32, 0x7B,
    0x31, 0x00, 0x00, 0x01, 0x02, 0x00, 0x00, 0x00, 0x00, 0x1D, 0xC1, 0xFF,
    0xFE, 0x91, 0xE9, 0x80, 0x44, 0x49, 0x56, 0x2D, 0x30, 0x31, 0x2D, 0x39,
    0x31, 0x65, 0x39, 0x38, 0x30, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x44, 0x69, 0x76, 0x69, 0x6E, 0x65, 0x2D, 0x4D, 0x61, 0x72, 0x63, 0x69,
    0x6E, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x02, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Status report (opcode 1, 40 bytes): all levels 0xFE, pot 19,
/// volume 108, temperature byte 0xFC.
pub const CAPTURED_STATUS_REPORT: [u8; 40] = [
    0x47, 0x53, 0x20, 0x43, 0x74, 0x72, 0x6C, 0x00, 0x28, 0x00, 0x01, 0x00,
    0x0C, 0x91, 0xE9, 0x80, 0x02, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x00,
    0x00, 0x00, 0x00, 0x00, 0xFE, 0xFE, 0xFE, 0xFE, 0xFE, 0xFE, 0xFE, 0xFE,
    0x13, 0x6C, 0xFC, 0x00,
];

/// Full report (opcode 10, 96 bytes): mix select 7.
pub const CAPTURED_FULL_REPORT: [u8; 96] = [
    0x47, 0x53, 0x20, 0x43, 0x74, 0x72, 0x6C, 0x00, 0x60, 0x00, 0x0A, 0x00,
    0x78, 0x91, 0xE9, 0x80, 0x01, 0x01, 0x04, 0x00, 0x80, 0xBB, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
    0x02, 0x02, 0x03, 0x00, 0x02, 0x30, 0x31, 0x02, 0x30, 0x32, 0x02, 0x30,
    0x33, 0x02, 0x30, 0x34, 0x03, 0x00, 0x00, 0x00, 0x04, 0x2F, 0x09, 0x00,
    0x56, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x02,
    0x16, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x06, 0x02, 0x02, 0x02,
    0x01, 0x00, 0x02, 0x07, 0x1E, 0x01, 0x33, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Divine report (opcode 10, subtype 4, 56 bytes): mix select 7.
pub const CAPTURED_DIVINE_REPORT: [u8; 56] = [
    0x47, 0x53, 0x20, 0x43, 0x74, 0x72, 0x6C, 0x00, 0x38, 0x00, 0x0A, 0x00,
    0xF8, 0x00, 0x00, 0x00, 0x04, 0x33, 0x09, 0x00, 0x16, 0x00, 0x00, 0x00,
    0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x07, 0x28, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x06, 0x02, 0x02, 0x00, 0x00, 0x01, 0x07, 0x07,
    0xFE, 0x00, 0x32, 0x00, 0x00, 0x00, 0x00, 0x00,
];

fn report(len: usize, opcode: u8) -> Vec<u8> {
    let mut frame = vec![0u8; len];
    frame[..MAGIC.len()].copy_from_slice(&MAGIC);
    frame[8] = len as u8;
    frame[10] = opcode;
    frame
}

fn put_name(frame: &mut [u8], start: usize, name: &str) {
    for (slot, byte) in frame[start..start + 32].iter_mut().zip(name.bytes()) {
        *slot = byte;
    }
}

/// Info report. `firmware` holds bytes 16 and 17, `product` bytes 24 and
/// 25. Names are truncated to their 32-byte fields.
pub fn info_frame(
    firmware: [u8; 2],
    product: [u8; 2],
    host_name: &str,
    friendly_name: &str,
    domain_name: &str,
) -> Vec<u8> {
    let mut frame = report(144, 4);
    frame[16..18].copy_from_slice(&firmware);
    frame[24..26].copy_from_slice(&product);
    put_name(&mut frame, 40, host_name);
    put_name(&mut frame, 72, friendly_name);
    put_name(&mut frame, 104, domain_name);
    frame
}

/// Status report with raw level bytes (offsets 0x1C..0x23), pot position,
/// device volume, and raw temperature byte.
pub fn status_frame(levels: [u8; 8], pot: u8, volume: u8, temperature: u8) -> Vec<u8> {
    let mut frame = report(40, 1);
    frame[0x1C..0x24].copy_from_slice(&levels);
    frame[36] = pot;
    frame[37] = volume;
    frame[38] = temperature;
    frame
}

/// Divine report (56 bytes, subtype 4) carrying a mix selection.
pub fn divine_frame(mix_select: u8) -> Vec<u8> {
    let mut frame = report(56, 10);
    frame[16] = 4;
    frame[47] = mix_select;
    frame
}

/// Short report (96 bytes) carrying a mix selection.
pub fn short_frame(mix_select: u8) -> Vec<u8> {
    let mut frame = report(96, 10);
    frame[87] = mix_select;
    frame
}

/// Composite report (132 bytes). The mix selection is only meaningful when
/// `subtype` is 4.
pub fn composite_frame(subtype: u8, mix_select: u8) -> Vec<u8> {
    let mut frame = report(132, 10);
    frame[92] = subtype;
    frame[123] = mix_select;
    frame
}

/// Config report (24 bytes).
pub fn config_frame(
    access_flags: u8,
    sequence: u8,
    device_id: [u8; 3],
    status_ip: [u8; 4],
    status_port: u16,
) -> Vec<u8> {
    let mut frame = report(24, 6);
    frame[11] = access_flags;
    frame[12] = sequence;
    frame[13..16].copy_from_slice(&device_id);
    frame[16..20].copy_from_slice(&status_ip);
    frame[20..22].copy_from_slice(&status_port.to_be_bytes());
    frame
}
