//! Glensound control frame encoder/decoder.
//!
//! Requests and reports share a 16-byte header. Requests carry an opcode
//! and the controller id; reports are identified purely by their total
//! length and the opcode byte at offset 10, there is no frame-type field.
//!
//! # Request format
//!
//! ```text
//! "GS Ctrl\0" <len> 0x00 <opcode> <flags> <controller id: 4 bytes> [<payload>...]
//! ```
//!
//! - `len`: 16 + payload length for set-control, literal `0x10` for
//!   get-info/get-config, literal `0x14` for get-report
//! - `0x00`: multipacket byte, always zero
//! - `flags`: `0x00` for get-info, otherwise `0x01` with fast meters and
//!   `0x03` without
//!
//! # Report shapes
//!
//! | Length | Opcode | Report                                   |
//! |--------|--------|------------------------------------------|
//! | 144    | 4      | Info (firmware, product, names)          |
//! | 40     | 1      | Status (levels, volume, pot, temperature)|
//! | 56     | 10     | Divine report, subtype byte 16 == 4      |
//! | 96     | 10     | Short report                             |
//! | 132    | 10     | Composite report, byte 92 == 4           |
//! | 24     | 6      | Config (sequence, access bits, status IP)|
//!
//! All encoding/decoding in this module is pure -- no I/O is performed.

use std::fmt;
use std::net::Ipv4Addr;

use bytes::{BufMut, BytesMut};
use gsctrl_core::{ControllerId, Error, Result};

/// Magic prefix of every frame: "GS Ctrl" followed by NUL.
pub const MAGIC: [u8; 8] = *b"GS Ctrl\0";

/// Length of the request header, controller id included.
pub const HEADER_LEN: usize = 16;

/// Offset of the opcode byte in both requests and reports.
pub const OPCODE_OFFSET: usize = 10;

/// Largest set-control payload the length byte can describe.
pub const MAX_CONTROL_PAYLOAD: usize = u8::MAX as usize - HEADER_LEN;

/// Multipacket byte. The driver never splits requests.
const MULTIPACKET: u8 = 0x00;

/// Flags for get-info requests.
pub const FLAGS_NONE: u8 = 0x00;

/// Flags with fast meters enabled.
pub const FLAGS_FAST_METERS: u8 = 0x01;

/// Flags with fast meters disabled (exclusive, meters off).
pub const FLAGS_DEFAULT: u8 = 0x03;

/// Length byte sent with get-info and get-config requests.
const LEN_GET_INFO: u8 = 0x10;
const LEN_GET_CONFIG: u8 = 0x10;
/// Length byte sent with get-report requests.
const LEN_GET_REPORT: u8 = 0x14;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Request opcodes understood by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    SetControl = 0x03,
    GetInfo = 0x05,
    GetConfig = 0x07,
    GetReport = 0x0B,
}

impl Opcode {
    /// Look up a request opcode by its wire value.
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        match byte {
            0x03 => Some(Opcode::SetControl),
            0x05 => Some(Opcode::GetInfo),
            0x07 => Some(Opcode::GetConfig),
            0x0B => Some(Opcode::GetReport),
            _ => None,
        }
    }

    /// Wire value.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// An outbound request. Built fresh for every send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Ask for the info report (firmware, product, names).
    GetInfo,
    /// Change a device control; the payload is device-defined.
    SetControl(Vec<u8>),
    /// Ask for the config report. Sent by the poller.
    GetConfig,
    /// Ask for a full report, used to resynchronise state.
    GetReport(Vec<u8>),
}

impl Request {
    /// Build a request from a raw opcode byte.
    ///
    /// Returns `None` for opcodes the driver does not send; callers treat
    /// that as "no message" rather than an error. The payload is ignored
    /// for get-info and get-config.
    pub fn from_opcode(opcode: u8, payload: &[u8]) -> Option<Request> {
        let request = match Opcode::from_byte(opcode)? {
            Opcode::SetControl => Request::SetControl(payload.to_vec()),
            Opcode::GetInfo => Request::GetInfo,
            Opcode::GetConfig => Request::GetConfig,
            Opcode::GetReport => Request::GetReport(payload.to_vec()),
        };
        Some(request)
    }

    /// Opcode of this request.
    pub fn opcode(&self) -> Opcode {
        match self {
            Request::GetInfo => Opcode::GetInfo,
            Request::SetControl(_) => Opcode::SetControl,
            Request::GetConfig => Opcode::GetConfig,
            Request::GetReport(_) => Opcode::GetReport,
        }
    }

    /// Payload appended after the header.
    pub fn payload(&self) -> &[u8] {
        match self {
            Request::SetControl(payload) | Request::GetReport(payload) => payload,
            Request::GetInfo | Request::GetConfig => &[],
        }
    }

    /// Flags byte for this request.
    pub fn flags(&self, fast_meters: bool) -> u8 {
        match self {
            Request::GetInfo => FLAGS_NONE,
            Request::SetControl(_) | Request::GetConfig | Request::GetReport(_) => {
                if fast_meters {
                    FLAGS_FAST_METERS
                } else {
                    FLAGS_DEFAULT
                }
            }
        }
    }

    fn length_byte(&self) -> Result<u8> {
        match self {
            Request::SetControl(payload) => u8::try_from(HEADER_LEN + payload.len())
                .map_err(|_| {
                    Error::InvalidParameter(format!(
                        "set-control payload of {} bytes does not fit the length byte",
                        payload.len()
                    ))
                }),
            Request::GetInfo => Ok(LEN_GET_INFO),
            Request::GetConfig => Ok(LEN_GET_CONFIG),
            Request::GetReport(_) => Ok(LEN_GET_REPORT),
        }
    }
}

/// Encode a request into raw bytes ready for transmission.
///
/// # Example
///
/// ```
/// use gsctrl_core::ControllerId;
/// use gsctrl_divine::codec::{Request, encode};
///
/// let bytes = encode(&Request::GetInfo, &ControllerId::default(), false).unwrap();
/// assert_eq!(
///     bytes,
///     b"GS Ctrl\0\x10\x00\x05\x00\x42\x49\x54\x46".to_vec()
/// );
/// ```
pub fn encode(request: &Request, controller_id: &ControllerId, fast_meters: bool) -> Result<Vec<u8>> {
    let payload = request.payload();
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_slice(&MAGIC);
    buf.put_u8(request.length_byte()?);
    buf.put_u8(MULTIPACKET);
    buf.put_u8(request.opcode().as_byte());
    buf.put_u8(request.flags(fast_meters));
    buf.put_slice(controller_id.as_bytes());
    buf.put_slice(payload);
    Ok(buf.to_vec())
}

/// Encode a request for a controller id given as configured text.
///
/// Fails with [`Error::InvalidControllerId`] unless `controller_id` is
/// exactly 8 hexadecimal characters.
pub fn encode_message(request: &Request, controller_id: &str, fast_meters: bool) -> Result<Vec<u8>> {
    let id = ControllerId::parse(controller_id)?;
    encode(request, &id, fast_meters)
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

const INFO_LEN: usize = 144;
const STATUS_LEN: usize = 40;
const DIVINE_LEN: usize = 56;
const SHORT_LEN: usize = 96;
const COMPOSITE_LEN: usize = 132;
const CONFIG_LEN: usize = 24;

const OP_STATUS: u8 = 1;
const OP_INFO: u8 = 4;
const OP_CONFIG: u8 = 6;
const OP_REPORT: u8 = 10;

/// Report subtype carrying the Divine mix selection.
const SUBTYPE_DIVINE: u8 = 4;

/// Firmware version as the two raw bytes the device reports (17, then 16).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Firmware {
    pub high: u8,
    pub low: u8,
}

impl fmt::Display for Firmware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.high, self.low)
    }
}

/// Product reported in the info report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Product {
    /// Product id 49.
    Divine,
    Unknown,
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Product::Divine => f.write_str("49 (Divine)"),
            Product::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Decoded info report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoReport {
    pub firmware: Firmware,
    pub product: Product,
    pub host_name: String,
    pub friendly_name: String,
    pub domain_name: String,
}

/// Decoded status report.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    /// Eight levels in dB: inputs 1-4, 1-2, 3-4, 1-4, then the output.
    pub levels: [f64; 8],
    pub pot_position: u8,
    /// Device volume, 0-127.
    pub volume: u8,
    /// Temperature in degrees Celsius.
    pub temperature: f64,
}

impl StatusReport {
    /// Device volume in dB; `None` stands for minus infinity.
    pub fn volume_db(&self) -> Option<f64> {
        volume_db(self.volume)
    }
}

/// Mix selection carried by the three report-opcode shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixReport {
    /// Channel index, 1-7 for known channels.
    pub mix_select: u8,
}

/// Decoded config report. Informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigReport {
    pub sequence: u8,
    /// Three device-id bytes rendered as unpadded hex.
    pub device_id: String,
    /// Status destination when the device is in shared mode.
    pub status_ip: Ipv4Addr,
    pub status_port: u16,
    pub exclusive: bool,
    pub password_valid: bool,
    pub access_granted: bool,
}

impl fmt::Display for ConfigReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sequence #: {}, Device ID: {}, Status IP (if in shared mode): {} Port (if in shared mode): {}, \
             Exclusive: {}, Password Valid: {}, Access Granted: {}",
            self.sequence,
            self.device_id,
            self.status_ip,
            self.status_port,
            self.exclusive,
            self.password_valid,
            self.access_granted
        )
    }
}

/// A classified device report.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Info(InfoReport),
    Status(StatusReport),
    Divine(MixReport),
    Short(MixReport),
    Composite(MixReport),
    Config(ConfigReport),
    /// Any other (length, opcode) combination. Not an error.
    Unrecognized,
}

/// Level in dB for a raw level byte: negative half-dB steps.
pub fn level_db(raw: u8) -> f64 {
    -0.5 * f64::from(raw)
}

/// Temperature in degrees Celsius for the raw signed temperature byte.
pub fn temperature_c(raw: u8) -> f64 {
    0.5 * f64::from(raw as i8) + 44.0
}

/// Volume in dB for a device volume of 0-127. Zero means minus infinity.
pub fn volume_db(volume: u8) -> Option<f64> {
    if volume == 0 {
        None
    } else {
        Some(-63.5 + f64::from(volume) * 0.5)
    }
}

/// Characters of a fixed-width name field, skipping every zero byte.
fn name_field(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|&&b| b != 0)
        .map(|&b| char::from(b))
        .collect()
}

/// Classify and decode a datagram from the device.
///
/// Never fails: datagrams with an unknown shape decode to
/// [`Frame::Unrecognized`].
pub fn decode(data: &[u8]) -> Frame {
    let Some(&opcode) = data.get(OPCODE_OFFSET) else {
        return Frame::Unrecognized;
    };

    match (data.len(), opcode) {
        (INFO_LEN, OP_INFO) => Frame::Info(decode_info(data)),
        (STATUS_LEN, OP_STATUS) => Frame::Status(decode_status(data)),
        (DIVINE_LEN, OP_REPORT) if data[16] == SUBTYPE_DIVINE => Frame::Divine(MixReport {
            mix_select: data[47],
        }),
        (SHORT_LEN, OP_REPORT) => Frame::Short(MixReport {
            mix_select: data[87],
        }),
        (COMPOSITE_LEN, OP_REPORT) if data[92] == SUBTYPE_DIVINE => Frame::Composite(MixReport {
            mix_select: data[123],
        }),
        (CONFIG_LEN, OP_CONFIG) => Frame::Config(decode_config(data)),
        _ => Frame::Unrecognized,
    }
}

fn decode_info(data: &[u8]) -> InfoReport {
    let product = if data[24] == 49 && data[25] == 0 {
        Product::Divine
    } else {
        Product::Unknown
    };
    InfoReport {
        firmware: Firmware {
            high: data[17],
            low: data[16],
        },
        product,
        host_name: name_field(&data[40..72]),
        friendly_name: name_field(&data[72..104]),
        domain_name: name_field(&data[104..136]),
    }
}

fn decode_status(data: &[u8]) -> StatusReport {
    let mut levels = [0.0; 8];
    for (level, &raw) in levels.iter_mut().zip(&data[0x1C..0x24]) {
        *level = level_db(raw);
    }
    StatusReport {
        levels,
        pot_position: data[36],
        volume: data[37],
        temperature: temperature_c(data[38]),
    }
}

fn decode_config(data: &[u8]) -> ConfigReport {
    let flags = data[11];
    ConfigReport {
        sequence: data[12],
        device_id: format!("{:x}{:x}{:x}", data[13], data[14], data[15]),
        status_ip: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
        status_port: u16::from(data[20]) * 256 + u16::from(data[21]),
        exclusive: flags & 0x01 != 0,
        password_valid: flags & 0x04 != 0,
        access_granted: flags & 0x08 != 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsctrl_test_harness::frames;

    fn id() -> ControllerId {
        ControllerId::default()
    }

    // -- encoding --

    #[test]
    fn encode_get_info() {
        let bytes = encode(&Request::GetInfo, &id(), true).unwrap();
        assert_eq!(
            bytes,
            vec![
                0x47, 0x53, 0x20, 0x43, 0x74, 0x72, 0x6C, 0x00, 0x10, 0x00, 0x05, 0x00, 0x42, 0x49,
                0x54, 0x46
            ]
        );
    }

    #[test]
    fn encode_get_config_flags_follow_fast_meters() {
        let slow = encode(&Request::GetConfig, &id(), false).unwrap();
        let fast = encode(&Request::GetConfig, &id(), true).unwrap();
        assert_eq!(&slow[8..12], &[0x10, 0x00, 0x07, 0x03]);
        assert_eq!(&fast[8..12], &[0x10, 0x00, 0x07, 0x01]);
        assert_eq!(slow.len(), HEADER_LEN);
    }

    #[test]
    fn encode_get_report_uses_literal_length() {
        let short = encode(&Request::GetReport(vec![0; 4]), &id(), false).unwrap();
        assert_eq!(&short[8..12], &[0x14, 0x00, 0x0B, 0x03]);
        assert_eq!(&short[16..], &[0, 0, 0, 0]);

        let long = encode(&Request::GetReport(vec![0x00, 0x10, 0, 0, 0, 0]), &id(), true).unwrap();
        assert_eq!(long[8], 0x14);
        assert_eq!(long[11], 0x01);
        assert_eq!(&long[16..], &[0x00, 0x10, 0, 0, 0, 0]);
    }

    #[test]
    fn encode_set_control_length_counts_payload() {
        let bytes = encode(&Request::SetControl(vec![0xAA, 0xBB, 0xCC]), &id(), false).unwrap();
        assert_eq!(bytes[8], 19);
        assert_eq!(bytes[10], 0x03);
        assert_eq!(bytes[11], 0x03);
        assert_eq!(&bytes[12..16], &[0x42, 0x49, 0x54, 0x46]);
        assert_eq!(&bytes[16..], &[0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn encode_set_control_rejects_oversized_payload() {
        let result = encode(&Request::SetControl(vec![0; 240]), &id(), false);
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert!(encode(&Request::SetControl(vec![0; 239]), &id(), false).is_ok());
    }

    #[test]
    fn encode_message_validates_controller_id() {
        for bad in ["", "1234567", "123456789", "1234567g"] {
            assert!(
                matches!(
                    encode_message(&Request::GetInfo, bad, false),
                    Err(Error::InvalidControllerId(_))
                ),
                "{bad:?} should be rejected"
            );
        }
        let bytes = encode_message(&Request::GetInfo, "0a0B0c0D", false).unwrap();
        assert_eq!(&bytes[12..16], &[0x0A, 0x0B, 0x0C, 0x0D]);
    }

    #[test]
    fn unknown_opcode_yields_no_request() {
        assert_eq!(Request::from_opcode(0x01, &[]), None);
        assert_eq!(Request::from_opcode(0xFF, &[1, 2]), None);
        assert_eq!(Request::from_opcode(0x05, &[1, 2]), Some(Request::GetInfo));
        assert_eq!(
            Request::from_opcode(0x0B, &[0; 4]),
            Some(Request::GetReport(vec![0; 4]))
        );
    }

    // -- decoding --

    #[test]
    fn decode_captured_info_report() {
        let Frame::Info(info) = decode(&frames::CAPTURED_INFO_REPORT) else {
            panic!("expected info report");
        };
        assert_eq!(info.firmware.to_string(), "36 0");
        assert_eq!(info.product, Product::Divine);
        assert_eq!(info.product.to_string(), "49 (Divine)");
        assert_eq!(info.host_name, "DIV-01-91e980");
        assert_eq!(info.friendly_name, "Divine-Marcin");
        assert_eq!(info.domain_name, "");
    }

    #[test]
    fn decode_info_unknown_product() {
        let frame = frames::info_frame([1, 2], [49, 1], "a", "b", "c");
        let Frame::Info(info) = decode(&frame) else {
            panic!("expected info report");
        };
        assert_eq!(info.product, Product::Unknown);
        assert_eq!(info.product.to_string(), "Unknown");
        assert_eq!(info.firmware, Firmware { high: 2, low: 1 });
    }

    #[test]
    fn decode_info_skips_interior_zero_bytes() {
        let mut frame = frames::info_frame([0, 0], [49, 0], "", "", "");
        frame[40] = b'A';
        frame[41] = 0;
        frame[42] = b'B';
        let Frame::Info(info) = decode(&frame) else {
            panic!("expected info report");
        };
        assert_eq!(info.host_name, "AB");
    }

    #[test]
    fn decode_captured_status_report() {
        let Frame::Status(status) = decode(&frames::CAPTURED_STATUS_REPORT) else {
            panic!("expected status report");
        };
        assert_eq!(status.levels, [-127.0; 8]);
        assert_eq!(status.pot_position, 19);
        assert_eq!(status.volume, 108);
        assert_eq!(status.volume_db(), Some(-9.5));
        assert_eq!(status.temperature, 42.0);
    }

    #[test]
    fn status_volume_extremes() {
        assert_eq!(volume_db(0), None);
        assert_eq!(volume_db(127), Some(0.0));
        assert_eq!(volume_db(64), Some(-31.5));
    }

    #[test]
    fn status_temperature_is_signed() {
        assert_eq!(temperature_c(0x00), 44.0);
        assert_eq!(temperature_c(0xFF), 43.5);
        assert_eq!(temperature_c(0x80), -20.0);
        assert_eq!(temperature_c(0x7F), 107.5);
    }

    #[test]
    fn status_level_offsets() {
        let mut levels = [0u8; 8];
        levels[0] = 0xFE;
        levels[7] = 2;
        let Frame::Status(status) = decode(&frames::status_frame(levels, 0, 0, 0)) else {
            panic!("expected status report");
        };
        assert_eq!(status.levels[0], -127.0);
        assert_eq!(status.levels[7], -1.0);
        assert_eq!(status.levels[3], 0.0);
    }

    #[test]
    fn decode_mix_reports() {
        assert_eq!(
            decode(&frames::CAPTURED_DIVINE_REPORT),
            Frame::Divine(MixReport { mix_select: 7 })
        );
        assert_eq!(
            decode(&frames::CAPTURED_FULL_REPORT),
            Frame::Short(MixReport { mix_select: 7 })
        );
        assert_eq!(
            decode(&frames::composite_frame(4, 3)),
            Frame::Composite(MixReport { mix_select: 3 })
        );
    }

    #[test]
    fn decode_mix_reports_require_divine_subtype() {
        let mut divine = frames::divine_frame(2);
        divine[16] = 3;
        assert_eq!(decode(&divine), Frame::Unrecognized);
        assert_eq!(decode(&frames::composite_frame(5, 3)), Frame::Unrecognized);
    }

    #[test]
    fn decode_config_report() {
        let frame = frames::config_frame(0x0D, 7, [0x91, 0xE9, 0x08], [192, 168, 1, 20], 41161);
        let Frame::Config(config) = decode(&frame) else {
            panic!("expected config report");
        };
        assert_eq!(config.sequence, 7);
        assert_eq!(config.device_id, "91e98");
        assert_eq!(config.status_ip, Ipv4Addr::new(192, 168, 1, 20));
        assert_eq!(config.status_port, 41161);
        assert!(config.exclusive);
        assert!(config.password_valid);
        assert!(config.access_granted);

        let frame = frames::config_frame(0x02, 0, [0, 0, 0], [0, 0, 0, 0], 0);
        let Frame::Config(config) = decode(&frame) else {
            panic!("expected config report");
        };
        assert!(!config.exclusive);
        assert!(!config.password_valid);
        assert!(!config.access_granted);
    }

    #[test]
    fn decode_unrecognized_shapes() {
        assert_eq!(decode(&[]), Frame::Unrecognized);
        assert_eq!(decode(&[0; 10]), Frame::Unrecognized);
        // Right length, wrong opcode.
        let mut status = frames::status_frame([0; 8], 0, 0, 0);
        status[10] = 2;
        assert_eq!(decode(&status), Frame::Unrecognized);
        // Right opcode, wrong length.
        let mut truncated = frames::CAPTURED_INFO_REPORT.to_vec();
        truncated.pop();
        assert_eq!(decode(&truncated), Frame::Unrecognized);
    }
}
