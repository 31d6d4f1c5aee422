//! Versioned binary capture format (`.wrcdata`).
//!
//! Little-endian, fixed-layout, auto-detected by a 16-byte magic string.
//! Only raw, untransformed samples plus metadata are stored, so a capture
//! stays reprocessable after any pipeline parameter change.
//!
//! | Version | Magic          | Header | Sections |
//! |---------|----------------|--------|----------|
//! | V1      | `WRC_COACH_V1` | 64 B   | header, IMU[], GPS[] |
//! | V2      | `WRC_COACH_V2` | 128 B  | header, calibration (64 B), IMU[], GPS[], calibration IMU[] |
//! | V3      | `WRC_COACH_V3` | 64 B   | header, IMU[], GPS[] — no calibration, axes re-detected at load |
//!
//! IMU record: t f64, ax ay az gx gy gz f32 ×6 (32 B). GPS record: t f64,
//! lat lon f64 ×2, speed heading accuracy f32 ×3 (36 B). Decoders accept all
//! versions; the encoder writes whichever version the metadata names.
//! Reserved header bytes are zero-filled and never reinterpreted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{CalibrationData, GpsSample, ImuSample, PhoneOrientation};

pub const MAGIC_LEN: usize = 16;
pub const IMU_RECORD_SIZE: usize = 32;
pub const GPS_RECORD_SIZE: usize = 36;
pub const CALIBRATION_BLOCK_SIZE: usize = 64;

/// The version new captures are written in.
pub const CURRENT_VERSION: FormatVersion = FormatVersion::V3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatVersion {
    V1,
    V2,
    V3,
}

impl FormatVersion {
    pub fn header_len(self) -> usize {
        match self {
            FormatVersion::V1 | FormatVersion::V3 => 64,
            FormatVersion::V2 => 128,
        }
    }

    fn magic(self) -> &'static [u8; 12] {
        match self {
            FormatVersion::V1 => b"WRC_COACH_V1",
            FormatVersion::V2 => b"WRC_COACH_V2",
            FormatVersion::V3 => b"WRC_COACH_V3",
        }
    }
}

/// Decode failures. Both are terminal: there is no partial or best-effort
/// decode. Degraded content (e.g. a capture with zero strokes) is not an
/// error and never surfaces here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("unrecognized capture format: {0:?}")]
    Format(String),

    #[error("truncated capture: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
}

/// Session-level metadata carried in the capture header.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub format_version: FormatVersion,
    pub session_start: f64, // ms since epoch
    pub phone_orientation: PhoneOrientation,
    pub demo_mode: bool,
    /// Stored detector settings; V3 captures carry none.
    pub catch_threshold: Option<f32>,
    pub finish_threshold: Option<f32>,
}

impl Default for SessionMetadata {
    fn default() -> Self {
        Self {
            format_version: CURRENT_VERSION,
            session_start: 0.0,
            phone_orientation: PhoneOrientation::Rower,
            demo_mode: false,
            catch_threshold: None,
            finish_threshold: None,
        }
    }
}

/// A decoded (or to-be-encoded) capture.
#[derive(Clone, Debug, Default)]
pub struct Capture {
    pub metadata: SessionMetadata,
    pub imu: Vec<ImuSample>,
    pub gps: Vec<GpsSample>,
    /// V2 only; V1 predates calibration, V3 re-detects axes at load time.
    pub calibration: Option<CalibrationData>,
    /// Raw samples recorded during the calibration hold (V2 only).
    pub calibration_samples: Vec<ImuSample>,
}

// ── Fixed-layout headers, one per version ────────────────────────────────────

#[derive(Clone, Copy, Debug)]
struct HeaderV1 {
    imu_count: u32,
    gps_count: u32,
    session_start: f64,
    phone_orientation: u8,
    demo_mode: u8,
    catch_threshold: f32,
    finish_threshold: f32,
}

impl HeaderV1 {
    const SIZE: usize = 64;

    fn read(buf: &[u8]) -> Self {
        Self {
            imu_count: read_u32(buf, 16),
            gps_count: read_u32(buf, 20),
            session_start: read_f64(buf, 24),
            phone_orientation: buf[32],
            demo_mode: buf[33],
            catch_threshold: read_f32(buf, 34),
            finish_threshold: read_f32(buf, 38),
        }
    }

    fn write(&self, buf: &mut [u8]) {
        buf[0..12].copy_from_slice(FormatVersion::V1.magic());
        write_u32(buf, 16, self.imu_count);
        write_u32(buf, 20, self.gps_count);
        write_f64(buf, 24, self.session_start);
        buf[32] = self.phone_orientation;
        buf[33] = self.demo_mode;
        write_f32(buf, 34, self.catch_threshold);
        write_f32(buf, 38, self.finish_threshold);
    }
}

#[derive(Clone, Copy, Debug)]
struct HeaderV2 {
    imu_count: u32,
    gps_count: u32,
    calibration_count: u32,
    has_calibration: u8,
    session_start: f64, // unaligned at offset 29, by layout history
    phone_orientation: u8,
    demo_mode: u8,
    catch_threshold: f32,
    finish_threshold: f32,
}

impl HeaderV2 {
    const SIZE: usize = 128;

    fn read(buf: &[u8]) -> Self {
        Self {
            imu_count: read_u32(buf, 16),
            gps_count: read_u32(buf, 20),
            calibration_count: read_u32(buf, 24),
            has_calibration: buf[28],
            session_start: read_f64(buf, 29),
            phone_orientation: buf[37],
            demo_mode: buf[38],
            catch_threshold: read_f32(buf, 39),
            finish_threshold: read_f32(buf, 43),
        }
    }

    fn write(&self, buf: &mut [u8]) {
        buf[0..12].copy_from_slice(FormatVersion::V2.magic());
        write_u32(buf, 16, self.imu_count);
        write_u32(buf, 20, self.gps_count);
        write_u32(buf, 24, self.calibration_count);
        buf[28] = self.has_calibration;
        write_f64(buf, 29, self.session_start);
        buf[37] = self.phone_orientation;
        buf[38] = self.demo_mode;
        write_f32(buf, 39, self.catch_threshold);
        write_f32(buf, 43, self.finish_threshold);
    }
}

#[derive(Clone, Copy, Debug)]
struct HeaderV3 {
    imu_count: u32,
    gps_count: u32,
    session_start: f64,
    phone_orientation: u8,
    demo_mode: u8,
}

impl HeaderV3 {
    const SIZE: usize = 64;

    fn read(buf: &[u8]) -> Self {
        Self {
            imu_count: read_u32(buf, 16),
            gps_count: read_u32(buf, 20),
            session_start: read_f64(buf, 24),
            phone_orientation: buf[32],
            demo_mode: buf[33],
        }
    }

    fn write(&self, buf: &mut [u8]) {
        buf[0..12].copy_from_slice(FormatVersion::V3.magic());
        write_u32(buf, 16, self.imu_count);
        write_u32(buf, 20, self.gps_count);
        write_f64(buf, 24, self.session_start);
        buf[32] = self.phone_orientation;
        buf[33] = self.demo_mode;
    }
}

/// Tagged union over the three header layouts, selected by magic string.
enum CaptureHeader {
    V1(HeaderV1),
    V2(HeaderV2),
    V3(HeaderV3),
}

impl CaptureHeader {
    fn parse(data: &[u8]) -> Result<Self, CaptureError> {
        ensure(data, MAGIC_LEN)?;
        let version = if &data[0..12] == FormatVersion::V1.magic() {
            FormatVersion::V1
        } else if &data[0..12] == FormatVersion::V2.magic() {
            FormatVersion::V2
        } else if &data[0..12] == FormatVersion::V3.magic() {
            FormatVersion::V3
        } else {
            let shown = String::from_utf8_lossy(&data[0..MAGIC_LEN])
                .trim_end_matches('\0')
                .to_string();
            return Err(CaptureError::Format(shown));
        };
        ensure(data, version.header_len())?;
        Ok(match version {
            FormatVersion::V1 => CaptureHeader::V1(HeaderV1::read(data)),
            FormatVersion::V2 => CaptureHeader::V2(HeaderV2::read(data)),
            FormatVersion::V3 => CaptureHeader::V3(HeaderV3::read(data)),
        })
    }
}

impl Capture {
    /// Serialize into one contiguous buffer, in the version the metadata
    /// names. V1 and V3 layouts have no calibration section; any calibration
    /// on the capture is simply not written there.
    pub fn encode(&self) -> Vec<u8> {
        match self.metadata.format_version {
            FormatVersion::V1 => self.encode_v1(),
            FormatVersion::V2 => self.encode_v2(),
            FormatVersion::V3 => self.encode_v3(),
        }
    }

    fn encode_v1(&self) -> Vec<u8> {
        let total =
            HeaderV1::SIZE + self.imu.len() * IMU_RECORD_SIZE + self.gps.len() * GPS_RECORD_SIZE;
        let mut out = vec![0u8; total];
        HeaderV1 {
            imu_count: self.imu.len() as u32,
            gps_count: self.gps.len() as u32,
            session_start: self.metadata.session_start,
            phone_orientation: self.metadata.phone_orientation.to_wire(),
            demo_mode: self.metadata.demo_mode as u8,
            catch_threshold: self.metadata.catch_threshold.unwrap_or(0.0),
            finish_threshold: self.metadata.finish_threshold.unwrap_or(0.0),
        }
        .write(&mut out);
        let mut offset = HeaderV1::SIZE;
        offset = write_imu_section(&mut out, offset, &self.imu);
        write_gps_section(&mut out, offset, &self.gps);
        out
    }

    fn encode_v2(&self) -> Vec<u8> {
        let calibration_block = if self.calibration.is_some() {
            CALIBRATION_BLOCK_SIZE
        } else {
            0
        };
        let total = HeaderV2::SIZE
            + calibration_block
            + self.imu.len() * IMU_RECORD_SIZE
            + self.gps.len() * GPS_RECORD_SIZE
            + self.calibration_samples.len() * IMU_RECORD_SIZE;
        let mut out = vec![0u8; total];
        HeaderV2 {
            imu_count: self.imu.len() as u32,
            gps_count: self.gps.len() as u32,
            calibration_count: self.calibration_samples.len() as u32,
            has_calibration: self.calibration.is_some() as u8,
            session_start: self.metadata.session_start,
            phone_orientation: self.metadata.phone_orientation.to_wire(),
            demo_mode: self.metadata.demo_mode as u8,
            catch_threshold: self.metadata.catch_threshold.unwrap_or(0.0),
            finish_threshold: self.metadata.finish_threshold.unwrap_or(0.0),
        }
        .write(&mut out);
        let mut offset = HeaderV2::SIZE;
        if let Some(calibration) = &self.calibration {
            write_calibration(&mut out, offset, calibration);
            offset += CALIBRATION_BLOCK_SIZE;
        }
        offset = write_imu_section(&mut out, offset, &self.imu);
        offset = write_gps_section(&mut out, offset, &self.gps);
        write_imu_section(&mut out, offset, &self.calibration_samples);
        out
    }

    fn encode_v3(&self) -> Vec<u8> {
        let total =
            HeaderV3::SIZE + self.imu.len() * IMU_RECORD_SIZE + self.gps.len() * GPS_RECORD_SIZE;
        let mut out = vec![0u8; total];
        HeaderV3 {
            imu_count: self.imu.len() as u32,
            gps_count: self.gps.len() as u32,
            session_start: self.metadata.session_start,
            phone_orientation: self.metadata.phone_orientation.to_wire(),
            demo_mode: self.metadata.demo_mode as u8,
        }
        .write(&mut out);
        let mut offset = HeaderV3::SIZE;
        offset = write_imu_section(&mut out, offset, &self.imu);
        write_gps_section(&mut out, offset, &self.gps);
        out
    }

    /// Decode any supported version. A short buffer or a bad magic string is
    /// a terminal error; there is no best-effort mode.
    pub fn decode(data: &[u8]) -> Result<Capture, CaptureError> {
        match CaptureHeader::parse(data)? {
            CaptureHeader::V1(h) => {
                let imu_len = h.imu_count as usize * IMU_RECORD_SIZE;
                let gps_len = h.gps_count as usize * GPS_RECORD_SIZE;
                ensure(data, HeaderV1::SIZE + imu_len + gps_len)?;
                let mut offset = HeaderV1::SIZE;
                let imu = read_imu_section(data, &mut offset, h.imu_count as usize);
                let gps = read_gps_section(data, &mut offset, h.gps_count as usize);
                Ok(Capture {
                    metadata: SessionMetadata {
                        format_version: FormatVersion::V1,
                        session_start: h.session_start,
                        phone_orientation: PhoneOrientation::from_wire(h.phone_orientation),
                        demo_mode: h.demo_mode == 1,
                        catch_threshold: Some(h.catch_threshold),
                        finish_threshold: Some(h.finish_threshold),
                    },
                    imu,
                    gps,
                    calibration: None,
                    calibration_samples: Vec::new(),
                })
            }
            CaptureHeader::V2(h) => {
                let calibration_block = if h.has_calibration == 1 {
                    CALIBRATION_BLOCK_SIZE
                } else {
                    0
                };
                let imu_len = h.imu_count as usize * IMU_RECORD_SIZE;
                let gps_len = h.gps_count as usize * GPS_RECORD_SIZE;
                let cal_len = h.calibration_count as usize * IMU_RECORD_SIZE;
                ensure(
                    data,
                    HeaderV2::SIZE + calibration_block + imu_len + gps_len + cal_len,
                )?;
                let mut offset = HeaderV2::SIZE;
                let calibration = if h.has_calibration == 1 {
                    let c = read_calibration(data, offset);
                    offset += CALIBRATION_BLOCK_SIZE;
                    Some(c)
                } else {
                    None
                };
                let imu = read_imu_section(data, &mut offset, h.imu_count as usize);
                let gps = read_gps_section(data, &mut offset, h.gps_count as usize);
                let calibration_samples =
                    read_imu_section(data, &mut offset, h.calibration_count as usize);
                Ok(Capture {
                    metadata: SessionMetadata {
                        format_version: FormatVersion::V2,
                        session_start: h.session_start,
                        phone_orientation: PhoneOrientation::from_wire(h.phone_orientation),
                        demo_mode: h.demo_mode == 1,
                        catch_threshold: Some(h.catch_threshold),
                        finish_threshold: Some(h.finish_threshold),
                    },
                    imu,
                    gps,
                    calibration,
                    calibration_samples,
                })
            }
            CaptureHeader::V3(h) => {
                let imu_len = h.imu_count as usize * IMU_RECORD_SIZE;
                let gps_len = h.gps_count as usize * GPS_RECORD_SIZE;
                ensure(data, HeaderV3::SIZE + imu_len + gps_len)?;
                let mut offset = HeaderV3::SIZE;
                let imu = read_imu_section(data, &mut offset, h.imu_count as usize);
                let gps = read_gps_section(data, &mut offset, h.gps_count as usize);
                Ok(Capture {
                    metadata: SessionMetadata {
                        format_version: FormatVersion::V3,
                        session_start: h.session_start,
                        phone_orientation: PhoneOrientation::from_wire(h.phone_orientation),
                        demo_mode: h.demo_mode == 1,
                        catch_threshold: None,
                        finish_threshold: None,
                    },
                    imu,
                    gps,
                    calibration: None,
                    calibration_samples: Vec::new(),
                })
            }
        }
    }
}

// ── Record codecs ────────────────────────────────────────────────────────────

fn write_imu_section(buf: &mut [u8], mut offset: usize, samples: &[ImuSample]) -> usize {
    for s in samples {
        write_f64(buf, offset, s.timestamp);
        write_f32(buf, offset + 8, s.ax);
        write_f32(buf, offset + 12, s.ay);
        write_f32(buf, offset + 16, s.az);
        write_f32(buf, offset + 20, s.gx);
        write_f32(buf, offset + 24, s.gy);
        write_f32(buf, offset + 28, s.gz);
        offset += IMU_RECORD_SIZE;
    }
    offset
}

fn read_imu_section(buf: &[u8], offset: &mut usize, count: usize) -> Vec<ImuSample> {
    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        let o = *offset;
        samples.push(ImuSample {
            timestamp: read_f64(buf, o),
            ax: read_f32(buf, o + 8),
            ay: read_f32(buf, o + 12),
            az: read_f32(buf, o + 16),
            gx: read_f32(buf, o + 20),
            gy: read_f32(buf, o + 24),
            gz: read_f32(buf, o + 28),
        });
        *offset += IMU_RECORD_SIZE;
    }
    samples
}

fn write_gps_section(buf: &mut [u8], mut offset: usize, samples: &[GpsSample]) -> usize {
    for s in samples {
        write_f64(buf, offset, s.timestamp);
        write_f64(buf, offset + 8, s.latitude);
        write_f64(buf, offset + 16, s.longitude);
        write_f32(buf, offset + 24, s.speed);
        write_f32(buf, offset + 28, s.heading);
        write_f32(buf, offset + 32, s.accuracy);
        offset += GPS_RECORD_SIZE;
    }
    offset
}

fn read_gps_section(buf: &[u8], offset: &mut usize, count: usize) -> Vec<GpsSample> {
    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        let o = *offset;
        samples.push(GpsSample {
            timestamp: read_f64(buf, o),
            latitude: read_f64(buf, o + 8),
            longitude: read_f64(buf, o + 16),
            speed: read_f32(buf, o + 24),
            heading: read_f32(buf, o + 28),
            accuracy: read_f32(buf, o + 32),
        });
        *offset += GPS_RECORD_SIZE;
    }
    samples
}

fn write_calibration(buf: &mut [u8], offset: usize, c: &CalibrationData) {
    write_f32(buf, offset, c.pitch_offset);
    write_f32(buf, offset + 4, c.roll_offset);
    write_f32(buf, offset + 8, c.yaw_offset);
    write_f32(buf, offset + 12, c.lateral_offset);
    write_f32(buf, offset + 16, c.gravity_magnitude);
    write_u32(buf, offset + 20, c.sample_count);
    write_f32(buf, offset + 24, c.variance);
    write_f64(buf, offset + 28, c.timestamp);
    // bytes 36..64 reserved, already zero
}

fn read_calibration(buf: &[u8], offset: usize) -> CalibrationData {
    CalibrationData {
        pitch_offset: read_f32(buf, offset),
        roll_offset: read_f32(buf, offset + 4),
        yaw_offset: read_f32(buf, offset + 8),
        lateral_offset: read_f32(buf, offset + 12),
        gravity_magnitude: read_f32(buf, offset + 16),
        sample_count: read_u32(buf, offset + 20),
        variance: read_f32(buf, offset + 24),
        timestamp: read_f64(buf, offset + 28),
    }
}

// ── Little-endian primitives ─────────────────────────────────────────────────

fn ensure(data: &[u8], needed: usize) -> Result<(), CaptureError> {
    if data.len() < needed {
        Err(CaptureError::Truncated {
            needed,
            available: data.len(),
        })
    } else {
        Ok(())
    }
}

fn read_u32(buf: &[u8], o: usize) -> u32 {
    u32::from_le_bytes([buf[o], buf[o + 1], buf[o + 2], buf[o + 3]])
}

fn read_f32(buf: &[u8], o: usize) -> f32 {
    f32::from_le_bytes([buf[o], buf[o + 1], buf[o + 2], buf[o + 3]])
}

fn read_f64(buf: &[u8], o: usize) -> f64 {
    f64::from_le_bytes([
        buf[o],
        buf[o + 1],
        buf[o + 2],
        buf[o + 3],
        buf[o + 4],
        buf[o + 5],
        buf[o + 6],
        buf[o + 7],
    ])
}

fn write_u32(buf: &mut [u8], o: usize, v: u32) {
    buf[o..o + 4].copy_from_slice(&v.to_le_bytes());
}

fn write_f32(buf: &mut [u8], o: usize, v: f32) {
    buf[o..o + 4].copy_from_slice(&v.to_le_bytes());
}

fn write_f64(buf: &mut [u8], o: usize, v: f64) {
    buf[o..o + 8].copy_from_slice(&v.to_le_bytes());
}
