//! Command and response frames exchanged with the sensor.
//!
//! A command is 19 bytes: `AA B4 CMD D1..D12 ID1 ID2 CS AB`, where the
//! checksum is the byte sum of `CMD..ID2`. A response is 10 bytes, sentinel
//! included: `AA TYPE B2..B7 CS AB`, where the checksum is the byte sum of
//! `B2..B7`. Both directions use the same convention of keeping the leading
//! `AA` in the buffer.

use core::fmt::{Display, Formatter};

use crate::{
    DeviceId, Error, COMMAND_ID, COMMAND_LEN, DATA_REPORT_ID, HEAD, MAX_DATA_LEN, REPLY_ID,
    RESPONSE_LEN, TAIL,
};

/// Command codes understood by the sensor.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
#[repr(u8)]
pub enum CommandCode {
    ReportingMode = 0x02,
    QueryData = 0x04,
    SetDeviceId = 0x05,
    SleepWork = 0x06,
    Firmware = 0x07,
    WorkingPeriod = 0x08,
}

/// Classification of a response by its type byte.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum FrameKind {
    /// `0xC0`: a particulate matter measurement.
    Measurement,
    /// `0xC5`: a reply to a command.
    Reply,
    Unknown(u8),
}

impl From<u8> for FrameKind {
    fn from(byte: u8) -> Self {
        match byte {
            DATA_REPORT_ID => FrameKind::Measurement,
            REPLY_ID => FrameKind::Reply,
            other => FrameKind::Unknown(other),
        }
    }
}

/// A single data sample read from the SDS011 sensor.
///
/// Values are in µg/m³ with a resolution of 0.1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// PM2.5 concentration in µg/m³.
    pub pm2_5: f32,
    /// PM10 concentration in µg/m³.
    pub pm10: f32,
}

/// Firmware build date and id reported by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareInfo {
    /// Two-digit year.
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub device_id: u16,
}

impl Display for FirmwareInfo {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        write!(
            f,
            "20{:02}-{:02}-{:02} (id {:#06x})",
            self.year, self.month, self.day, self.device_id
        )
    }
}

/// A decoded `0xC5` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    /// The command code the sensor is answering.
    pub command: u8,
    /// The three bytes following the command code.
    pub data: [u8; 3],
    /// The id of the sensor that answered.
    pub device_id: DeviceId,
}

/// Additive checksum used by both frame directions.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Builds a command frame addressed to every sensor on the line.
///
/// `data` is zero-padded to 12 bytes. More than 12 bytes is rejected with
/// [`Error::InvalidArgument`].
pub fn build_command(code: u8, data: &[u8]) -> Result<[u8; COMMAND_LEN], Error> {
    build_addressed_command(code, data, DeviceId::BROADCAST)
}

/// Builds a command frame addressed to a single sensor.
pub fn build_addressed_command(
    code: u8,
    data: &[u8],
    id: DeviceId,
) -> Result<[u8; COMMAND_LEN], Error> {
    if data.len() > MAX_DATA_LEN {
        log::error!(
            "Command {:02X} carries {} data bytes, at most {} allowed",
            code,
            data.len(),
            MAX_DATA_LEN
        );
        return Err(Error::InvalidArgument);
    }

    let mut command = [0u8; COMMAND_LEN];
    command[0] = HEAD;
    command[1] = COMMAND_ID;
    command[2] = code;
    command[3..3 + data.len()].copy_from_slice(data);
    command[15] = id.id1;
    command[16] = id.id2;
    command[17] = checksum(&command[2..=16]);
    command[18] = TAIL;
    Ok(command)
}

/// Checks the checksum and terminator of a response frame.
pub fn verify(frame: &[u8; RESPONSE_LEN]) -> Result<(), Error> {
    let expected = checksum(&frame[2..8]);
    if expected != frame[8] {
        return Err(Error::BadChecksum {
            expected,
            actual: frame[8],
        });
    }
    if frame[0] != HEAD || frame[9] != TAIL {
        return Err(Error::InvalidFrame);
    }
    Ok(())
}

/// Decodes a measurement frame: `AA C0 PM25_L PM25_H PM10_L PM10_H ID1 ID2 CS AB`.
pub fn parse_measurement(frame: &[u8; RESPONSE_LEN]) -> Result<Reading, Error> {
    verify(frame)?;
    let pm2_5 = u16::from_le_bytes([frame[2], frame[3]]) as f32 / 10.0;
    let pm10 = u16::from_le_bytes([frame[4], frame[5]]) as f32 / 10.0;
    Ok(Reading { pm2_5, pm10 })
}

/// Decodes a firmware frame: `AA C5 07 YY MM DD ID1 ID2 CS AB`.
pub fn parse_firmware(frame: &[u8; RESPONSE_LEN]) -> Result<FirmwareInfo, Error> {
    verify(frame)?;
    if frame[1] != REPLY_ID || frame[2] != CommandCode::Firmware as u8 {
        return Err(Error::UnexpectedReply);
    }
    Ok(FirmwareInfo {
        year: frame[3],
        month: frame[4],
        day: frame[5],
        device_id: u16::from_le_bytes([frame[6], frame[7]]),
    })
}

/// Decodes a command reply: `AA C5 CMD D1 D2 D3 ID1 ID2 CS AB`.
pub fn parse_reply(frame: &[u8; RESPONSE_LEN]) -> Result<Reply, Error> {
    verify(frame)?;
    if frame[1] != REPLY_ID {
        return Err(Error::UnexpectedReply);
    }
    Ok(Reply {
        command: frame[2],
        data: [frame[3], frame[4], frame[5]],
        device_id: DeviceId {
            id1: frame[6],
            id2: frame[7],
        },
    })
}
