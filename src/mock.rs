//! In-memory serial port and frame builders for tests.

use std::collections::VecDeque;
use std::convert::Infallible;

use embedded_io_async::{ErrorType, Read, ReadReady, Write};

use crate::frame::checksum;
use crate::{DeviceId, DATA_REPORT_ID, HEAD, REPLY_ID, RESPONSE_LEN, TAIL};

/// What a read does once the scripted input is used up.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WhenDrained {
    /// Report end of input.
    Eof,
    /// Never complete, like a silent sensor.
    Hang,
}

pub struct MockSerial {
    pub rx: VecDeque<u8>,
    pub tx: Vec<u8>,
    pub when_drained: WhenDrained,
}

impl MockSerial {
    pub fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            tx: Vec::new(),
            when_drained: WhenDrained::Eof,
        }
    }

    pub fn hanging() -> Self {
        Self {
            when_drained: WhenDrained::Hang,
            ..Self::new()
        }
    }

    pub fn push(&mut self, bytes: &[u8]) -> &mut Self {
        self.rx.extend(bytes.iter().copied());
        self
    }

    /// Commands written so far, split into 19-byte frames.
    pub fn commands(&self) -> Vec<&[u8]> {
        self.tx.chunks(crate::COMMAND_LEN).collect()
    }
}

impl ErrorType for MockSerial {
    type Error = Infallible;
}

impl Read for MockSerial {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.rx.is_empty() {
            return match self.when_drained {
                WhenDrained::Eof => Ok(0),
                WhenDrained::Hang => core::future::pending().await,
            };
        }
        let mut count = 0;
        while count < buf.len() {
            match self.rx.pop_front() {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }
}

impl ReadReady for MockSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.rx.is_empty())
    }
}

impl Write for MockSerial {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.tx.extend_from_slice(buf);
        Ok(buf.len())
    }
}

fn seal(mut frame: [u8; RESPONSE_LEN]) -> [u8; RESPONSE_LEN] {
    frame[0] = HEAD;
    frame[8] = checksum(&frame[2..8]);
    frame[9] = TAIL;
    frame
}

pub fn measurement_frame(pm2_5_raw: u16, pm10_raw: u16) -> [u8; RESPONSE_LEN] {
    let [a, b] = pm2_5_raw.to_le_bytes();
    let [c, d] = pm10_raw.to_le_bytes();
    seal([0, DATA_REPORT_ID, a, b, c, d, 0x60, 0xA1, 0, 0])
}

pub fn reply_frame(command: u8, data: [u8; 3], id: DeviceId) -> [u8; RESPONSE_LEN] {
    seal([
        0, REPLY_ID, command, data[0], data[1], data[2], id.id1, id.id2, 0, 0,
    ])
}
