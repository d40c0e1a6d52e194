#![cfg_attr(not(any(test, feature = "std")), no_std)]

use embassy_time::with_timeout;
use embedded_io_async::{Read, ReadReady, Write};
use log::{debug, error, info, warn};

mod constants;
pub use constants::*;

mod error;
pub use error::*;

mod config;
pub use config::*;

pub mod frame;
pub use frame::{CommandCode, FirmwareInfo, FrameKind, Reading, Reply};

#[cfg(feature = "std")]
pub mod history;
#[cfg(feature = "std")]
pub mod sink;
#[cfg(feature = "std")]
pub mod station;

#[cfg(test)]
mod mock;

// Represents the operational state of the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationalState {
    /// Sensor is in low-power sleep mode, fan and laser off.
    Sleeping,
    /// Sensor is actively taking measurements.
    Working,
}

/// Progress of the most recent command/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// No exchange has started yet.
    Idle,
    /// A command was written and input is being scanned for the `0xAA` sentinel.
    AwaitingSentinel,
    /// The sentinel was seen and the remaining nine bytes are being read.
    AwaitingBody,
    /// The response was received and passed validation.
    Complete,
    /// The response was received but its checksum or terminator was wrong.
    ChecksumFailed,
}

/// What the session last told the sensor to do.
///
/// The sensor never reports changes on its own, so these are the settings
/// sent by this session, not values read back. `None` means the session has
/// not set it yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionState {
    pub mode: Option<DeviceMode>,
    pub operational: Option<OperationalState>,
    pub working_period: Option<u8>,
}

/// Represents an SDS011 air quality sensor.
///
/// The session owns the serial interface for its whole lifetime. Every
/// command is written only after the previous response has been received,
/// timed out, or failed.
///
/// # Type Parameters
///
/// * `Serial`: The type of the serial interface used to communicate with the sensor.
///   It must implement `embedded_io_async::Read` and `embedded_io_async::Write`.
pub struct Sds011<Serial> {
    serial: Serial,
    config: Config,
    state: SessionState,
    exchange: ExchangeState,
}

impl<S> Sds011<S>
where
    S: Read + Write,
{
    /// Creates a new `Sds011` sensor instance.
    ///
    /// No I/O happens until a command is issued.
    pub fn new(serial: S, config: Config) -> Self {
        Self {
            serial,
            config,
            state: SessionState::default(),
            exchange: ExchangeState::Idle,
        }
    }

    /// Gives the serial interface back, ending the session.
    pub fn release(self) -> S {
        self.serial
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Settings this session has sent to the sensor.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Where the most recent exchange ended up.
    pub fn last_exchange(&self) -> ExchangeState {
        self.exchange
    }

    /// Brings the sensor into a known state.
    ///
    /// This involves:
    /// - Waking the sensor up.
    /// - Reading the firmware version.
    /// - Setting the working period to continuous.
    /// - Setting the reporting mode from the configuration.
    pub async fn init(&mut self) -> Result<FirmwareInfo, Error> {
        self.set_sleep(false).await.map_err(|e| {
            error!("Failed to wake sensor during init: {:?}", e);
            e
        })?;

        let firmware = self.read_firmware_version().await.map_err(|e| {
            error!("Failed to read firmware version during init: {:?}", e);
            e
        })?;

        self.set_working_period(PERIOD_CONTINUOUS)
            .await
            .map_err(|e| {
                error!("Failed to set continuous working period during init: {:?}", e);
                e
            })?;

        let mode = self.config.mode;
        self.set_mode(mode).await.map_err(|e| {
            error!("Failed to set reporting mode to {:?} during init: {:?}", mode, e);
            e
        })?;

        debug!("SDS011 init sequence complete.");
        Ok(firmware)
    }

    /// Reads a single data sample from the SDS011 sensor.
    ///
    /// In Query mode the sensor is woken before the query and put back to
    /// sleep afterwards. In Active mode only the query is sent.
    ///
    /// Returns `Ok(None)` when the sensor answered with something other
    /// than a measurement.
    pub async fn read_sample(&mut self) -> Result<Option<Reading>, Error> {
        let query_mode = self.state.mode.unwrap_or(self.config.mode) == DeviceMode::Query;
        if query_mode {
            debug!("Waking up sensor (Query Mode)");
            self.set_sleep(false).await?;
        }

        let reading = self.query_data().await.map_err(|e| {
            error!("Failed to query sensor data: {:?}", e);
            e
        });

        if query_mode {
            debug!("Putting sensor back to sleep (Query Mode)");
            let slept = self.set_sleep(true).await;
            match (&reading, slept) {
                (Ok(_), slept) => slept?,
                (Err(_), Err(e)) => warn!("Failed to put sensor back to sleep: {:?}", e),
                (Err(_), Ok(())) => {}
            }
        }
        reading
    }

    /// Sets the sensor's reporting mode (Active or Query).
    pub async fn set_mode(&mut self, mode: DeviceMode) -> Result<(), Error> {
        debug!("Setting reporting mode to: {:?}", mode);
        let value = mode.as_byte();
        let frame = self
            .exchange(CommandCode::ReportingMode, &[0x01, value])
            .await?;
        self.confirm(&frame, CommandCode::ReportingMode, |reply| {
            reply.data[0] == 0x01 && reply.data[1] == value
        })?;
        self.state.mode = Some(mode);
        Ok(())
    }

    /// Asks the sensor for a measurement.
    ///
    /// Returns `Ok(None)` if the response is not a measurement frame. A
    /// measurement frame with a bad checksum or terminator is returned as a
    /// recoverable error; the caller may discard it and query again.
    pub async fn query_data(&mut self) -> Result<Option<Reading>, Error> {
        debug!("Querying sensor data (CMD 0x04)");
        let frame = self.exchange(CommandCode::QueryData, &[]).await?;

        match FrameKind::from(frame[1]) {
            FrameKind::Measurement => {
                let reading = frame::parse_measurement(&frame);
                let reading = self.settle(reading)?;
                debug!(
                    "Processed frame - PM2.5: {}, PM10: {}",
                    reading.pm2_5, reading.pm10
                );
                Ok(Some(reading))
            }
            kind => {
                debug!(
                    "query_data: {:?} frame is not a measurement: {:02X?}",
                    kind, frame
                );
                Ok(None)
            }
        }
    }

    /// Puts the sensor to sleep (`true`) or wakes it up (`false`).
    pub async fn set_sleep(&mut self, sleep: bool) -> Result<(), Error> {
        let (state, value) = if sleep {
            (OperationalState::Sleeping, 0x00)
        } else {
            (OperationalState::Working, 0x01)
        };
        debug!("Setting operational state to: {:?}", state);
        let frame = self
            .exchange(CommandCode::SleepWork, &[0x01, value])
            .await?;
        self.confirm(&frame, CommandCode::SleepWork, |reply| {
            reply.data[0] == 0x01 && reply.data[1] == value
        })?;
        self.state.operational = Some(state);
        Ok(())
    }

    /// Sets the sensor's working period.
    ///
    /// - A value of `0` sets the sensor to continuous working mode.
    /// - Values from `1` to `30` make the sensor work for 30 seconds and
    ///   sleep for the rest of each `period` minutes.
    ///
    /// Values above 30 are rejected with `Error::InvalidArgument` before
    /// anything is written.
    pub async fn set_working_period(&mut self, period: u8) -> Result<(), Error> {
        if period > MAX_WORKING_PERIOD {
            error!(
                "Working period {} out of range (0-{})",
                period, MAX_WORKING_PERIOD
            );
            return Err(Error::InvalidArgument);
        }
        debug!("Setting working period to: {} minutes", period);
        let frame = self
            .exchange(CommandCode::WorkingPeriod, &[0x01, period])
            .await?;
        self.confirm(&frame, CommandCode::WorkingPeriod, |reply| {
            reply.data[0] == 0x01 && reply.data[1] == period
        })?;
        self.state.working_period = Some(period);
        Ok(())
    }

    /// Retrieves the firmware build date and device id of the sensor.
    pub async fn read_firmware_version(&mut self) -> Result<FirmwareInfo, Error> {
        debug!("Getting firmware version (CMD 0x07)");
        let frame = self.exchange(CommandCode::Firmware, &[]).await?;
        let firmware = frame::parse_firmware(&frame);
        let firmware = self.settle(firmware)?;
        info!("SDS011 firmware {}", firmware);
        Ok(firmware)
    }

    /// Sets the device ID of the sensor.
    ///
    /// Later commands are addressed to the new id only once the sensor has
    /// answered with a valid reply echoing it. Otherwise the old id is kept.
    pub async fn set_device_id(&mut self, id: u16) -> Result<(), Error> {
        let new_id = DeviceId::from_u16(id);
        debug!("Setting device ID to: {:04X}", id);
        let mut data = [0u8; MAX_DATA_LEN];
        data[10] = new_id.id1;
        data[11] = new_id.id2;

        let frame = self.exchange(CommandCode::SetDeviceId, &data).await?;
        self.confirm(&frame, CommandCode::SetDeviceId, |reply| {
            reply.device_id == new_id
        })?;

        let echoed = frame::parse_reply(&frame).is_ok_and(|reply| {
            reply.command == CommandCode::SetDeviceId as u8 && reply.device_id == new_id
        });
        if echoed {
            self.config.id = new_id;
        } else {
            warn!(
                "Device ID change to {:04X} not echoed, still addressing {:04X}",
                id,
                self.config.id.as_u16()
            );
        }
        Ok(())
    }

    /// Queries the sensor's current reporting mode.
    pub async fn get_reporting_mode(&mut self) -> Result<DeviceMode, Error> {
        debug!("Querying reporting mode (CMD 0x02, Query)");
        let reply = self.query_setting(CommandCode::ReportingMode).await?;
        let mode = DeviceMode::from_byte(reply.data[1]);
        debug!("Queried reporting mode: {:?}", mode);
        Ok(mode)
    }

    /// Queries the sensor's current operational state.
    pub async fn get_operational_state(&mut self) -> Result<OperationalState, Error> {
        debug!("Querying operational state (CMD 0x06, Query)");
        let reply = self.query_setting(CommandCode::SleepWork).await?;
        let state = if reply.data[1] == 0x01 {
            OperationalState::Working
        } else {
            OperationalState::Sleeping
        };
        debug!("Queried operational state: {:?}", state);
        Ok(state)
    }

    /// Queries the sensor's current working period in minutes.
    pub async fn get_working_period(&mut self) -> Result<u8, Error> {
        debug!("Querying working period (CMD 0x08, Query)");
        let reply = self.query_setting(CommandCode::WorkingPeriod).await?;
        debug!("Queried working period: {} minutes", reply.data[1]);
        Ok(reply.data[1])
    }

    /// Waits for the next response frame.
    ///
    /// Bytes before the `0xAA` sentinel are discarded, which also throws away
    /// leftovers of an earlier exchange. Once the sentinel is seen exactly
    /// nine more bytes are read. Fails with `Error::Timeout` if the frame is
    /// not complete within the configured response timeout.
    pub async fn await_response(&mut self) -> Result<[u8; RESPONSE_LEN], Error> {
        let timeout = self.config.response_timeout;
        match with_timeout(timeout, self.read_frame()).await {
            Ok(frame) => frame,
            Err(_) => {
                warn!(
                    "No response within {} ms ({:?})",
                    timeout.as_millis(),
                    self.exchange
                );
                Err(Error::Timeout)
            }
        }
    }

    async fn read_frame(&mut self) -> Result<[u8; RESPONSE_LEN], Error> {
        self.exchange = ExchangeState::AwaitingSentinel;
        let mut byte = [0u8; 1];
        let mut skipped = 0usize;
        loop {
            self.serial.read_exact(&mut byte).await.map_err(|e| {
                error!("Serial read error while waiting for sentinel: {:?}", e);
                Error::ReadFailure
            })?;
            if byte[0] == HEAD {
                break;
            }
            skipped += 1;
        }
        if skipped > 0 {
            debug!("Discarded {} bytes before sentinel", skipped);
        }

        self.exchange = ExchangeState::AwaitingBody;
        let mut frame = [0u8; RESPONSE_LEN];
        frame[0] = HEAD;
        self.serial
            .read_exact(&mut frame[1..])
            .await
            .map_err(|e| {
                error!("Serial read error while reading frame body: {:?}", e);
                Error::ReadFailure
            })?;

        debug!("Received frame: {:02X?}", frame);
        self.exchange = match frame::verify(&frame) {
            Ok(()) => ExchangeState::Complete,
            Err(_) => ExchangeState::ChecksumFailed,
        };
        Ok(frame)
    }

    // Writes a command addressed to the configured device.
    async fn send(&mut self, code: CommandCode, data: &[u8]) -> Result<(), Error> {
        let command = frame::build_addressed_command(code as u8, data, self.config.id)?;

        debug!("Executing command: {:02X?}", command);
        self.serial.write_all(&command).await.map_err(|e| {
            error!("Serial write error: {:?}", e);
            Error::WriteFailure
        })?;
        self.serial.flush().await.map_err(|e| {
            error!("Serial flush error: {:?}", e);
            Error::WriteFailure
        })?;
        Ok(())
    }

    async fn exchange(
        &mut self,
        code: CommandCode,
        data: &[u8],
    ) -> Result<[u8; RESPONSE_LEN], Error> {
        self.send(code, data).await?;
        self.await_response().await
    }

    async fn query_setting(&mut self, code: CommandCode) -> Result<Reply, Error> {
        let frame = self.exchange(code, &[0x00]).await?;
        let reply = frame::parse_reply(&frame);
        let reply = self.settle(reply)?;
        if reply.command != code as u8 || reply.data[0] != 0x00 {
            warn!(
                "Unexpected reply to {:?} query: {:02X?}",
                code, frame
            );
            return Err(Error::UnexpectedReply);
        }
        Ok(reply)
    }

    // Records how the exchange ended from the outcome of parsing its frame.
    fn settle<T>(&mut self, parsed: Result<T, Error>) -> Result<T, Error> {
        self.exchange = match &parsed {
            Err(e) if e.is_recoverable() => {
                warn!("Discarding response: {}", e);
                ExchangeState::ChecksumFailed
            }
            _ => ExchangeState::Complete,
        };
        parsed
    }

    // Checks the reply to a set command according to the confirmation policy.
    fn confirm(
        &mut self,
        frame: &[u8; RESPONSE_LEN],
        code: CommandCode,
        echoes: impl Fn(&Reply) -> bool,
    ) -> Result<(), Error> {
        let verdict = match FrameKind::from(frame[1]) {
            // The sensor may answer with a pending data report instead of the
            // reply right after waking or switching modes.
            FrameKind::Measurement => frame::verify(frame),
            _ => frame::parse_reply(frame).and_then(|reply| {
                if reply.command == code as u8 && echoes(&reply) {
                    Ok(())
                } else {
                    Err(Error::UnexpectedReply)
                }
            }),
        };
        let verdict = self.settle(verdict);

        match (verdict, self.config.confirmation) {
            (Ok(()), _) => {
                debug!("{:?} confirmed, reply: {:02X?}", code, frame);
                Ok(())
            }
            (Err(e), Confirmation::Lenient) => {
                debug!("Ignoring unconfirmed {:?} ({}): {:02X?}", code, e, frame);
                Ok(())
            }
            (Err(e), Confirmation::Strict) => {
                error!("{:?} not confirmed ({}), reply: {:02X?}", code, e, frame);
                Err(Error::CommandFailed)
            }
        }
    }
}

impl<S> Sds011<S>
where
    S: Read + Write + ReadReady,
{
    /// Discards any input already buffered by the serial interface.
    ///
    /// Returns the number of bytes dropped.
    pub async fn flush_input(&mut self) -> Result<usize, Error> {
        let mut scratch = [0u8; 32];
        let mut dropped = 0;
        while self.serial.read_ready().map_err(|_| Error::ReadFailure)? {
            let count = self
                .serial
                .read(&mut scratch)
                .await
                .map_err(|_| Error::ReadFailure)?;
            if count == 0 {
                break;
            }
            dropped += count;
        }
        if dropped > 0 {
            debug!("Flushed {} bytes of stale input", dropped);
        }
        Ok(dropped)
    }
}
