//! Polling loop that wakes the sensor, collects a reading, stores and
//! publishes it, then lets the sensor rest.
//!
//! The station does not open the serial port itself. The caller opens
//! [`DEFAULT_DEVICE_PATH`](crate::DEFAULT_DEVICE_PATH) (or another device) at
//! [`BAUD_RATE`](crate::BAUD_RATE), 8N1, wraps it in the `embedded-io-async`
//! traits and hands it to [`Sds011::new`].

use embassy_time::{Duration, Timer};
use embedded_io_async::{Read, Write};
use log::{debug, error, info, warn};
use thiserror::Error;

use crate::{
    history::{HistoryEntry, ReadingLog},
    sink::Publish,
    Reading, Sds011, DEFAULT_TOPIC,
};

#[derive(Debug, Error)]
pub enum StationError {
    #[error("sensor error: {0}")]
    Sensor(#[from] crate::Error),
}

/// Timing and naming of the polling loop.
#[derive(Debug, Clone, PartialEq)]
pub struct StationConfig {
    /// Queries sent per cycle while the sensor is awake.
    pub polls_per_cycle: u32,
    /// Pause between two queries.
    pub poll_interval: Duration,
    /// Time the sensor sleeps between cycles.
    pub rest_interval: Duration,
    /// Topic readings are published on.
    pub topic: String,
}

impl StationConfig {
    pub fn polls_per_cycle(mut self, polls: u32) -> Self {
        self.polls_per_cycle = polls;
        self
    }
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
    pub fn rest_interval(mut self, interval: Duration) -> Self {
        self.rest_interval = interval;
        self
    }
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            polls_per_cycle: 15,
            poll_interval: Duration::from_secs(2),
            rest_interval: Duration::from_secs(60),
            topic: DEFAULT_TOPIC.to_string(),
        }
    }
}

pub struct Station<S> {
    sensor: Sds011<S>,
    log: ReadingLog,
    sink: Option<Box<dyn Publish>>,
    config: StationConfig,
}

impl<S> Station<S>
where
    S: Read + Write,
{
    pub fn new(sensor: Sds011<S>, log: ReadingLog, config: StationConfig) -> Self {
        Self {
            sensor,
            log,
            sink: None,
            config,
        }
    }

    /// Publishes every stored reading to `sink` as well.
    pub fn with_sink(mut self, sink: impl Publish + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn sensor(&mut self) -> &mut Sds011<S> {
        &mut self.sensor
    }

    pub fn into_sensor(self) -> Sds011<S> {
        self.sensor
    }

    /// Initialises the sensor, then runs cycles until the sensor fails.
    pub async fn run(&mut self) -> Result<(), StationError> {
        self.sensor.init().await?;
        loop {
            self.run_cycle().await?;
            info!(
                "Going to sleep for {} s",
                self.config.rest_interval.as_secs()
            );
            Timer::after(self.config.rest_interval).await;
        }
    }

    /// Runs one wake, poll, store, sleep cycle.
    ///
    /// Returns the last reading collected, which is the one stored and
    /// published. Corrupt frames are skipped; timeouts and transport
    /// failures end the cycle with an error.
    pub async fn run_cycle(&mut self) -> Result<Option<Reading>, StationError> {
        self.sensor.set_sleep(false).await?;

        let mut latest = None;
        for poll in 0..self.config.polls_per_cycle {
            match self.sensor.query_data().await {
                Ok(Some(reading)) => {
                    info!(
                        "PM2.5: {} µg/m³, PM10: {} µg/m³",
                        reading.pm2_5, reading.pm10
                    );
                    latest = Some(reading);
                }
                Ok(None) => debug!("Poll {} returned no measurement", poll),
                Err(e) if e.is_recoverable() => warn!("Poll {} discarded: {}", poll, e),
                Err(e) => return Err(e.into()),
            }
            if poll + 1 < self.config.polls_per_cycle {
                Timer::after(self.config.poll_interval).await;
            }
        }

        match latest {
            Some(reading) => self.store(&reading),
            None => warn!("No reading collected this cycle"),
        }

        self.sensor.set_sleep(true).await?;
        Ok(latest)
    }

    fn store(&mut self, reading: &Reading) {
        let entry = HistoryEntry::now(reading);
        match self.log.append(entry.clone()) {
            Ok(count) => debug!(
                "History at {} holds {} entries",
                self.log.path().display(),
                count
            ),
            Err(e) => error!(
                "Failed to store reading in {}: {}",
                self.log.path().display(),
                e
            ),
        }

        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.publish(&self.config.topic, &entry) {
                warn!("Failed to publish reading on {}: {}", self.config.topic, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, fs, rc::Rc};

    use approx::assert_relative_eq;
    use embassy_futures::block_on;

    use super::*;
    use crate::{
        mock::{measurement_frame, reply_frame, MockSerial},
        sink::SinkError,
        CommandCode, Config, DeviceId, Error, OperationalState,
    };

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<(String, HistoryEntry)>>>);

    impl Publish for Recorder {
        fn publish(&mut self, topic: &str, entry: &HistoryEntry) -> Result<(), SinkError> {
            self.0.borrow_mut().push((topic.to_string(), entry.clone()));
            Ok(())
        }
    }

    struct Broken;

    impl Publish for Broken {
        fn publish(&mut self, _: &str, _: &HistoryEntry) -> Result<(), SinkError> {
            Err(std::io::Error::other("broker unreachable").into())
        }
    }

    fn sleep_ack(value: u8) -> [u8; crate::RESPONSE_LEN] {
        reply_frame(
            CommandCode::SleepWork as u8,
            [0x01, value, 0x00],
            DeviceId::BROADCAST,
        )
    }

    fn temp_log(name: &str) -> ReadingLog {
        let path = std::env::temp_dir().join(format!(
            "sds011-station-{}-{}.json",
            std::process::id(),
            name
        ));
        let _ = fs::remove_file(&path);
        ReadingLog::new(path)
    }

    fn fast() -> StationConfig {
        StationConfig::default()
            .polls_per_cycle(3)
            .poll_interval(Duration::from_millis(1))
            .rest_interval(Duration::from_millis(1))
    }

    #[test]
    fn cycle_stores_and_publishes_latest_reading() {
        let mut serial = MockSerial::new();
        serial
            .push(&sleep_ack(0x01))
            .push(&measurement_frame(100, 200))
            .push(&reply_frame(0x06, [0x01, 0x01, 0x00], DeviceId::BROADCAST))
            .push(&measurement_frame(253, 87))
            .push(&sleep_ack(0x00));
        let log = temp_log("cycle");
        let recorder = Recorder::default();
        let mut station = Station::new(
            Sds011::new(serial, Config::default()),
            log.clone(),
            fast(),
        )
        .with_sink(recorder.clone());

        let reading = block_on(station.run_cycle()).unwrap().unwrap();
        assert_relative_eq!(reading.pm2_5, 25.3);
        assert_relative_eq!(reading.pm10, 8.7);

        let stored = log.load().unwrap();
        assert_eq!(stored.len(), 1);
        assert_relative_eq!(stored[0].pm25, 25.3);

        let published = recorder.0.borrow();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, DEFAULT_TOPIC);
        assert_eq!(published[0].1, stored[0]);

        assert_eq!(
            station.sensor().state().operational,
            Some(OperationalState::Sleeping)
        );
        fs::remove_file(log.path()).unwrap();
    }

    #[test]
    fn corrupt_frames_are_skipped() {
        let mut corrupt = measurement_frame(500, 600);
        corrupt[8] ^= 0xFF;
        let mut serial = MockSerial::new();
        serial
            .push(&sleep_ack(0x01))
            .push(&measurement_frame(50, 60))
            .push(&corrupt)
            .push(&corrupt)
            .push(&sleep_ack(0x00));
        let log = temp_log("corrupt");
        let mut station = Station::new(
            Sds011::new(serial, Config::default()),
            log.clone(),
            fast(),
        );

        let reading = block_on(station.run_cycle()).unwrap().unwrap();
        assert_relative_eq!(reading.pm2_5, 5.0);
        assert_relative_eq!(reading.pm10, 6.0);
        fs::remove_file(log.path()).unwrap();
    }

    #[test]
    fn cycle_without_readings_stores_nothing() {
        let mut serial = MockSerial::new();
        serial.push(&sleep_ack(0x01));
        for _ in 0..3 {
            serial.push(&sleep_ack(0x01));
        }
        serial.push(&sleep_ack(0x00));
        let log = temp_log("empty");
        let mut station = Station::new(
            Sds011::new(serial, Config::default()),
            log.clone(),
            fast(),
        );

        assert!(block_on(station.run_cycle()).unwrap().is_none());
        assert!(log.load().unwrap().is_empty());
    }

    #[test]
    fn publish_failure_does_not_end_cycle() {
        let mut serial = MockSerial::new();
        serial
            .push(&sleep_ack(0x01))
            .push(&measurement_frame(10, 20))
            .push(&sleep_ack(0x00));
        let log = temp_log("broken");
        let mut station = Station::new(
            Sds011::new(serial, Config::default()),
            log.clone(),
            fast().polls_per_cycle(1),
        )
        .with_sink(Broken);

        assert!(block_on(station.run_cycle()).unwrap().is_some());
        assert_eq!(log.load().unwrap().len(), 1);
        fs::remove_file(log.path()).unwrap();
    }

    #[test]
    fn default_wiring_matches_sensor_line() {
        assert_eq!(crate::BAUD_RATE, 9600);
        assert_eq!(crate::DEFAULT_DEVICE_PATH, "/dev/ttyUSB0");
        let config = StationConfig::default();
        assert_eq!(config.polls_per_cycle, 15);
        assert_eq!(config.topic, DEFAULT_TOPIC);
    }

    #[test]
    fn transport_failure_ends_cycle() {
        let mut serial = MockSerial::new();
        serial.push(&sleep_ack(0x01)).push(&measurement_frame(10, 20));
        let mut station = Station::new(
            Sds011::new(serial, Config::default()),
            temp_log("eof"),
            fast(),
        );

        assert!(matches!(
            block_on(station.run_cycle()),
            Err(StationError::Sensor(Error::ReadFailure))
        ));
    }
}
