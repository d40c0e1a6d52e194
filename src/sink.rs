//! Best-effort publishing of readings.

use std::io::Write;

use log::debug;
use serde::Serialize;
use thiserror::Error;

use crate::history::HistoryEntry;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Somewhere readings are published to.
///
/// Delivery is not acknowledged; a returned error only means the message
/// could not be handed over.
pub trait Publish {
    fn publish(&mut self, topic: &str, entry: &HistoryEntry) -> Result<(), SinkError>;
}

#[derive(Serialize)]
struct Message<'a> {
    topic: &'a str,
    payload: &'a HistoryEntry,
}

/// Publishes one JSON object per line to a writer, for example a pipe into
/// a broker bridge.
///
/// ```text
/// {"topic":"/weather/particulatematter","payload":{"pm25":25.3,"pm10":8.7,"time":"..."}}
/// ```
pub struct WriterSink<W> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Publish for WriterSink<W> {
    fn publish(&mut self, topic: &str, entry: &HistoryEntry) -> Result<(), SinkError> {
        serde_json::to_writer(
            &mut self.writer,
            &Message {
                topic,
                payload: entry,
            },
        )?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        debug!("Published reading on {}", topic);
        Ok(())
    }
}
