// HEAD is the byte that marks the beginning of any frame (command or response).
// On the receive side it is the sentinel the reader synchronises on.
pub const HEAD: u8 = 0xAA;

// TAIL is the byte that marks the end of any frame (command or response).
pub const TAIL: u8 = 0xAB;

// COMMAND_ID is the byte that identifies a command frame sent to the sensor.
pub const COMMAND_ID: u8 = 0xB4;

// DATA_REPORT_ID is the byte that identifies a measurement frame received from the sensor.
pub const DATA_REPORT_ID: u8 = 0xC0;

// REPLY_ID is the byte that identifies a reply frame received from the sensor
// in response to a command.
pub const REPLY_ID: u8 = 0xC5;

/// Length of a command frame written to the sensor.
pub const COMMAND_LEN: usize = 19;

/// Length of a response frame, sentinel included.
pub const RESPONSE_LEN: usize = 10;

/// Maximum number of data bytes carried by a command frame.
pub const MAX_DATA_LEN: usize = 12;

/// Serial line speed the sensor talks at.
pub const BAUD_RATE: u32 = 9600;

/// Longest working period the sensor accepts, in minutes.
pub const MAX_WORKING_PERIOD: u8 = 30;

/// Working period value for continuous measurement.
pub const PERIOD_CONTINUOUS: u8 = 0;

/// Serial device the station opens when none is configured.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/ttyUSB0";

/// File the station keeps its reading history in.
pub const DEFAULT_HISTORY_PATH: &str = "/var/www/html/aqi.json";

/// Number of entries kept in the reading history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Topic readings are published on.
pub const DEFAULT_TOPIC: &str = "/weather/particulatematter";
