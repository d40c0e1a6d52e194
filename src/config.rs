use embassy_time::Duration;

/// Represents the reporting mode of the SDS011 sensor.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum DeviceMode {
    /// In Active mode, the sensor automatically reports data.
    Active,
    /// In Query mode, the sensor only reports data when asked for it.
    Query,
}

impl DeviceMode {
    /// Byte used for this mode in reporting mode commands and replies.
    pub fn as_byte(self) -> u8 {
        match self {
            DeviceMode::Active => 0x00,
            DeviceMode::Query => 0x01,
        }
    }

    pub fn from_byte(byte: u8) -> DeviceMode {
        if byte == 0x00 {
            DeviceMode::Active
        } else {
            DeviceMode::Query
        }
    }
}

/// Represents the unique identifier of the SDS011 sensor.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct DeviceId {
    /// The low byte of the device ID.
    pub id1: u8,
    /// The high byte of the device ID.
    pub id2: u8,
}

impl DeviceId {
    /// Address every sensor on the line answers to.
    pub const BROADCAST: DeviceId = DeviceId {
        id1: 0xff,
        id2: 0xff,
    };

    pub fn from_u16(id: u16) -> DeviceId {
        let [id1, id2] = id.to_le_bytes();
        DeviceId { id1, id2 }
    }

    pub fn as_u16(self) -> u16 {
        u16::from_le_bytes([self.id1, self.id2])
    }
}

impl Default for DeviceId {
    /// Returns the broadcast device id.
    fn default() -> DeviceId {
        DeviceId::BROADCAST
    }
}

/// How replies to set commands are treated.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Default)]
pub enum Confirmation {
    /// The reply is awaited and discarded. A malformed reply is only logged.
    #[default]
    Lenient,
    /// The reply must be a valid frame echoing the command, otherwise the
    /// command fails with [`Error::CommandFailed`](crate::Error::CommandFailed).
    Strict,
}

/// Configuration settings for the SDS011 sensor.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Config {
    /// The device ID commands are addressed to.
    pub id: DeviceId,
    /// The reporting mode applied by [`Sds011::init`](crate::Sds011::init).
    pub mode: DeviceMode,
    /// How long to wait for the start of a response before giving up.
    pub response_timeout: Duration,
    /// Whether set commands check the sensor's reply.
    pub confirmation: Confirmation,
}

impl Config {
    /// Creates a new `Config` instance.
    ///
    /// # Arguments
    ///
    /// * `id` - The `DeviceId` for the sensor.
    /// * `mode` - The `DeviceMode` for the sensor.
    ///
    /// # Returns
    ///
    /// A new `Config` instance with the specified ID and mode and default
    /// timeout and confirmation policy.
    pub fn new(id: DeviceId, mode: DeviceMode) -> Config {
        Config {
            id,
            mode,
            ..Config::default()
        }
    }
    /// Sets the device ID for the configuration.
    pub fn id(mut self, id: DeviceId) -> Self {
        self.id = id;
        self
    }
    /// Sets the device mode for the configuration.
    pub fn mode(mut self, mode: DeviceMode) -> Self {
        self.mode = mode;
        self
    }
    /// Sets how long a response may take to start arriving.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
    /// Sets the confirmation policy for set commands.
    pub fn confirmation(mut self, confirmation: Confirmation) -> Self {
        self.confirmation = confirmation;
        self
    }
}

/// Provides default configuration values for the SDS011 sensor.
impl Default for Config {
    /// Returns the default configuration.
    ///
    /// The default configuration uses the broadcast device ID, `Query` mode,
    /// a two second response timeout and lenient confirmation.
    fn default() -> Config {
        Config {
            id: DeviceId::default(),
            mode: DeviceMode::Query,
            response_timeout: Duration::from_secs(2),
            confirmation: Confirmation::Lenient,
        }
    }
}
