use time::OffsetDateTime;

/// Fixed-point scale for latitude/longitude: degrees × 1 800 000
/// (minutes × 30 000).
pub const COORDINATE_SCALE: f64 = 1_800_000.0;

/// Date and time of a position fix, one byte per field as sent on the wire.
///
/// Fields are not range-checked by the codec; callers building one by hand
/// are responsible for keeping month 1–12, day 1–31 and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixTime {
    /// Years since 2000.
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl FixTime {
    /// Current UTC time.
    pub fn now_utc() -> Self {
        Self::from(OffsetDateTime::now_utc())
    }

    pub fn to_bytes(self) -> [u8; 6] {
        [
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
        ]
    }

    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        let [year, month, day, hour, minute, second] = bytes;
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }
}

impl From<OffsetDateTime> for FixTime {
    /// Converts to UTC first. Years outside 2000–2255 wrap.
    fn from(dt: OffsetDateTime) -> Self {
        let dt = dt.to_offset(time::UtcOffset::UTC);
        Self {
            year: (dt.year() - 2000) as u8,
            month: u8::from(dt.month()),
            day: dt.day(),
            hour: dt.hour(),
            minute: dt.minute(),
            second: dt.second(),
        }
    }
}

/// One position report handed in by the location source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub time: FixTime,
    /// Signed degrees, north positive.
    pub latitude: f64,
    /// Signed degrees, east positive.
    pub longitude: f64,
    /// Speed as reported by the source; sent as a single byte.
    pub speed: f32,
    /// Horizontal accuracy in metres. Not carried by the location frame.
    pub accuracy: f32,
    /// Altitude in metres. Not carried by the location frame.
    pub altitude: f32,
}

impl TelemetrySample {
    /// A sample at `latitude`/`longitude` stamped with the current UTC time.
    pub fn now(latitude: f64, longitude: f64) -> Self {
        Self {
            time: FixTime::now_utc(),
            latitude,
            longitude,
            speed: 0.0,
            accuracy: 0.0,
            altitude: 0.0,
        }
    }

    pub fn with_time(mut self, time: FixTime) -> Self {
        self.time = time;
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_accuracy(mut self, accuracy: f32) -> Self {
        self.accuracy = accuracy;
        self
    }

    pub fn with_altitude(mut self, altitude: f32) -> Self {
        self.altitude = altitude;
        self
    }
}

/// A location frame as decoded from the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationReport {
    pub time: FixTime,
    /// Satellite count (high nibble) and GPS info length (low nibble).
    pub satellites: u8,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: u8,
    pub course_status: u16,
}
