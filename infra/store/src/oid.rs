use crate::error::StoreError;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};

/// Store-native document identifier.
///
/// Twelve bytes: a 4-byte big-endian creation second, 5 process-unique random
/// bytes and a 3-byte counter. Rendered as 24 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

struct ProcessSeed {
    unique: [u8; 5],
    counter: AtomicU32,
}

fn process_seed() -> &'static ProcessSeed {
    static SEED: OnceLock<ProcessSeed> = OnceLock::new();
    SEED.get_or_init(|| {
        let mut bytes = [0u8; 9];
        if getrandom::fill(&mut bytes).is_err() {
            // Entropy source missing: derive from the clock instead.
            let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default().to_le_bytes();
            bytes[..8].copy_from_slice(&nanos);
        }
        let mut unique = [0u8; 5];
        unique.copy_from_slice(&bytes[..5]);
        let counter = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]) & 0x00FF_FFFF;
        ProcessSeed { unique, counter: AtomicU32::new(counter) }
    })
}

impl ObjectId {
    /// Generates a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        let seed = process_seed();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let secs = Utc::now().timestamp() as u32;
        let count = seed.counter.fetch_add(1, Ordering::Relaxed) & 0x00FF_FFFF;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&seed.unique);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Parses a 24 character hex string.
    pub fn parse_str(input: &str) -> Result<Self, StoreError> {
        let invalid = || StoreError::InvalidIdentifier {
            message: format!("'{input}' is not a 24 character hex string").into(),
            context: None,
        };
        if input.len() != 24 {
            return Err(invalid());
        }
        let mut bytes = [0u8; 12];
        hex::decode_to_slice(input, &mut bytes).map_err(|_| invalid())?;
        Ok(Self(bytes))
    }

    /// Whether `input` is a well-formed identifier string.
    #[must_use]
    pub fn is_valid(input: &str) -> bool {
        input.len() == 24 && input.bytes().all(|b| b.is_ascii_hexdigit())
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Creation time embedded in the identifier (second precision).
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        let secs = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        Utc.timestamp_opt(i64::from(secs), 0).single().unwrap_or(DateTime::UNIX_EPOCH)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse_str(&raw).map_err(serde::de::Error::custom)
    }
}

/// Store-native timestamp: milliseconds since the Unix epoch, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    #[must_use]
    pub const fn millis(&self) -> i64 {
        self.0
    }

    /// Converts into a domain datetime.
    #[must_use]
    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or(DateTime::UNIX_EPOCH)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Timestamp {
    fn from(value: DateTime<Tz>) -> Self {
        Self(value.timestamp_millis())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}
