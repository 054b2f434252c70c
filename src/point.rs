//! Points decoded from `record` messages

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};

use crate::field::{FieldValue, RawField, find_field};
use crate::measure::{
    Celsius, Degrees, Fahrenheit, Feet, Meters, MetersPerSecond, Miles, MilesPerHour, Semicircles,
};
use crate::profile::record_field;

/// Seconds from the Unix epoch to the Garmin epoch of 1989-12-31T00:00:00Z.
pub const GARMIN_EPOCH_OFFSET: i64 = 631_065_600;

// The minimum value of a date_time as per the FIT global profile.  Values lower
// than this are to be interpreted as relative offsets rather than absolute
// times since the Garmin epoch.
const GARMIN_DATE_TIME_MIN: u32 = 0x10000000;

/// A date_time value as represented in a FIT file.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct FitDateTime(pub u32);

impl FitDateTime {
    /// Seconds since the Garmin epoch, or a relative time in seconds if below
    /// 0x10000000.
    pub fn seconds(self) -> u32 {
        self.0
    }

    pub fn is_absolute(self) -> bool {
        self.0 >= GARMIN_DATE_TIME_MIN
    }

    /// Seconds since the Unix epoch.
    pub fn unix_seconds(self) -> i64 {
        self.0 as i64 + GARMIN_EPOCH_OFFSET
    }

    /// The absolute time, or `None` for relative values.
    pub fn to_utc(self) -> Option<DateTime<Utc>> {
        if !self.is_absolute() {
            return None;
        }
        DateTime::from_timestamp(self.unix_seconds(), 0)
    }
}

impl Display for FitDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.to_utc() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%SZ")),
            None => write!(f, "+{}s", self.0),
        }
    }
}

/// A telemetry point decoded from one `record` message.
///
/// Quantities missing from the record's layout, or holding FIT's invalid
/// value, are `None`.
#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct DecodedPoint {
    pub timestamp: Option<FitDateTime>,
    pub latitude: Option<Degrees<f64>>,
    pub longitude: Option<Degrees<f64>>,
    pub altitude: Option<Feet<f64>>,
    pub speed: Option<MilesPerHour<f64>>,
    pub distance: Option<Miles<f64>>,
    pub temperature: Option<Fahrenheit<f64>>,
    /// Beats per minute.
    pub heart_rate: Option<u8>,
    /// Revolutions per minute.
    pub cadence: Option<u8>,
}

impl DecodedPoint {
    /// Convert the raw fields of a `record` message.
    ///
    /// Enhanced altitude and speed take precedence over their 16-bit
    /// counterparts.
    pub fn from_fields(fields: &[RawField]) -> Self {
        let get = |id| find_field(fields, id);
        Self {
            timestamp: get(record_field::TIMESTAMP)
                .and_then(FieldValue::unsigned)
                .map(FitDateTime),
            latitude: get(record_field::POSITION_LAT)
                .and_then(FieldValue::signed)
                .map(semicircles_to_degrees),
            longitude: get(record_field::POSITION_LONG)
                .and_then(FieldValue::signed)
                .map(semicircles_to_degrees),
            altitude: get(record_field::ENHANCED_ALTITUDE)
                .and_then(FieldValue::unsigned)
                .or_else(|| get(record_field::ALTITUDE).and_then(FieldValue::unsigned))
                .map(altitude_feet),
            speed: get(record_field::ENHANCED_SPEED)
                .and_then(FieldValue::unsigned)
                .or_else(|| get(record_field::SPEED).and_then(FieldValue::unsigned))
                .map(speed_mph),
            distance: get(record_field::DISTANCE)
                .and_then(FieldValue::unsigned)
                .map(distance_miles),
            temperature: get(record_field::TEMPERATURE)
                .and_then(FieldValue::signed)
                .map(temperature_fahrenheit),
            heart_rate: get(record_field::HEART_RATE)
                .and_then(FieldValue::unsigned)
                .and_then(|v| u8::try_from(v).ok()),
            cadence: get(record_field::CADENCE)
                .and_then(FieldValue::unsigned)
                .and_then(|v| u8::try_from(v).ok()),
        }
    }
}

pub fn semicircles_to_degrees(raw: i32) -> Degrees<f64> {
    Semicircles(raw).into()
}

/// Altitude is stored in units of 1/5 m with a 500 m offset.
pub fn altitude_feet(raw: u32) -> Feet<f64> {
    Meters(raw as f64 / 5.0 - 500.0).into()
}

/// Speed is stored in mm/s.
pub fn speed_mph(raw: u32) -> MilesPerHour<f64> {
    MetersPerSecond(raw as f64 / 1000.0).into()
}

/// Distance is stored in cm.
pub fn distance_miles(raw: u32) -> Miles<f64> {
    Meters(raw as f64 / 100.0).into()
}

/// Temperature is stored in whole degrees Celsius.
pub fn temperature_fahrenheit(raw: i32) -> Fahrenheit<f64> {
    Celsius(raw as f64).into()
}
