//! The subset of the FIT global profile this crate understands
//!
//! Only the global messages seen in activity files recorded by handheld GPS
//! units are known here.  A definition naming any other global message is
//! rejected, since without a layout for it we can't say anything about its
//! data records.

use phf::phf_map;
use strum::{Display, EnumIter, FromRepr};

/// Global message numbers known to the decoder.
#[repr(u16)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, EnumIter, FromRepr)]
#[non_exhaustive]
pub enum GlobalMessage {
    #[strum(to_string = "file ID")]
    FileId = 0u16,
    #[strum(to_string = "session")]
    Session = 18u16,
    #[strum(to_string = "lap")]
    Lap = 19u16,
    #[strum(to_string = "record")]
    Record = 20u16,
    #[strum(to_string = "event")]
    Event = 21u16,
    #[strum(to_string = "device info")]
    DeviceInfo = 23u16,
    #[strum(to_string = "activity")]
    Activity = 34u16,
    #[strum(to_string = "file creator")]
    FileCreator = 49u16,
}

impl GlobalMessage {
    /// Look up a global message number in the registry.
    pub fn lookup(id: u16) -> Option<GlobalMessage> {
        GlobalMessage::from_repr(id)
    }

    pub fn id(self) -> u16 {
        self as u16
    }
}

/// Field numbers of the `record` message.
pub mod record_field {
    pub const POSITION_LAT: u8 = 0;
    pub const POSITION_LONG: u8 = 1;
    pub const ALTITUDE: u8 = 2;
    pub const HEART_RATE: u8 = 3;
    pub const CADENCE: u8 = 4;
    pub const DISTANCE: u8 = 5;
    pub const SPEED: u8 = 6;
    pub const TEMPERATURE: u8 = 13;
    pub const ENHANCED_SPEED: u8 = 73;
    pub const ENHANCED_ALTITUDE: u8 = 78;
    pub const TIMESTAMP: u8 = 253;
}

/// Names of `record` message fields, for diagnostics.
static RECORD_FIELD_NAMES: phf::Map<u8, &'static str> = phf_map! {
    0u8 => "position_lat",
    1u8 => "position_long",
    2u8 => "altitude",
    3u8 => "heart_rate",
    4u8 => "cadence",
    5u8 => "distance",
    6u8 => "speed",
    13u8 => "temperature",
    14u8 => "time_from_course",
    15u8 => "cycle_length",
    53u8 => "fractional_cadence",
    73u8 => "enhanced_speed",
    78u8 => "enhanced_altitude",
    253u8 => "timestamp",
};

/// Name of a field, if known, for diagnostic output.
pub fn field_name(message: GlobalMessage, field_id: u8) -> Option<&'static str> {
    match message {
        GlobalMessage::Record => RECORD_FIELD_NAMES.get(&field_id).copied(),
        _ if field_id == record_field::TIMESTAMP => Some("timestamp"),
        _ => None,
    }
}

/// FIT base type names, by base type code.
pub fn base_type_name(base_type: u8) -> &'static str {
    match base_type {
        0x00 => "enum",
        0x01 => "sint8",
        0x02 => "uint8",
        0x07 => "string",
        0x0A => "uint8z",
        0x0D => "byte",
        0x83 => "sint16",
        0x84 => "uint16",
        0x85 => "sint32",
        0x86 => "uint32",
        0x88 => "float32",
        0x89 => "float64",
        0x8B => "uint16z",
        0x8C => "uint32z",
        0x8E => "sint64",
        0x8F => "uint64",
        0x90 => "uint64z",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::{GlobalMessage, base_type_name, field_name, record_field};

    #[test]
    fn test_lookup_known_messages() {
        assert_eq!(GlobalMessage::lookup(0), Some(GlobalMessage::FileId));
        assert_eq!(GlobalMessage::lookup(20), Some(GlobalMessage::Record));
        assert_eq!(GlobalMessage::lookup(49), Some(GlobalMessage::FileCreator));
        assert_eq!(GlobalMessage::iter().count(), 8);
    }

    #[test]
    fn test_lookup_unknown_messages() {
        // course and course_point are valid FIT but outside the registry.
        assert_eq!(GlobalMessage::lookup(31), None);
        assert_eq!(GlobalMessage::lookup(32), None);
        assert_eq!(GlobalMessage::lookup(0xFFFF), None);
    }

    #[test]
    fn test_message_names() {
        assert_eq!(GlobalMessage::FileId.to_string(), "file ID");
        assert_eq!(GlobalMessage::DeviceInfo.to_string(), "device info");
        assert_eq!(GlobalMessage::Record.to_string(), "record");
    }

    #[test]
    fn test_field_names() {
        assert_eq!(
            field_name(GlobalMessage::Record, record_field::ENHANCED_ALTITUDE),
            Some("enhanced_altitude")
        );
        assert_eq!(field_name(GlobalMessage::Event, 253), Some("timestamp"));
        assert_eq!(field_name(GlobalMessage::Event, 3), None);
        assert_eq!(base_type_name(0x85), "sint32");
    }
}
