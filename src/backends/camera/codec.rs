// SPDX-License-Identifier: GPL-3.0-only

//! Parameter codec
//!
//! Maps between the integer codes a camera reports for ISO, aperture and
//! shutter speed and their semantic values (ISO number, f-number, seconds).
//!
//! Tables are ordered by code. A few aperture codes are aliases of the same
//! f-number (third and half stop variants); encoding always yields the first
//! code in table order, so `decode(encode(v)) == v` holds for every value and
//! `encode(decode(c)) == c` holds for every canonical (first) code.

use super::sdk::PropertyId;
use super::types::{Parameter, ParameterKind};

/// Returned by the encoders for values with no hardware code
pub const INVALID_ENCODING: u32 = 0xFFFF_FFFF;

/// ISO codes (0 is automatic ISO)
const ISO_TABLE: &[(u32, u32)] = &[
    (0x00, 0),
    (0x40, 50),
    (0x48, 100),
    (0x4b, 125),
    (0x4d, 160),
    (0x50, 200),
    (0x53, 250),
    (0x55, 320),
    (0x58, 400),
    (0x5b, 500),
    (0x5d, 640),
    (0x60, 800),
    (0x63, 1000),
    (0x65, 1250),
    (0x68, 1600),
    (0x6b, 2000),
    (0x6d, 2500),
    (0x70, 3200),
    (0x73, 4000),
    (0x75, 5000),
    (0x78, 6400),
    (0x7b, 8000),
    (0x7d, 10000),
    (0x80, 12800),
    (0x88, 25600),
    (0x90, 51200),
    (0x98, 102400),
    (0xa0, 204800),
    (0xa8, 409600),
];

/// Aperture codes as f-numbers
const APERTURE_TABLE: &[(u32, f32)] = &[
    (0x08, 1.0),
    (0x0B, 1.1),
    (0x0C, 1.2),
    (0x0D, 1.2),
    (0x10, 1.4),
    (0x13, 1.6),
    (0x14, 1.8),
    (0x15, 1.8),
    (0x18, 2.0),
    (0x1B, 2.2),
    (0x1C, 2.5),
    (0x1D, 2.5),
    (0x20, 2.8),
    (0x23, 3.2),
    (0x24, 3.5),
    (0x25, 3.5),
    (0x28, 4.0),
    (0x2B, 4.5),
    (0x2C, 4.5),
    (0x2D, 5.0),
    (0x30, 5.6),
    (0x33, 6.3),
    (0x34, 6.7),
    (0x35, 7.1),
    (0x38, 8.0),
    (0x3B, 9.0),
    (0x3C, 9.5),
    (0x3D, 10.0),
    (0x40, 11.0),
    (0x43, 13.0),
    (0x44, 13.0),
    (0x45, 14.0),
    (0x48, 16.0),
    (0x4B, 18.0),
    (0x4C, 19.0),
    (0x4D, 20.0),
    (0x50, 22.0),
    (0x53, 25.0),
    (0x54, 27.0),
    (0x55, 29.0),
    (0x58, 32.0),
    (0x5B, 36.0),
    (0x5C, 38.0),
    (0x5D, 40.0),
    (0x60, 45.0),
    (0x63, 51.0),
    (0x64, 54.0),
    (0x65, 57.0),
    (0x68, 64.0),
    (0x6B, 72.0),
    (0x6C, 76.0),
    (0x6D, 80.0),
    (0x70, 91.0),
    // Reported while no lens is attached
    (0xFFFF_FFFF, 0.0),
];

/// Shutter speed codes in seconds (0x0C is bulb)
const SHUTTER_SPEED_TABLE: &[(u32, f32)] = &[
    (0x0C, 0.0),
    (0x10, 30.0),
    (0x13, 25.0),
    (0x14, 20.0),
    (0x15, 20.3),
    (0x18, 15.0),
    (0x1B, 13.0),
    (0x1C, 10.0),
    (0x1D, 10.3),
    (0x20, 8.0),
    (0x23, 6.3),
    (0x24, 6.0),
    (0x25, 5.0),
    (0x28, 4.0),
    (0x2B, 3.2),
    (0x2C, 3.0),
    (0x2D, 2.5),
    (0x30, 2.0),
    (0x33, 1.6),
    (0x34, 1.5),
    (0x35, 1.3),
    (0x38, 1.0),
    (0x3B, 0.8),
    (0x3C, 0.7),
    (0x3D, 0.6),
    (0x40, 0.5),
    (0x43, 0.4),
    (0x44, 0.3),
    (0x45, 0.33),
    (0x48, 1.0 / 4.0),
    (0x4B, 1.0 / 5.0),
    (0x4D, 1.0 / 6.0),
    (0x53, 1.0 / 10.0),
    (0x55, 1.0 / 13.0),
    (0x5D, 1.0 / 25.0),
    (0x60, 1.0 / 30.0),
    (0x63, 1.0 / 40.0),
    (0x64, 1.0 / 45.0),
    (0x65, 1.0 / 50.0),
    (0x68, 1.0 / 60.0),
    (0x6B, 1.0 / 80.0),
    (0x6C, 1.0 / 90.0),
    (0x6D, 1.0 / 100.0),
    (0x70, 1.0 / 125.0),
    (0x73, 1.0 / 160.0),
    (0x74, 1.0 / 180.0),
    (0x75, 1.0 / 200.0),
    (0x78, 1.0 / 250.0),
    (0x7B, 1.0 / 320.0),
    (0x7C, 1.0 / 350.0),
    (0x7D, 1.0 / 400.0),
    (0x80, 1.0 / 500.0),
    (0x83, 1.0 / 640.0),
    (0x84, 1.0 / 750.0),
    (0x85, 1.0 / 800.0),
    (0x88, 1.0 / 1000.0),
    (0x8B, 1.0 / 1250.0),
    (0x8C, 1.0 / 1500.0),
    (0x8D, 1.0 / 1600.0),
    (0x90, 1.0 / 2000.0),
    (0x93, 1.0 / 2500.0),
    (0x94, 1.0 / 3000.0),
    (0x95, 1.0 / 3200.0),
    (0x98, 1.0 / 4000.0),
    (0x9B, 1.0 / 5000.0),
];

fn decode_with<T: Copy + Default>(table: &[(u32, T)], code: u32) -> T {
    table
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, value)| *value)
        .unwrap_or_default()
}

fn encode_with<T: Copy + PartialEq>(table: &[(u32, T)], value: T) -> u32 {
    table
        .iter()
        .find(|(_, v)| *v == value)
        .map(|(code, _)| *code)
        .unwrap_or(INVALID_ENCODING)
}

/// ISO value for a code; unknown codes decode to 0
pub fn decode_iso(code: u32) -> u32 {
    decode_with(ISO_TABLE, code)
}

/// Code for an ISO value, or [`INVALID_ENCODING`]
pub fn encode_iso(iso: u32) -> u32 {
    encode_with(ISO_TABLE, iso)
}

/// f-number for a code; unknown codes decode to 0.0
pub fn decode_aperture(code: u32) -> f32 {
    decode_with(APERTURE_TABLE, code)
}

/// Code for an f-number, or [`INVALID_ENCODING`]
pub fn encode_aperture(aperture: f32) -> u32 {
    encode_with(APERTURE_TABLE, aperture)
}

/// Exposure time in seconds for a code; unknown codes decode to 0.0
pub fn decode_shutter_speed(code: u32) -> f32 {
    decode_with(SHUTTER_SPEED_TABLE, code)
}

/// Code for an exposure time in seconds, or [`INVALID_ENCODING`]
pub fn encode_shutter_speed(seconds: f32) -> u32 {
    encode_with(SHUTTER_SPEED_TABLE, seconds)
}

/// Decode a raw code of the given kind
pub fn decode(kind: ParameterKind, code: u32) -> Parameter {
    match kind {
        ParameterKind::Iso => Parameter::Iso(decode_iso(code)),
        ParameterKind::Aperture => Parameter::Aperture(decode_aperture(code)),
        ParameterKind::ShutterSpeed => Parameter::ShutterSpeed(decode_shutter_speed(code)),
    }
}

/// Encode a parameter to its raw code, or [`INVALID_ENCODING`]
pub fn encode(parameter: Parameter) -> u32 {
    match parameter {
        Parameter::Iso(iso) => encode_iso(iso),
        Parameter::Aperture(aperture) => encode_aperture(aperture),
        Parameter::ShutterSpeed(seconds) => encode_shutter_speed(seconds),
    }
}

/// Property that stores the given kind of parameter
pub fn property_for(kind: ParameterKind) -> PropertyId {
    match kind {
        ParameterKind::Iso => PropertyId::ISO_SPEED,
        ParameterKind::Aperture => PropertyId::AV,
        ParameterKind::ShutterSpeed => PropertyId::TV,
    }
}

/// Kind of parameter stored in a property, if any
pub fn kind_for(property: PropertyId) -> Option<ParameterKind> {
    match property {
        PropertyId::ISO_SPEED => Some(ParameterKind::Iso),
        PropertyId::AV => Some(ParameterKind::Aperture),
        PropertyId::TV => Some(ParameterKind::ShutterSpeed),
        _ => None,
    }
}

/// Option closest to `target` by absolute difference
///
/// Ties resolve to the option that comes first. Returns `None` for an empty
/// option set.
pub fn find_closest<T>(target: T, options: &[T]) -> Option<T>
where
    T: Copy + Into<f64>,
{
    let target: f64 = target.into();
    let mut best: Option<(T, f64)> = None;

    for &option in options {
        let distance = (option.into() - target).abs();
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((option, distance)),
        }
    }

    best.map(|(option, _)| option)
}

/// Snap a parameter to the closest of `options` (same kind only)
///
/// Options of a different kind are ignored; with no usable option the
/// parameter is returned unchanged.
pub fn snap_parameter(value: Parameter, options: &[Parameter]) -> Parameter {
    match value {
        Parameter::Iso(iso) => {
            let values: Vec<u32> = options.iter().filter_map(Parameter::as_iso).collect();
            Parameter::Iso(find_closest(iso, &values).unwrap_or(iso))
        }
        Parameter::Aperture(aperture) => {
            let values: Vec<f32> = options.iter().filter_map(Parameter::as_aperture).collect();
            Parameter::Aperture(find_closest(aperture, &values).unwrap_or(aperture))
        }
        Parameter::ShutterSpeed(seconds) => {
            let values: Vec<f32> = options
                .iter()
                .filter_map(Parameter::as_shutter_speed)
                .collect();
            Parameter::ShutterSpeed(find_closest(seconds, &values).unwrap_or(seconds))
        }
    }
}

/// Human readable label for a shutter speed ("1/125", "0.3\"", "30\"", "Bulb")
pub fn format_shutter_speed(seconds: f32) -> String {
    if seconds <= 0.0 {
        "Bulb".to_string()
    } else if seconds < 0.3 {
        format!("1/{}", (1.0 / seconds).round() as u32)
    } else if seconds.fract().abs() < 1e-3 {
        format!("{}\"", seconds as u32)
    } else {
        format!("{}\"", seconds)
    }
}

/// Human readable label for a parameter value
pub fn format_parameter(parameter: Parameter) -> String {
    match parameter {
        Parameter::Iso(0) => "Auto".to_string(),
        Parameter::Iso(iso) => iso.to_string(),
        Parameter::Aperture(aperture) => format!("f/{}", aperture),
        Parameter::ShutterSpeed(seconds) => format_shutter_speed(seconds),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Debug;

    /// Walk a table both ways; returns how many alias codes were skipped
    fn check_round_trips<T: Copy + PartialEq + Debug>(
        table: &[(u32, T)],
        decode: fn(u32) -> T,
        encode: fn(T) -> u32,
    ) -> usize {
        let mut aliases = 0;
        for &(code, value) in table {
            assert_eq!(decode(code), value, "decode({:#x})", code);
            assert_eq!(decode(encode(value)), value, "decode(encode({:?}))", value);

            let canonical = table.iter().find(|(_, v)| *v == value).map(|(c, _)| *c);
            if canonical == Some(code) {
                assert_eq!(encode(decode(code)), code, "encode(decode({:#x}))", code);
            } else {
                aliases += 1;
            }
        }
        aliases
    }

    #[test]
    fn test_iso_table_round_trips() {
        assert_eq!(check_round_trips(ISO_TABLE, decode_iso, encode_iso), 0);
    }

    #[test]
    fn test_aperture_table_round_trips() {
        // 1.2, 1.8, 2.5, 3.5, 4.5 and 13 each have a second code
        assert_eq!(
            check_round_trips(APERTURE_TABLE, decode_aperture, encode_aperture),
            6
        );
    }

    #[test]
    fn test_shutter_speed_table_round_trips() {
        assert_eq!(
            check_round_trips(SHUTTER_SPEED_TABLE, decode_shutter_speed, encode_shutter_speed),
            0
        );
    }

    #[test]
    fn test_unknown_codes_decode_to_zero() {
        assert_eq!(decode_iso(0x01), 0);
        assert_eq!(decode_aperture(0x01), 0.0);
        assert_eq!(decode_shutter_speed(0xFFFF), 0.0);
    }

    #[test]
    fn test_unknown_values_encode_invalid() {
        assert_eq!(encode_iso(123), INVALID_ENCODING);
        assert_eq!(encode_aperture(5.55), INVALID_ENCODING);
        assert_eq!(encode_shutter_speed(1.0 / 7.0), INVALID_ENCODING);
    }

    #[test]
    fn test_aliases_encode_to_first_code() {
        assert_eq!(decode_aperture(0x0D), 1.2);
        assert_eq!(encode_aperture(1.2), 0x0C);
        assert_eq!(encode_aperture(4.5), 0x2B);
    }

    #[test]
    fn test_known_codes() {
        assert_eq!(decode_iso(0x58), 400);
        assert_eq!(encode_iso(400), 0x58);
        assert_eq!(decode_aperture(0x30), 5.6);
        assert_eq!(encode_shutter_speed(1.0 / 125.0), 0x70);
        assert_eq!(decode_shutter_speed(0x0C), 0.0);
    }

    #[test]
    fn test_find_closest() {
        assert_eq!(find_closest(150u32, &[100, 200, 400]), Some(100));
        assert_eq!(find_closest(1000u32, &[100, 200, 400]), Some(400));
        assert_eq!(find_closest(5.0f32, &[4.0, 5.6, 8.0]), Some(5.6));
        assert_eq!(find_closest::<u32>(100, &[]), None);
    }

    #[test]
    fn test_snap_parameter_ignores_other_kinds() {
        let options = [Parameter::Iso(100), Parameter::Aperture(2.8), Parameter::Iso(800)];
        assert_eq!(snap_parameter(Parameter::Iso(640), &options), Parameter::Iso(800));
        assert_eq!(
            snap_parameter(Parameter::ShutterSpeed(0.5), &options),
            Parameter::ShutterSpeed(0.5)
        );
    }

    #[test]
    fn test_format_shutter_speed() {
        assert_eq!(format_shutter_speed(1.0 / 125.0), "1/125");
        assert_eq!(format_shutter_speed(30.0), "30\"");
        assert_eq!(format_shutter_speed(0.5), "0.5\"");
        assert_eq!(format_shutter_speed(0.0), "Bulb");
    }
}
