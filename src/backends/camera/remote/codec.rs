// SPDX-License-Identifier: GPL-3.0-only

//! String codec for network camera settings
//!
//! The network control API reports settings as strings: ISO as `"auto"` or
//! `"400"`, aperture as `"f5.6"`, shutter speed as `"1/125"`, `"0\"3"`
//! (0.3 s), `"30\""` or `"bulb"`. Semantic values match the integer codec:
//! ISO 0 is automatic and a shutter speed of 0 is bulb.

use crate::backends::camera::codec::find_closest;
use crate::backends::camera::types::{Parameter, ParameterKind};
use crate::constants::remote::{SETTING_AV, SETTING_ISO, SETTING_TV};

pub fn decode_iso(text: &str) -> Option<u32> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("auto") {
        Some(0)
    } else {
        text.parse().ok()
    }
}

pub fn encode_iso(iso: u32) -> String {
    if iso == 0 {
        "auto".to_string()
    } else {
        iso.to_string()
    }
}

pub fn decode_aperture(text: &str) -> Option<f32> {
    let text = text.trim();
    let number = text
        .strip_prefix('f')
        .or_else(|| text.strip_prefix('F'))
        .unwrap_or(text);
    number.trim_start_matches('/').parse().ok()
}

pub fn encode_aperture(aperture: f32) -> String {
    format!("f{}", aperture)
}

pub fn decode_shutter_speed(text: &str) -> Option<f32> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("bulb") {
        return Some(0.0);
    }

    if let Some(denominator) = text.strip_prefix("1/") {
        let denominator: f32 = denominator.parse().ok()?;
        return (denominator > 0.0).then(|| 1.0 / denominator);
    }

    // Whole and tenth seconds around the quote mark: 0"3, 1"5, 30"
    let (whole, tenths) = text.split_once('"')?;
    let whole: f32 = whole.parse().ok()?;
    let tenths: f32 = if tenths.is_empty() {
        0.0
    } else {
        tenths.parse().ok()?
    };
    Some(whole + tenths / 10.0)
}

pub fn encode_shutter_speed(seconds: f32) -> String {
    if seconds <= 0.0 {
        return "bulb".to_string();
    }
    if seconds < 0.3 {
        return format!("1/{}", (1.0 / seconds).round() as u32);
    }

    let tenths = (seconds * 10.0).round() as u32;
    if tenths % 10 == 0 {
        format!("{}\"", tenths / 10)
    } else {
        format!("{}\"{}", tenths / 10, tenths % 10)
    }
}

pub fn decode(kind: ParameterKind, text: &str) -> Option<Parameter> {
    match kind {
        ParameterKind::Iso => decode_iso(text).map(Parameter::Iso),
        ParameterKind::Aperture => decode_aperture(text).map(Parameter::Aperture),
        ParameterKind::ShutterSpeed => decode_shutter_speed(text).map(Parameter::ShutterSpeed),
    }
}

pub fn encode(value: Parameter) -> String {
    match value {
        Parameter::Iso(iso) => encode_iso(iso),
        Parameter::Aperture(aperture) => encode_aperture(aperture),
        Parameter::ShutterSpeed(seconds) => encode_shutter_speed(seconds),
    }
}

/// Settings endpoint for a parameter
pub fn endpoint_for(kind: ParameterKind) -> &'static str {
    match kind {
        ParameterKind::Iso => SETTING_ISO,
        ParameterKind::Aperture => SETTING_AV,
        ParameterKind::ShutterSpeed => SETTING_TV,
    }
}

/// Key of a parameter in the event polling response
pub fn event_key(kind: ParameterKind) -> &'static str {
    match kind {
        ParameterKind::Iso => "iso",
        ParameterKind::Aperture => "av",
        ParameterKind::ShutterSpeed => "tv",
    }
}

fn magnitude(value: Parameter) -> f64 {
    match value {
        Parameter::Iso(iso) => iso.into(),
        Parameter::Aperture(aperture) => aperture.into(),
        Parameter::ShutterSpeed(seconds) => seconds.into(),
    }
}

/// Option string whose value is closest to `value`
///
/// Options that do not decode as the same kind are skipped. Ties go to the
/// option listed first.
pub fn snap_to_option(value: Parameter, options: &[String]) -> Option<String> {
    let decoded: Vec<(&String, f64)> = options
        .iter()
        .filter_map(|option| {
            decode(value.kind(), option).map(|parameter| (option, magnitude(parameter)))
        })
        .collect();

    let magnitudes: Vec<f64> = decoded.iter().map(|(_, magnitude)| *magnitude).collect();
    let closest = find_closest(magnitude(value), &magnitudes)?;
    decoded
        .into_iter()
        .find(|(_, magnitude)| *magnitude == closest)
        .map(|(option, _)| option.clone())
}

/// Decode an option list, dropping entries that do not parse
pub fn decode_options(kind: ParameterKind, options: &[String]) -> Vec<Parameter> {
    options
        .iter()
        .filter_map(|option| decode(kind, option))
        .collect()
}
