use crate::models::{round_to, HourClass, HourlyReading, DEFAULT_HUMIDITY_PCT};

/// Wet-bulb proxy above which precipitation is treated as liquid.
const RAIN_WET_BULB_C: f64 = 1.0;

const MIN_SLR: f64 = 5.0;
const MAX_SLR: f64 = 30.0;

/// Wind speed up to which no compaction is applied.
const CALM_WIND_MS: f64 = 2.5;
const WIND_COMPACTION_RATE: f64 = 0.08;

/// Classify one hour from sanitized inputs.
///
/// `humidity_pct` is expected to already be clamped to 0..=100.
pub fn classify(temperature_c: f64, precipitation_mm: f64, wind_ms: f64, humidity_pct: f64) -> HourClass {
    if precipitation_mm <= 0.0 {
        return HourClass::Dry;
    }

    let wet_bulb = wet_bulb_proxy(temperature_c, humidity_pct);
    if wet_bulb > RAIN_WET_BULB_C {
        return HourClass::Rain;
    }

    let slr = snow_to_liquid_ratio(wet_bulb);
    let amount_cm = round_to(precipitation_mm * slr * wind_factor(wind_ms) / 10.0, 2);

    if amount_cm > 0.0 {
        HourClass::Snow { amount_cm, slr }
    } else {
        HourClass::Dry
    }
}

/// Classify a reading, or `None` if temperature or precipitation is missing.
pub fn classify_reading(reading: &HourlyReading) -> Option<HourClass> {
    let temperature = reading.temperature_c?;
    let precipitation = reading.precipitation_mm?;
    let wind = reading.wind_ms.unwrap_or(0.0).max(0.0);
    let humidity = reading
        .humidity_pct
        .unwrap_or(DEFAULT_HUMIDITY_PCT)
        .clamp(0.0, 100.0);

    Some(classify(temperature, precipitation, wind, humidity))
}

/// Dry air cools falling precipitation by evaporation, so snow can reach the
/// ground above freezing when humidity is low.
pub fn wet_bulb_proxy(temperature_c: f64, humidity_pct: f64) -> f64 {
    temperature_c - (100.0 - humidity_pct) / 10.0
}

pub fn snow_to_liquid_ratio(wet_bulb: f64) -> f64 {
    let slr = if wet_bulb >= -2.0 {
        8.0 - wet_bulb
    } else {
        10.0 + 1.15 * (-2.0 - wet_bulb)
    };
    slr.clamp(MIN_SLR, MAX_SLR)
}

/// Depth multiplier for wind-driven crystal breakup, in (0, 1].
pub fn wind_factor(wind_ms: f64) -> f64 {
    if wind_ms <= CALM_WIND_MS {
        1.0
    } else {
        (-WIND_COMPACTION_RATE * (wind_ms - CALM_WIND_MS)).exp()
    }
}
