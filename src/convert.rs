//! Raw telemetry row to physical units.
//!
//! Unit scaling of current and the encoding of the accumulated charge
//! register both depend on the hardware generation named in the header.

use crate::constants::{
    ACR_TO_MAH, CENTI_DEGREES_PER_DEGREE, MICRO_AMP_HOURS_PER_MAH, MICROVOLTS_PER_VOLT,
    RAW_FIELD_COUNT,
};
use crate::error::{PwrLogError, Result};
use crate::models::{ConvertedSample, HardwareProfile, RawSample};
use csv::StringRecord;

impl<'a> RawSample<'a> {
    /// Name the positional fields of a CSV row; extra trailing fields are ignored
    pub fn from_record(record: &'a StringRecord) -> Result<Self> {
        if record.len() < RAW_FIELD_COUNT {
            return Err(PwrLogError::conversion(
                "row",
                format!(
                    "expected {} fields, found {}",
                    RAW_FIELD_COUNT,
                    record.len()
                ),
            ));
        }

        Ok(Self {
            seconds: &record[0],
            state_of_charge: &record[1],
            voltage: &record[2],
            current: &record[3],
            temperature: &record[4],
            accumulated_charge: &record[5],
        })
    }
}

/// Converts raw rows for one file's hardware profile
#[derive(Debug, Clone, Copy)]
pub struct SampleConverter {
    hardware: HardwareProfile,
}

impl SampleConverter {
    pub fn new(hardware: HardwareProfile) -> Self {
        Self { hardware }
    }

    pub fn convert(&self, raw: &RawSample<'_>) -> Result<ConvertedSample> {
        Ok(ConvertedSample {
            seconds: parse_number("seconds", raw.seconds)?,
            state_of_charge: parse_number("state_of_charge", raw.state_of_charge)?,
            volts: parse_number("voltage", raw.voltage)? / MICROVOLTS_PER_VOLT,
            milliamps: parse_number("current", raw.current)? / self.hardware.current_divisor(),
            temperature_c: parse_number("temperature", raw.temperature)?
                / CENTI_DEGREES_PER_DEGREE,
            accumulated_charge_mah: decode_accumulated_charge(
                raw.accumulated_charge,
                &self.hardware,
            )?,
        })
    }
}

/// Decode the accumulated charge register to mAh.
///
/// XO-1.5 / kernel API 2 report uAh directly. Older loggers wrote the
/// register either already signed or as an unsigned 16-bit value that must be
/// sign-extended before scaling.
pub fn decode_accumulated_charge(raw: &str, hardware: &HardwareProfile) -> Result<f64> {
    let text = raw.trim();
    let decode_error = || PwrLogError::AccumulatedChargeDecode {
        value: raw.to_string(),
    };

    if hardware.reports_charge_in_uah() {
        let value: f64 = text.parse().map_err(|_| decode_error())?;
        if !value.is_finite() {
            return Err(decode_error());
        }
        return Ok(value / MICRO_AMP_HOURS_PER_MAH);
    }

    let value: i64 = text.parse().map_err(|_| decode_error())?;
    Ok(sign_extend_register(value) as f64 * ACR_TO_MAH)
}

/// Two's-complement fixup for a register logged as unsigned 16-bit.
/// Values that are already negative pass through unchanged.
pub fn sign_extend_register(value: i64) -> i64 {
    if value < 0 {
        value
    } else if value & 0x8000 != 0 {
        -((!value & 0xFFFF) + 1)
    } else {
        value
    }
}

fn parse_number(field: &'static str, text: &str) -> Result<f64> {
    match text.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(PwrLogError::conversion(field, text)),
    }
}
