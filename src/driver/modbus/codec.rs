//! attenuation <-> coil pattern conversion
//!
//! The module stores `n = 63 - raw_db * 2` in six coils, least significant bit
//! on the lowest coil address. `raw_db` is the 0..=31.5 dB range before the
//! per-device calibration offset is added.

use super::prelude::*;
use crate::common::error::DriverError;

pub const MAX_RAW_DB: f64 = 31.5;
pub const STEP_DB: f64 = 0.5;
pub const MAX_CODE: u8 = 63;

// tolerance used when checking for a 0.5 dB grid after offset subtraction
const GRID_EPSILON: f64 = 1e-6;

/// raw attenuation -> half-dB index in 0..=63
pub fn raw_to_index(raw_db: f64) -> Result<u8, DriverError> {
    if !raw_db.is_finite() {
        return Err(DriverError::InvalidValue(format!("{raw_db} is not a number")));
    }
    let doubled = raw_db * 2.0;
    let rounded = doubled.round();
    if (doubled - rounded).abs() > GRID_EPSILON {
        return Err(DriverError::InvalidValue(format!(
            "{raw_db} dB is not a multiple of {STEP_DB} dB"
        )));
    }
    if rounded < 0.0 || rounded > f64::from(MAX_CODE) {
        return Err(DriverError::InvalidValue(format!(
            "{raw_db} dB is outside 0..={MAX_RAW_DB} dB"
        )));
    }
    Ok(rounded as u8)
}

/// encode a raw attenuation into six coils, LSB first
pub fn encode(raw_db: f64) -> Result<CoilBits, DriverError> {
    let n = MAX_CODE - raw_to_index(raw_db)?;
    let mut bits = [false; SETTING_BIT_NUM];
    for (i, bit) in bits.iter_mut().enumerate() {
        *bit = (n >> i) & 1 == 1;
    }
    Ok(bits)
}

/// decode six coils (LSB first) back into a raw attenuation
pub fn decode(bits: &CoilBits) -> f64 {
    let n = bits
        .iter()
        .enumerate()
        .fold(0u8, |acc, (i, bit)| acc | ((*bit as u8) << i));
    f64::from(MAX_CODE - n) / 2.0
}

/// take one six-coil bank out of a longer read
pub fn bank(coils: &[bool], offset: usize) -> Result<CoilBits, DriverError> {
    coils
        .get(offset..offset + SETTING_BIT_NUM)
        .and_then(|s| CoilBits::try_from(s).ok())
        .ok_or_else(|| {
            DriverError::ProtocolError(format!(
                "expected at least {} coils, got {}",
                offset + SETTING_BIT_NUM,
                coils.len()
            ))
        })
}

pub fn to_display(raw_db: f64, calibration_offset: f64) -> f64 {
    raw_db + calibration_offset
}

pub fn to_raw(display_db: f64, calibration_offset: f64) -> f64 {
    display_db - calibration_offset
}

/// the 64 values an operator can pick for a device with this offset
pub fn selectable_values(calibration_offset: f64) -> Vec<f64> {
    (0..=MAX_CODE)
        .map(|i| to_display(f64::from(i) * STEP_DB, calibration_offset))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_values() {
        for i in 0..=63u8 {
            let raw = f64::from(i) / 2.0;
            let bits = encode(raw).unwrap();
            assert_eq!(decode(&bits), raw);
            assert_eq!(encode(decode(&bits)).unwrap(), bits);
        }
    }

    #[test]
    fn test_fixed_points() {
        assert_eq!(encode(0.0).unwrap(), [true; 6]);
        assert_eq!(encode(31.5).unwrap(), [false; 6]);
    }

    // n = 31 must come out LSB first
    #[test]
    fn test_bit_order() {
        assert_eq!(
            encode(16.0).unwrap(),
            [true, true, true, true, true, false]
        );
        assert_eq!(decode(&[false, true, true, true, true, true]), 0.5);
    }

    #[test]
    fn test_calibrated_write_pattern() {
        // operator picks 20.0 dB with a 4.5 dB offset
        let raw = to_raw(20.0, 4.5);
        assert_eq!(raw, 15.5);
        assert_eq!(
            encode(raw).unwrap(),
            [false, false, false, false, false, true]
        );
    }

    #[test]
    fn test_reject_out_of_range() {
        assert!(matches!(encode(32.0), Err(DriverError::InvalidValue(_))));
        assert!(matches!(encode(-0.5), Err(DriverError::InvalidValue(_))));
        assert!(matches!(encode(10.25), Err(DriverError::InvalidValue(_))));
        assert!(matches!(encode(f64::NAN), Err(DriverError::InvalidValue(_))));
    }

    #[test]
    fn test_offset_float_noise_is_tolerated() {
        let raw = to_raw(20.3, 4.3);
        assert_eq!(encode(raw).unwrap(), encode(16.0).unwrap());
    }

    #[test]
    fn test_bank() {
        let mut coils = vec![false; 12];
        coils[6] = true;
        assert_eq!(bank(&coils, 6).unwrap(), [true, false, false, false, false, false]);
        assert!(matches!(bank(&coils[..8], 6), Err(DriverError::ProtocolError(_))));
    }

    #[test]
    fn test_selectable_values() {
        let values = selectable_values(4.5);
        assert_eq!(values.len(), 64);
        assert_eq!(values[0], 4.5);
        assert_eq!(values[63], 36.0);
    }
}
