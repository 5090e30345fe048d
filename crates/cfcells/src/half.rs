//! Conversion between 16-bit half floats and f32.
//!
//! float: sign 1, exponent 8, mantissa 23, exponent bias 127
//! half:  sign 1, exponent 5, mantissa 10, exponent bias 15
//!
//! Encoding truncates (rounds toward zero) and saturates finite values that are too large to
//! HALF_MAX instead of producing infinity.

/// The largest finite half, 65504.0.
pub const HALF_MAX: u16 = 0x7bff;

/// Positive infinity.
pub const HALF_INFINITY: u16 = 0x7c00;

/// The quiet NaN produced when a NaN payload doesn't survive the narrowing.
pub const HALF_NAN: u16 = 0x7e00;

/// Difference between the two exponent biases (127 - 15).
const BIAS_DELTA: i32 = 112;

/// Decodes a half float into the f32 with the same value.
pub fn half_to_f32(half: u16) -> f32 {
    let sign = u32::from(half & 0x8000) << 16;
    let mut exponent = i32::from((half >> 10) & 0x1f);
    let mut mantissa = u32::from(half & 0x03ff);

    if exponent == 0 {
        if mantissa == 0 {
            return f32::from_bits(sign);
        }
        // Subnormal. Normalize until the implicit bit appears, then drop it.
        exponent = 1;
        while mantissa & 0x0400 == 0 {
            mantissa <<= 1;
            exponent -= 1;
        }
        mantissa &= 0x03ff;
    }

    exponent += BIAS_DELTA;
    if exponent == 31 + BIAS_DELTA {
        // Infinity and NaN keep the all-ones exponent.
        exponent = 0xff;
    }
    f32::from_bits(sign | ((exponent as u32) << 23) | (mantissa << 13))
}

/// Encodes an f32 as a half float.
pub fn f32_to_half(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    if bits & 0x7fff_ffff == 0 {
        return sign;
    }

    let exponent = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x007f_ffff;

    if exponent == 0xff {
        if mantissa == 0 {
            return sign | HALF_INFINITY;
        }
        let payload = (mantissa >> 13) as u16;
        if payload == 0 {
            return sign | HALF_NAN;
        }
        return sign | HALF_INFINITY | payload;
    }

    let exponent = exponent - BIAS_DELTA;
    if exponent > 0 {
        if exponent < 31 {
            sign | ((exponent as u16) << 10) | ((mantissa >> 13) as u16)
        } else {
            sign | HALF_MAX
        }
    } else if exponent >= -10 {
        // Subnormal half: put the implicit bit back and shift into the 10-bit field.
        sign | (((mantissa | 0x0080_0000) >> (14 - exponent)) as u16)
    } else {
        sign
    }
}
