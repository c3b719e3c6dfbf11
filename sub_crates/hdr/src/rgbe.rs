//! The shared-exponent RGBE pixel encoding of Radiance .hdr files.
//!
//! Each pixel is four bytes: three 8-bit mantissas and one exponent byte.
//! A pixel decodes to `mantissa * 2^(exponent - 136)`, and a zero exponent
//! byte encodes black.

const EXP_BIAS: i32 = 136;

/// 2^exp for integer exponents in [-126, 127], built directly from IEEE bits.
#[inline(always)]
fn exp2i(exp: i32) -> f32 {
    f32::from_bits(((exp + 127) as u32) << 23)
}

/// floor(log2(n)) for positive normal floats, read from the IEEE exponent.
#[inline(always)]
fn floor_log2(n: f32) -> i32 {
    ((n.to_bits() >> 23) & 0xff) as i32 - 127
}

/// Encodes a linear RGB triple.
///
/// Negative and NaN components are written as zero, since the format
/// cannot represent them.
#[inline]
pub fn encode(rgb: [f32; 3]) -> [u8; 4] {
    let sanitize = |n: f32| if n > 0.0 { n } else { 0.0 };
    let rgb = [sanitize(rgb[0]), sanitize(rgb[1]), sanitize(rgb[2])];
    let largest = rgb[0].max(rgb[1]).max(rgb[2]);

    if largest <= 1.0e-32 {
        return [0, 0, 0, 0];
    }

    // Scale so the largest component lands in [128, 256).
    let e = floor_log2(largest).min(126);
    let scale = exp2i(7 - e);
    let quantize = |n: f32| (n * scale).min(255.0) as u8;

    [
        quantize(rgb[0]),
        quantize(rgb[1]),
        quantize(rgb[2]),
        (e + 1 + 128) as u8,
    ]
}

/// Decodes one RGBE pixel.
#[inline]
pub fn decode(rgbe: [u8; 4]) -> [f32; 3] {
    if rgbe[3] == 0 {
        return [0.0; 3];
    }

    let scale = 2.0f32.powi(rgbe[3] as i32 - EXP_BIAS);
    [
        rgbe[0] as f32 * scale,
        rgbe[1] as f32 * scale,
        rgbe[2] as f32 * scale,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn black() {
        assert_eq!(encode([0.0, 0.0, 0.0]), [0, 0, 0, 0]);
        assert_eq!(decode([0, 0, 0, 0]), [0.0, 0.0, 0.0]);
        assert_eq!(decode([12, 40, 3, 0]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn negatives_become_black() {
        assert_eq!(encode([-1.0, -2.0, f32::NAN]), [0, 0, 0, 0]);
    }

    #[test]
    fn standard_exponent_layout() {
        // 1.0 is stored as mantissa 128 with exponent byte 129.
        assert_eq!(encode([1.0, 0.0, 0.0]), [128, 0, 0, 129]);
        assert_eq!(decode([128, 64, 0, 129]), [1.0, 0.5, 0.0]);
    }

    #[test]
    fn relative_accuracy() {
        for &n in &[0.001f32, 0.25, 1.0, 3.7, 100.0, 65504.0] {
            let [r, g, b] = decode(encode([n, n * 0.5, n * 0.25]));
            assert!((r - n).abs() / n < 0.01, "{} -> {}", n, r);
            assert!((g - n * 0.5).abs() / n < 0.01);
            assert!((b - n * 0.25).abs() / n < 0.01);
        }
    }
}
