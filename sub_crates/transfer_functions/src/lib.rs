//! Transfer functions used for display encoding and LDR decoding.

/// The sRGB gamma curve.
///
/// Both directions are the standard piecewise formulas with `a = 0.055`.
/// Negative inputs stay on the linear segment, so the curves are defined
/// (and odd-ish) over the whole real line, which matters for difference
/// images.
pub mod srgb {
    const A: f32 = 0.055;

    /// Linear values at or below this are encoded with the linear segment.
    pub const LINEAR_THRESHOLD: f32 = 0.003_130_8;

    /// Encoded values at or below this are decoded with the linear segment.
    pub const ENCODED_THRESHOLD: f32 = 0.04045;

    /// Linear -> sRGB
    #[inline]
    pub fn from_linear(n: f32) -> f32 {
        from_linear_with_gamma(n, 2.4)
    }

    /// sRGB -> Linear
    #[inline]
    pub fn to_linear(n: f32) -> f32 {
        to_linear_with_gamma(n, 2.4)
    }

    /// Linear -> sRGB-like curve with a custom exponent for the power segment.
    #[inline]
    pub fn from_linear_with_gamma(n: f32, gamma: f32) -> f32 {
        if n <= LINEAR_THRESHOLD {
            n * 12.92
        } else {
            ((1.0 + A) * n.powf(1.0 / gamma)) - A
        }
    }

    /// Inverse of `from_linear_with_gamma()`.
    #[inline]
    pub fn to_linear_with_gamma(n: f32, gamma: f32) -> f32 {
        if n <= ENCODED_THRESHOLD {
            n / 12.92
        } else {
            ((n + A) / (1.0 + A)).powf(gamma)
        }
    }

    /// Decodes an 8-bit sRGB value.
    #[inline]
    pub fn u8_to_linear(n: u8) -> f32 {
        to_linear(n as f32 / 255.0)
    }

    /// Decodes a 16-bit sRGB value.
    #[inline]
    pub fn u16_to_linear(n: u16) -> f32 {
        to_linear(n as f32 / 65535.0)
    }

}
