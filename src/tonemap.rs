//! Per-sample display math: exposure, error metrics and tonemapping.

use transfer_functions::srgb;

use crate::Error;

/// Keeps relative metrics finite where the reference is zero.
pub const EPSILON: f32 = 0.01;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Tonemap {
    SRGB,
    Gamma,
    FalseColor,
    PositiveNegative,
}

impl Tonemap {
    pub const ALL: [Tonemap; 4] = [
        Tonemap::SRGB,
        Tonemap::Gamma,
        Tonemap::FalseColor,
        Tonemap::PositiveNegative,
    ];
    pub const COUNT: usize = Tonemap::ALL.len();

    pub fn name(&self) -> &'static str {
        match self {
            Tonemap::SRGB => "sRGB",
            Tonemap::Gamma => "Gamma",
            Tonemap::FalseColor => "FalseColor",
            Tonemap::PositiveNegative => "PositiveNegative",
        }
    }
}

impl std::fmt::Display for Tonemap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Tonemap {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalized_name(s).as_str() {
            "SRGB" => Ok(Tonemap::SRGB),
            "GAMMA" => Ok(Tonemap::Gamma),
            "FALSECOLOR" | "FC" => Ok(Tonemap::FalseColor),
            "POSITIVENEGATIVE" | "POSNEG" | "PN" | "+-" => Ok(Tonemap::PositiveNegative),
            _ => Err(Error::Config(format!("unknown tonemap \"{}\"", s))),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Metric {
    Error,
    AbsoluteError,
    SquaredError,
    RelativeAbsoluteError,
    RelativeSquaredError,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Error,
        Metric::AbsoluteError,
        Metric::SquaredError,
        Metric::RelativeAbsoluteError,
        Metric::RelativeSquaredError,
    ];
    pub const COUNT: usize = Metric::ALL.len();

    pub fn name(&self) -> &'static str {
        match self {
            Metric::Error => "Error",
            Metric::AbsoluteError => "AbsoluteError",
            Metric::SquaredError => "SquaredError",
            Metric::RelativeAbsoluteError => "RelativeAbsoluteError",
            Metric::RelativeSquaredError => "RelativeSquaredError",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalized_name(s).as_str() {
            "ERROR" | "E" => Ok(Metric::Error),
            "ABSOLUTEERROR" | "AE" => Ok(Metric::AbsoluteError),
            "SQUAREDERROR" | "SE" => Ok(Metric::SquaredError),
            "RELATIVEABSOLUTEERROR" | "RAE" => Ok(Metric::RelativeAbsoluteError),
            "RELATIVESQUAREDERROR" | "RSE" => Ok(Metric::RelativeSquaredError),
            _ => Err(Error::Config(format!("unknown metric \"{}\"", s))),
        }
    }
}

// Upper case, with spaces, underscores and dashes between words removed.
fn normalized_name(s: &str) -> String {
    let s = s.trim();
    if s == "+-" {
        return s.into();
    }
    s.chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_uppercase)
        .collect()
}

#[inline]
pub fn apply_exposure_and_offset(value: f32, exposure: f32, offset: f32) -> f32 {
    value * exposure.exp2() + offset
}

#[inline]
pub fn apply_metric(value: f32, reference: f32, metric: Metric) -> f32 {
    let diff = value - reference;
    match metric {
        Metric::Error => diff,
        Metric::AbsoluteError => diff.abs(),
        Metric::SquaredError => diff * diff,
        Metric::RelativeAbsoluteError => diff.abs() / (reference.abs() + EPSILON),
        Metric::RelativeSquaredError => diff * diff / (reference * reference + EPSILON),
    }
}

/// Maps a linear RGB value to display values.
///
/// The result isn't clamped.
pub fn apply_tonemap(rgb: [f32; 3], gamma: f32, tonemap: Tonemap) -> [f32; 3] {
    match tonemap {
        Tonemap::SRGB => [
            srgb::from_linear(rgb[0]),
            srgb::from_linear(rgb[1]),
            srgb::from_linear(rgb[2]),
        ],

        Tonemap::Gamma => {
            let inv = 1.0 / gamma;
            let f = |v: f32| v.signum() * v.abs().powf(inv);
            [f(rgb[0]), f(rgb[1]), f(rgb[2])]
        }

        Tonemap::FalseColor => {
            let mean = (rgb[0] + rgb[1] + rgb[2]) / 3.0;
            false_color(((mean + 1.0 / 32.0).log2() / 10.0) + 0.5)
        }

        Tonemap::PositiveNegative => {
            let negative = (rgb[0].min(0.0) + rgb[1].min(0.0) + rgb[2].min(0.0)) / 3.0;
            let positive = (rgb[0].max(0.0) + rgb[1].max(0.0) + rgb[2].max(0.0)) / 3.0;
            [-2.0 * negative, 2.0 * positive, 0.0]
        }
    }
}

/// Display encoded stops of the false color ramp, evenly spaced over [0, 1].
const FALSE_COLOR_RAMP: [[f32; 3]; 9] = [
    [0.267004, 0.004874, 0.329415],
    [0.280255, 0.165693, 0.476498],
    [0.229739, 0.322361, 0.545706],
    [0.172719, 0.448791, 0.557885],
    [0.128729, 0.563265, 0.551229],
    [0.157851, 0.683765, 0.501686],
    [0.369214, 0.788888, 0.382914],
    [0.678489, 0.863742, 0.189503],
    [0.993248, 0.906157, 0.143936],
];

/// Looks up `t` in the false color ramp.  `t` is clamped to [0, 1], NaN
/// maps to the bottom of the ramp.
pub fn false_color(t: f32) -> [f32; 3] {
    let t = if t.is_nan() { 0.0 } else { t.max(0.0).min(1.0) };
    let x = t * (FALSE_COLOR_RAMP.len() - 1) as f32;
    let i = (x as usize).min(FALSE_COLOR_RAMP.len() - 2);
    let alpha = x - i as f32;

    let a = FALSE_COLOR_RAMP[i];
    let b = FALSE_COLOR_RAMP[i + 1];
    [
        a[0] + (b[0] - a[0]) * alpha,
        a[1] + (b[1] - a[1]) * alpha,
        a[2] + (b[2] - a[2]) * alpha,
    ]
}

/// Clamps `value` to `[min, max]`, refusing inverted bounds.
pub fn checked_clamp(value: f32, min: f32, max: f32) -> Result<f32, Error> {
    if max < min {
        return Err(Error::Config(format!(
            "invalid clamp range [{}, {}]",
            min, max
        )));
    }
    Ok(value.max(min).min(max))
}

/// The user adjustable part of how an image is displayed.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DisplayParams {
    /// In stops.
    pub exposure: f32,
    pub offset: f32,
    pub gamma: f32,
    pub tonemap: Tonemap,
    pub metric: Metric,
    pub clip_to_ldr: bool,
}

impl Default for DisplayParams {
    fn default() -> DisplayParams {
        DisplayParams {
            exposure: 0.0,
            offset: 0.0,
            gamma: 2.2,
            tonemap: Tonemap::SRGB,
            metric: Metric::Error,
            clip_to_ldr: false,
        }
    }
}

impl DisplayParams {
    pub fn validate(&self) -> Result<(), Error> {
        if !self.exposure.is_finite() {
            return Err(Error::Config(format!("exposure must be finite, got {}", self.exposure)));
        }
        if !self.offset.is_finite() {
            return Err(Error::Config(format!("offset must be finite, got {}", self.offset)));
        }
        if !(self.gamma.is_finite() && self.gamma > 0.0) {
            return Err(Error::Config(format!(
                "gamma must be finite and greater than zero, got {}",
                self.gamma
            )));
        }
        Ok(())
    }

    /// Linear value after exposure and offset, clipped if requested.
    #[inline]
    pub fn adjust(&self, value: f32) -> f32 {
        let v = apply_exposure_and_offset(value, self.exposure, self.offset);
        if self.clip_to_ldr {
            v.max(0.0).min(1.0)
        } else {
            v
        }
    }

    /// Full linear-to-display mapping of one (straight alpha) color.
    pub fn display(&self, rgb: [f32; 3]) -> [f32; 3] {
        let adjusted = [
            apply_exposure_and_offset(rgb[0], self.exposure, self.offset),
            apply_exposure_and_offset(rgb[1], self.exposure, self.offset),
            apply_exposure_and_offset(rgb[2], self.exposure, self.offset),
        ];
        let mapped = apply_tonemap(adjusted, self.gamma, self.tonemap);
        if self.clip_to_ldr {
            [
                mapped[0].max(0.0).min(1.0),
                mapped[1].max(0.0).min(1.0),
                mapped[2].max(0.0).min(1.0),
            ]
        } else {
            mapped
        }
    }
}
