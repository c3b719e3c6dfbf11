use std::path::PathBuf;

use clap::{App, Arg, ArgMatches};
use glam::Vec2;

use lib::{DisplayParams, Error, Metric, Tonemap, Viewport};

/// Everything the command line configures, validated.
#[derive(Debug, Clone)]
pub struct Settings {
    pub images: Vec<PathBuf>,
    pub reference: Option<PathBuf>,
    pub channels: String,
    pub regex: bool,
    pub group: Option<String>,
    pub params: DisplayParams,
    pub viewport: Viewport,
    /// Image pixel coordinates.
    pub probes: Vec<Vec2>,
    pub export: Option<PathBuf>,
    pub threads: Option<usize>,
    pub log_level: log::Level,
}

pub fn app() -> App<'static, 'static> {
    App::new("HDR View")
        .version(super::VERSION)
        .about("Inspects HDR and LDR images: statistics, pixel values, and tonemapped export")
        .arg(
            Arg::with_name("IMAGES")
                .help("Image files to load")
                .required(true)
                .multiple(true)
                .index(1),
        )
        .arg(
            Arg::with_name("reference")
                .short("r")
                .long("reference")
                .value_name("FILE")
                .help("Reference image to compare against")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("channels")
                .short("c")
                .long("channels")
                .value_name("SELECTOR")
                .help("Only load channels whose names contain SELECTOR")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("regex")
                .long("regex")
                .help("Treat the channel selector as a regular expression matching whole names"),
        )
        .arg(
            Arg::with_name("group")
                .short("g")
                .long("group")
                .value_name("NAME")
                .help("Channel group to display, e.g. \"R,G,B,A\"")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("exposure")
                .short("e")
                .long("exposure")
                .value_name("STOPS")
                .help("Exposure adjustment in stops")
                .takes_value(true)
                .allow_hyphen_values(true),
        )
        .arg(
            Arg::with_name("offset")
                .short("o")
                .long("offset")
                .value_name("VALUE")
                .help("Value added after exposure")
                .takes_value(true)
                .allow_hyphen_values(true),
        )
        .arg(
            Arg::with_name("gamma")
                .long("gamma")
                .value_name("GAMMA")
                .help("Gamma of the Gamma tonemap [default: 2.2]")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("tonemap")
                .short("t")
                .long("tonemap")
                .value_name("TONEMAP")
                .help("sRGB, Gamma, FalseColor, or PositiveNegative")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("metric")
                .short("m")
                .long("metric")
                .value_name("METRIC")
                .help("Error, AbsoluteError, SquaredError, RelativeAbsoluteError, or RelativeSquaredError")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("clip")
                .long("clip")
                .help("Clip displayed values to [0, 1]"),
        )
        .arg(
            Arg::with_name("size")
                .long("size")
                .value_name("WxH")
                .help("Viewport size in display units [default: 1024x768]")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("pixel-ratio")
                .long("pixel-ratio")
                .value_name("RATIO")
                .help("Physical pixels per display unit [default: 1]")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("probe")
                .short("p")
                .long("probe")
                .value_name("X,Y")
                .help("Print the values of the pixel at X,Y")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1),
        )
        .arg(
            Arg::with_name("export")
                .short("x")
                .long("export")
                .value_name("FILE")
                .help("Save the displayed image as .png or .hdr")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("threads")
                .short("j")
                .long("threads")
                .value_name("N")
                .help("Number of worker threads [default: one per core]")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .help("More log output (repeat for even more)"),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .long("quiet")
                .conflicts_with("verbose")
                .help("Only log errors"),
        )
}

fn parse_number<T: std::str::FromStr>(name: &str, text: &str) -> Result<T, Error> {
    text.trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid value \"{}\" for --{}", text, name)))
}

fn parse_pair(name: &str, text: &str, separator: char) -> Result<(f32, f32), Error> {
    let mut parts = text.splitn(2, separator);
    match (parts.next(), parts.next()) {
        (Some(a), Some(b)) => Ok((parse_number(name, a)?, parse_number(name, b)?)),
        _ => Err(Error::Config(format!(
            "invalid value \"{}\" for --{}, expected two numbers separated by '{}'",
            text, name, separator
        ))),
    }
}

impl Settings {
    pub fn from_matches(matches: &ArgMatches) -> Result<Settings, Error> {
        let mut params = DisplayParams::default();
        if let Some(v) = matches.value_of("exposure") {
            params.exposure = parse_number("exposure", v)?;
        }
        if let Some(v) = matches.value_of("offset") {
            params.offset = parse_number("offset", v)?;
        }
        if let Some(v) = matches.value_of("gamma") {
            params.gamma = parse_number("gamma", v)?;
        }
        if let Some(v) = matches.value_of("tonemap") {
            params.tonemap = v.parse::<Tonemap>()?;
        }
        if let Some(v) = matches.value_of("metric") {
            params.metric = v.parse::<Metric>()?;
        }
        params.clip_to_ldr = matches.is_present("clip");
        params.validate()?;

        let mut viewport = Viewport::default();
        if let Some(v) = matches.value_of("size") {
            let (w, h) = parse_pair("size", &v.to_lowercase(), 'x')?;
            viewport.size = Vec2::new(w, h);
        }
        if let Some(v) = matches.value_of("pixel-ratio") {
            viewport.pixel_ratio = parse_number("pixel-ratio", v)?;
        }
        if !(viewport.size.x > 0.0 && viewport.size.y > 0.0 && viewport.pixel_ratio > 0.0) {
            return Err(Error::Config(
                "viewport size and pixel ratio must be greater than zero".into(),
            ));
        }

        let probes = match matches.values_of("probe") {
            Some(values) => values
                .map(|v| parse_pair("probe", v, ',').map(|(x, y)| Vec2::new(x, y)))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let threads = match matches.value_of("threads") {
            Some(v) => match parse_number::<usize>("threads", v)? {
                0 => return Err(Error::Config("--threads must be at least 1".into())),
                n => Some(n),
            },
            None => None,
        };

        let log_level = if matches.is_present("quiet") {
            log::Level::Error
        } else {
            match matches.occurrences_of("verbose") {
                0 => log::Level::Warn,
                1 => log::Level::Info,
                2 => log::Level::Debug,
                _ => log::Level::Trace,
            }
        };

        Ok(Settings {
            images: matches
                .values_of("IMAGES")
                .map(|v| v.map(PathBuf::from).collect())
                .unwrap_or_default(),
            reference: matches.value_of("reference").map(PathBuf::from),
            channels: matches.value_of("channels").unwrap_or("").into(),
            regex: matches.is_present("regex"),
            group: matches.value_of("group").map(String::from),
            params: params,
            viewport: viewport,
            probes: probes,
            export: matches.value_of("export").map(PathBuf::from),
            threads: threads,
            log_level: log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Settings, Error> {
        let mut full = vec!["hdr_view"];
        full.extend_from_slice(args);
        let matches = app()
            .get_matches_from_safe(full)
            .map_err(|e| Error::Config(e.message))?;
        Settings::from_matches(&matches)
    }

    #[test]
    fn defaults() {
        let settings = parse(&["a.exr"]).unwrap();
        assert_eq!(settings.images, vec![PathBuf::from("a.exr")]);
        assert_eq!(settings.params, DisplayParams::default());
        assert_eq!(settings.viewport, Viewport::default());
        assert_eq!(settings.log_level, log::Level::Warn);
        assert!(settings.probes.is_empty());
        assert!(settings.reference.is_none());
    }

    #[test]
    fn everything() {
        let settings = parse(&[
            "a.exr", "b.exr", "-r", "ref.exr", "-c", "diffuse", "--regex", "-g", "R,G,B",
            "-e", "-1.5", "-o", "0.25", "--gamma", "2.4", "-t", "fc", "-m", "rse", "--clip",
            "--size", "640X480", "--pixel-ratio", "2", "-p", "1,2", "-p", "3.5,4", "-x",
            "out.png", "-j", "3", "-vv",
        ])
        .unwrap();

        assert_eq!(settings.images.len(), 2);
        assert_eq!(settings.reference, Some(PathBuf::from("ref.exr")));
        assert_eq!(settings.channels, "diffuse");
        assert!(settings.regex);
        assert_eq!(settings.group.as_deref(), Some("R,G,B"));
        assert_eq!(settings.params.exposure, -1.5);
        assert_eq!(settings.params.offset, 0.25);
        assert_eq!(settings.params.gamma, 2.4);
        assert_eq!(settings.params.tonemap, Tonemap::FalseColor);
        assert_eq!(settings.params.metric, Metric::RelativeSquaredError);
        assert!(settings.params.clip_to_ldr);
        assert_eq!(settings.viewport, Viewport::new(640.0, 480.0, 2.0));
        assert_eq!(settings.probes, vec![Vec2::new(1.0, 2.0), Vec2::new(3.5, 4.0)]);
        assert_eq!(settings.export, Some(PathBuf::from("out.png")));
        assert_eq!(settings.threads, Some(3));
        assert_eq!(settings.log_level, log::Level::Debug);
    }

    #[test]
    fn bad_values() {
        assert!(matches!(parse(&["a.exr", "--gamma", "0"]), Err(Error::Config(_))));
        assert!(matches!(parse(&["a.exr", "-t", "sepia"]), Err(Error::Config(_))));
        assert!(matches!(parse(&["a.exr", "--size", "100"]), Err(Error::Config(_))));
        assert!(matches!(parse(&["a.exr", "-p", "1;2"]), Err(Error::Config(_))));
        assert!(matches!(parse(&["a.exr", "-j", "0"]), Err(Error::Config(_))));
        assert!(parse(&[]).is_err());
    }
}
