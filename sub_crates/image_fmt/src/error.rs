#[derive(Debug)]
#[non_exhaustive]
pub enum LoadError {
    IO(std::io::Error),
    UnknownFormat,
    UnsupportedFeature(String),
    Malformed(String),
    Truncated,
    InvalidSelector(String),
    NoChannels,
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::IO(ref e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::IO(e) => e.fmt(f),
            LoadError::UnknownFormat => write!(f, "UnknownFormat: could not determine the image file format."),
            LoadError::UnsupportedFeature(what) => write!(f, "UnsupportedFeature: the image file uses a feature that is currently unsupported ({}).", what),
            LoadError::Malformed(what) => write!(f, "Malformed: the image file is corrupt ({}).", what),
            LoadError::Truncated => write!(f, "Truncated: the image file ended before all of its data was read."),
            LoadError::InvalidSelector(what) => write!(f, "InvalidSelector: the channel selector is not a valid regular expression ({}).", what),
            LoadError::NoChannels => write!(f, "NoChannels: the image has no channels matching the channel selector."),
        }
    }
}

//-------------------------------------------------------------
// From impls.

impl From<std::io::Error> for LoadError {
    fn from(other: std::io::Error) -> Self {
        match other.kind() {
            std::io::ErrorKind::UnexpectedEof => Self::Truncated,
            std::io::ErrorKind::InvalidData => Self::Malformed(other.to_string()),
            std::io::ErrorKind::Unsupported => Self::UnsupportedFeature(other.to_string()),
            _ => Self::IO(other),
        }
    }
}

impl From<regex::Error> for LoadError {
    fn from(other: regex::Error) -> Self {
        Self::InvalidSelector(other.to_string())
    }
}

impl From<exr::error::Error> for LoadError {
    fn from(other: exr::error::Error) -> Self {
        use exr::error::Error::*;
        #[allow(unreachable_patterns)]
        match other {
            Io(e) => e.into(),
            NotSupported(what) => Self::UnsupportedFeature(what.to_string()),
            Invalid(what) => Self::Malformed(what.to_string()),
            Aborted => Self::Malformed("decoding was aborted".into()),
            e => Self::Malformed(e.to_string()),
        }
    }
}

impl From<png::DecodingError> for LoadError {
    fn from(other: png::DecodingError) -> Self {
        match other {
            png::DecodingError::IoError(e) => e.into(),
            png::DecodingError::Format(e) => Self::Malformed(e.to_string()),
            e => Self::UnsupportedFeature(e.to_string()),
        }
    }
}

impl From<jpeg_decoder::Error> for LoadError {
    fn from(other: jpeg_decoder::Error) -> Self {
        use jpeg_decoder::Error::*;
        #[allow(unreachable_patterns)]
        match other {
            Io(e) => e.into(),
            Format(what) => Self::Malformed(what),
            Unsupported(feature) => Self::UnsupportedFeature(format!("{:?}", feature)),
            Internal(e) => Self::Malformed(e.to_string()),
            e => Self::Malformed(e.to_string()),
        }
    }
}

impl From<tiff::TiffError> for LoadError {
    fn from(other: tiff::TiffError) -> Self {
        use tiff::TiffError::*;
        match other {
            IoError(e) => e.into(),
            FormatError(e) => Self::Malformed(e.to_string()),
            UnsupportedError(e) => Self::UnsupportedFeature(e.to_string()),
            e => Self::Malformed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_is_truncation() {
        let err: LoadError = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(err, LoadError::Truncated));

        let err: LoadError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, LoadError::IO(_)));
    }
}
