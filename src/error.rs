use image_fmt::LoadError;
use job_queue::JobError;

#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// A channel or channel group that the image doesn't have.
    NotFound(String),
    /// A position outside of the displayed image.
    OutOfBounds,
    /// An invalid display parameter or setting.
    Config(String),
    Load(LoadError),
    Job(JobError),
    Export(String),
    IO(std::io::Error),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Load(ref e) => Some(e),
            Error::Job(ref e) => Some(e),
            Error::IO(ref e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotFound(what) => write!(f, "NotFound: no channel or channel group named \"{}\".", what),
            Error::OutOfBounds => write!(f, "OutOfBounds: the position is outside of the image."),
            Error::Config(what) => write!(f, "Config: {}.", what),
            Error::Load(e) => e.fmt(f),
            Error::Job(e) => e.fmt(f),
            Error::Export(what) => write!(f, "Export: {}.", what),
            Error::IO(e) => e.fmt(f),
        }
    }
}

//-------------------------------------------------------------
// From impls.

impl From<LoadError> for Error {
    fn from(other: LoadError) -> Self {
        Error::Load(other)
    }
}

impl From<JobError> for Error {
    fn from(other: JobError) -> Self {
        Error::Job(other)
    }
}

impl From<std::io::Error> for Error {
    fn from(other: std::io::Error) -> Self {
        Error::IO(other)
    }
}
