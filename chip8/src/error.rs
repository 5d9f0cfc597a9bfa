//! Result and errors.
use std::{
    fmt::{self, Display, Formatter},
    io,
};

pub type Chip8Result<T> = std::result::Result<T, Chip8Error>;

#[derive(Debug)]
pub enum Chip8Error {
    /// Font data that doesn't fit the font area.
    Font(String),
    /// Failure reading a ROM or talking to a host device.
    Io(io::Error),
    Fmt(fmt::Error),
}

impl Display for Chip8Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Font(msg) => write!(f, "font error: {}", msg),
            Self::Io(err) => write!(f, "io error: {}", err),
            Self::Fmt(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Chip8Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Font(_) => None,
            Self::Io(err) => Some(err),
            Self::Fmt(err) => Some(err),
        }
    }
}

impl From<fmt::Error> for Chip8Error {
    fn from(err: fmt::Error) -> Self {
        Chip8Error::Fmt(err)
    }
}

impl From<io::Error> for Chip8Error {
    fn from(err: io::Error) -> Self {
        Chip8Error::Io(err)
    }
}
