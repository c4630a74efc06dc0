use std::{error::Error, fmt::Display, io};

use crate::protocol::Namespace;

/// Errors that may occur when parsing a parameter setting such as `Lane2.DFE_Tap1=12+`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ParseError {
    /// The text does not start with `Lane`
    MissingLanePrefix,
    /// The lane is not a single digit between 0 and 4
    InvalidLane(String),
    /// The lane is not followed by `.`
    MissingSeparator,
    /// No `=` between parameter name and value
    MissingValue,
    UnknownParameter {
        namespace: Namespace,
        name: String,
    },
    InvalidValue(String),
    ValueOutOfRange(u64),
    /// Characters left over after the value and the optional `+`
    TrailingCharacters(String),
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::MissingLanePrefix => write!(f, "Setting must start with 'Lane'"),
            ParseError::InvalidLane(lane) => {
                write!(f, "Invalid lane '{}', expected a digit from 0 to 4", lane)
            }
            ParseError::MissingSeparator => write!(f, "Missing '.' after the lane"),
            ParseError::MissingValue => write!(f, "Missing '=<value>'"),
            ParseError::UnknownParameter { namespace, name } => {
                write!(f, "Unknown {} parameter '{}'", namespace, name)
            }
            ParseError::InvalidValue(value) => write!(f, "Invalid value '{}'", value),
            ParseError::ValueOutOfRange(value) => {
                write!(f, "Value {} does not fit into 8 bits", value)
            }
            ParseError::TrailingCharacters(rest) => {
                write!(f, "Unexpected trailing characters '{}'", rest)
            }
        }
    }
}

impl Error for ParseError {}

/// Errors reported for single entries of a parameter response.
/// These never abort decoding of the remaining entries.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DecodeError {
    UnknownParameter(u8),
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::UnknownParameter(ordinal) => write!(f, "unknown parameter {}", ordinal),
        }
    }
}

impl Error for DecodeError {}

/// Errors that may occur when reading a request from a stream.
#[derive(Debug)]
pub enum ReadError {
    IoError(io::Error),
    InvalidSubCommand(u32),
    InvalidLane(u32),
    /// A parameter word names an ordinal that the namespace does not know
    InvalidParameterWord(u32),
}

impl From<io::Error> for ReadError {
    fn from(value: io::Error) -> Self {
        ReadError::IoError(value)
    }
}

impl Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::IoError(error) => write!(f, "{}", error),
            ReadError::InvalidSubCommand(tag) => {
                write!(f, "Received invalid KR_TUNE sub-command {}", tag)
            }
            ReadError::InvalidLane(lane) => write!(f, "Received invalid lane {}", lane),
            ReadError::InvalidParameterWord(word) => {
                write!(f, "Received invalid parameter word 0x{:08x}", word)
            }
        }
    }
}

impl Error for ReadError {}
