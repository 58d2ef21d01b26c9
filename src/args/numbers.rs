use std::{
    fmt,
    num::{NonZeroU64, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

#[derive(Debug, PartialEq, Eq)]
pub enum NumberErrorType {
    UnexpectedEnd(String),
    InvalidValue(String, String),
}

impl fmt::Display for NumberErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEnd(arg) => write!(f, "Expected a positive number after {arg}"),
            Self::InvalidValue(arg, arg2) => write!(f, "Invalid value after {arg}, expected a positive number: {arg2}"),
        }
    }
}

fn parse_positive_arg<T: FromStr>(arg: String, maybe_arg2: Option<String>) -> Result<T, NumberErrorType> {
    let arg2 = match maybe_arg2 {
        Some(arg2) => arg2,
        None => return Err(NumberErrorType::UnexpectedEnd(arg)),
    };

    arg2.parse::<T>().map_err(|_| NumberErrorType::InvalidValue(arg, arg2))
}

/// Parses a whole amount of seconds, which must be at least 1.
pub(super) fn parse_seconds_arg(arg: String, maybe_arg2: Option<String>) -> Result<Duration, NumberErrorType> {
    parse_positive_arg(arg, maybe_arg2).map(|seconds: NonZeroU64| Duration::from_secs(seconds.get()))
}

/// Parses a size in bytes, which must be at least 1.
pub(super) fn parse_size_arg(arg: String, maybe_arg2: Option<String>) -> Result<usize, NumberErrorType> {
    parse_positive_arg(arg, maybe_arg2).map(NonZeroUsize::get)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{parse_seconds_arg, parse_size_arg, NumberErrorType};

    #[test]
    fn test_seconds() {
        assert_eq!(parse_seconds_arg("-t".to_string(), Some("30".to_string())), Ok(Duration::from_secs(30)));
        assert_eq!(
            parse_seconds_arg("-t".to_string(), Some("0".to_string())),
            Err(NumberErrorType::InvalidValue("-t".to_string(), "0".to_string()))
        );
        assert_eq!(parse_seconds_arg("-t".to_string(), None), Err(NumberErrorType::UnexpectedEnd("-t".to_string())));
    }

    #[test]
    fn test_size() {
        assert_eq!(parse_size_arg("-b".to_string(), Some("4096".to_string())), Ok(4096));
        assert_eq!(
            parse_size_arg("-b".to_string(), Some("-5".to_string())),
            Err(NumberErrorType::InvalidValue("-b".to_string(), "-5".to_string()))
        );
    }
}
