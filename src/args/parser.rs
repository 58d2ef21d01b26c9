use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
};

use tunnel_relay::config::TunnelConfig;

use super::{parse_seconds_arg, parse_size_arg, parse_socket_arg, ArgumentsRequest, NumberErrorType, SocketErrorType, StartupArguments, DEFAULT_PORT};

#[derive(Debug, PartialEq, Eq)]
pub enum ArgumentsError {
    UnknownArgument(String),
    ListenError(SocketErrorType),
    IdleTimeout(NumberErrorType),
    BufferSize(NumberErrorType),
    VerboseAndSilent,
}

impl fmt::Display for ArgumentsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownArgument(arg) => write!(f, "Unknown argument: {arg}"),
            Self::ListenError(socket_error) => socket_error.fmt(f),
            Self::IdleTimeout(number_error) => number_error.fmt(f),
            Self::BufferSize(number_error) => number_error.fmt(f),
            Self::VerboseAndSilent => write!(f, "Cannot specify both verbose and silent"),
        }
    }
}

struct StartupArgumentsParser {
    verbose: bool,
    silent: bool,
    listen_addresses: Vec<SocketAddr>,
    tunnel_config: TunnelConfig,
}

impl StartupArgumentsParser {
    const fn new() -> Self {
        Self {
            verbose: false,
            silent: false,
            listen_addresses: Vec::new(),
            tunnel_config: TunnelConfig::new(),
        }
    }

    fn complete(mut self) -> Result<StartupArguments, ArgumentsError> {
        if self.verbose && self.silent {
            return Err(ArgumentsError::VerboseAndSilent);
        }

        if self.listen_addresses.is_empty() {
            self.listen_addresses.push(SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), DEFAULT_PORT));
            self.listen_addresses.push(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT));
        }

        Ok(StartupArguments::new(self.verbose, self.silent, self.listen_addresses, self.tunnel_config))
    }
}

fn try_parse_general_argument(result: &mut StartupArgumentsParser, maybe_arg: &mut Option<String>) -> Result<bool, ArgumentsError> {
    let arg = match maybe_arg.take() {
        Some(s) => s,
        None => return Ok(false),
    };

    if arg.eq("-v") || arg.eq_ignore_ascii_case("--verbose") {
        result.verbose = true;
    } else if arg.eq("-s") || arg.eq_ignore_ascii_case("--silent") {
        result.silent = true;
    } else {
        *maybe_arg = Some(arg);
    }

    Ok(maybe_arg.is_none())
}

fn try_parse_listen_argument<F>(
    result: &mut StartupArgumentsParser,
    maybe_arg: &mut Option<String>,
    get_next_arg: F,
) -> Result<bool, ArgumentsError>
where
    F: FnOnce() -> Option<String>,
{
    let arg = match maybe_arg.take() {
        Some(s) => s,
        None => return Ok(false),
    };

    if arg.eq("-l") || arg.eq_ignore_ascii_case("--listen") {
        parse_socket_arg(&mut result.listen_addresses, arg, get_next_arg(), DEFAULT_PORT).map_err(ArgumentsError::ListenError)?;
    } else {
        *maybe_arg = Some(arg);
    }

    Ok(maybe_arg.is_none())
}

fn try_parse_tunnel_argument<F>(
    result: &mut StartupArgumentsParser,
    maybe_arg: &mut Option<String>,
    get_next_arg: F,
) -> Result<bool, ArgumentsError>
where
    F: FnOnce() -> Option<String>,
{
    let arg = match maybe_arg.take() {
        Some(s) => s,
        None => return Ok(false),
    };

    if arg.eq("-t") || arg.eq_ignore_ascii_case("--idle-timeout") {
        let idle_timeout = parse_seconds_arg(arg, get_next_arg()).map_err(ArgumentsError::IdleTimeout)?;
        result.tunnel_config = result.tunnel_config.with_idle_timeout(idle_timeout);
    } else if arg.eq("-b") || arg.eq_ignore_ascii_case("--buffer-size") {
        let read_size = parse_size_arg(arg, get_next_arg()).map_err(ArgumentsError::BufferSize)?;
        result.tunnel_config = result.tunnel_config.with_read_size(read_size);
    } else {
        *maybe_arg = Some(arg);
    }

    Ok(maybe_arg.is_none())
}

pub fn parse_arguments<T>(mut args: T) -> Result<ArgumentsRequest, ArgumentsError>
where
    T: Iterator<Item = String>,
{
    let mut result = StartupArgumentsParser::new();

    // Ignore the first argument, as it's by convention the name of the program
    args.next();

    while let Some(arg) = args.next() {
        if arg.is_empty() {
            continue;
        } else if arg.eq("-h") || arg.eq_ignore_ascii_case("--help") {
            return Ok(ArgumentsRequest::Help);
        } else if arg.eq("-V") || arg.eq_ignore_ascii_case("--version") {
            return Ok(ArgumentsRequest::Version);
        }

        let mut maybe_arg = Some(arg);
        let _ = !try_parse_general_argument(&mut result, &mut maybe_arg)?
            && !try_parse_listen_argument(&mut result, &mut maybe_arg, || args.next())?
            && !try_parse_tunnel_argument(&mut result, &mut maybe_arg, || args.next())?;

        if let Some(arg) = maybe_arg {
            return Err(ArgumentsError::UnknownArgument(arg));
        }
    }

    let result = result.complete()?;
    Ok(ArgumentsRequest::Run(result))
}

#[cfg(test)]
mod tests {
    use std::{net::SocketAddr, time::Duration};

    use tunnel_relay::config::TunnelConfig;

    use super::{parse_arguments, ArgumentsError, ArgumentsRequest, StartupArguments};
    use crate::args::{NumberErrorType, SocketErrorType};

    fn parse(args: &[&str]) -> Result<ArgumentsRequest, ArgumentsError> {
        parse_arguments(std::iter::once("relay").chain(args.iter().copied()).map(String::from))
    }

    #[test]
    fn test_defaults() {
        let expected = StartupArguments::new(
            false,
            false,
            vec!["[::]:1080".parse().unwrap(), "0.0.0.0:1080".parse().unwrap()],
            TunnelConfig::default(),
        );

        assert_eq!(parse(&[]), Ok(ArgumentsRequest::Run(expected)));
    }

    #[test]
    fn test_help_and_version() {
        assert_eq!(parse(&["-h"]), Ok(ArgumentsRequest::Help));
        assert_eq!(parse(&["--listen", "127.0.0.1", "--HELP"]), Ok(ArgumentsRequest::Help));
        assert_eq!(parse(&["-V"]), Ok(ArgumentsRequest::Version));
        assert_eq!(parse(&["--version", "--bogus"]), Ok(ArgumentsRequest::Version));
    }

    #[test]
    fn test_full() {
        let args = ["-v", "-l", "127.0.0.1:9000", "--listen", "[::1]:9001", "-t", "15", "--buffer-size", "2048", "-l", "127.0.0.1:9000"];
        let listen: Vec<SocketAddr> = vec!["127.0.0.1:9000".parse().unwrap(), "[::1]:9001".parse().unwrap()];
        let config = TunnelConfig::new().with_idle_timeout(Duration::from_secs(15)).with_read_size(2048);

        assert_eq!(parse(&args), Ok(ArgumentsRequest::Run(StartupArguments::new(true, false, listen, config))));
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse(&["--bogus"]), Err(ArgumentsError::UnknownArgument("--bogus".to_string())));
        assert_eq!(parse(&["-v", "-s"]), Err(ArgumentsError::VerboseAndSilent));
        assert_eq!(parse(&["-l"]), Err(ArgumentsError::ListenError(SocketErrorType::UnexpectedEnd("-l".to_string()))));
        assert_eq!(
            parse(&["-t", "soon"]),
            Err(ArgumentsError::IdleTimeout(NumberErrorType::InvalidValue("-t".to_string(), "soon".to_string())))
        );
        assert_eq!(parse(&["-b"]), Err(ArgumentsError::BufferSize(NumberErrorType::UnexpectedEnd("-b".to_string()))));
    }
}
