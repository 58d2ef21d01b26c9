use std::net::SocketAddr;

use tunnel_relay::config::TunnelConfig;

mod addresses;
mod numbers;
mod parser;

pub use addresses::*;
pub use numbers::*;
pub use parser::*;

/// The default port to listen on for SOCKS5 clients.
pub const DEFAULT_PORT: u16 = 1080;

/// Gets a small string with this program's name and version.
pub fn get_version_string() -> String {
    format!(
        concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"), " ({} {})"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Gets a string with this program's help documentation.
pub fn get_help_string() -> &'static str {
    concat!(
        "Usage: relay [options...]\n",
        "\n",
        "Runs a SOCKS5 proxy (CONNECT, no authentication) relaying each client to its target.\n",
        "\n",
        "Options:\n",
        "  -h, --help                     Display this help menu and exit\n",
        "  -V, --version                  Display the version number and exit\n",
        "  -v, --verbose                  Display additional information while running\n",
        "  -s, --silent                   Only display warnings and errors\n",
        "  -l, --listen <address>         Listen for clients on this address (default [::]:1080 and 0.0.0.0:1080)\n",
        "  -t, --idle-timeout <seconds>   Close a tunnel whose pending operation exceeds this time (default 60)\n",
        "  -b, --buffer-size <bytes>      The size requested for each read (default 65536)\n",
        "\n",
        "The RUST_LOG environment variable overrides the log level selected with -v or -s.",
    )
}

/// The result of parsing the program's arguments.
#[derive(Debug, PartialEq)]
pub enum ArgumentsRequest {
    /// Print the help menu to stdout and exit.
    Help,

    /// Print this program's version to stdout and exit.
    Version,

    /// Run with the provided arguments.
    Run(StartupArguments),
}

/// Specifies the information on how the program should run.
#[derive(Debug, PartialEq)]
pub struct StartupArguments {
    /// Whether to log additional information.
    pub verbose: bool,

    /// Whether to only log warnings and errors.
    pub silent: bool,

    /// The addresses to listen on for incoming clients.
    pub listen_addresses: Vec<SocketAddr>,

    /// The settings each tunnel is created with.
    pub tunnel_config: TunnelConfig,
}

impl StartupArguments {
    pub const fn new(verbose: bool, silent: bool, listen_addresses: Vec<SocketAddr>, tunnel_config: TunnelConfig) -> Self {
        Self {
            verbose,
            silent,
            listen_addresses,
            tunnel_config,
        }
    }
}
