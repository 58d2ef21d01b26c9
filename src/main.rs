use std::{env, io::Error, process::exit};

use args::{ArgumentsRequest, StartupArguments};
use tokio::task::LocalSet;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tunnel_relay::{
    socks::Socks5,
    tunnel::Tunnel,
    utils::{accept_from_any, bind_listeners},
};

mod args;

fn main() {
    let arguments = match args::parse_arguments(env::args()) {
        Err(err) => {
            eprintln!("{err}\n\nType 'relay --help' for a help menu");
            exit(1);
        }
        Ok(arguments) => arguments,
    };

    let startup_args = match arguments {
        ArgumentsRequest::Version => {
            println!("{}", args::get_version_string());
            return;
        }
        ArgumentsRequest::Help => {
            println!("{}", args::get_help_string());
            return;
        }
        ArgumentsRequest::Run(startup_args) => startup_args,
    };

    init_logging(&startup_args);

    let runtime_result = tokio::runtime::Builder::new_current_thread().enable_all().build();

    let result = match runtime_result {
        Ok(runtime) => LocalSet::new().block_on(&runtime, async_main(startup_args)),
        Err(err) => {
            eprintln!("Failed to start Tokio runtime: {err}");
            exit(1);
        }
    };

    if let Err(error) = result {
        error!(%error, "Program finished with error");
        exit(1);
    }
}

fn init_logging(startup_args: &StartupArguments) {
    let default_level = match (startup_args.verbose, startup_args.silent) {
        (true, _) => "debug",
        (_, true) => "warn",
        _ => "info",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn async_main(startup_args: StartupArguments) -> Result<(), Error> {
    debug!(?startup_args, "Startup arguments");

    let listeners = bind_listeners(&startup_args.listen_addresses).await?;
    for listener in &listeners {
        if let Ok(address) = listener.local_addr() {
            info!(%address, "Listening for SOCKS5 clients");
        }
    }

    let config = startup_args.tunnel_config;
    loop {
        let (index, result) = accept_from_any(&listeners).await;
        match result {
            Ok((stream, from)) => {
                debug!(%from, listener = index, "Accepted connection");
                tokio::task::spawn_local(async move {
                    let mut tunnel = Tunnel::initialize(stream, &config, Socks5::new(), |_| true);
                    tunnel.run().await;
                });
            }
            Err(error) => warn!(listener = index, %error, "Failed to accept connection"),
        }
    }
}
