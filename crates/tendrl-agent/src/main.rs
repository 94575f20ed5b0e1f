#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::process;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tendrl_agent::cli::Args;
use tendrl_agent::{platform, Agent, Config};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_level = env::var("TENDRL_LOG")
        .map(|val| val.to_lowercase())
        .unwrap_or_else(|_| "info".to_string());
    let env_filter = format!("h2=off,hyper=off,reqwest=off,{log_level}");

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = match Config::resolve(args) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    #[cfg(unix)]
    info!(
        "unix host detected: using AF_UNIX socket at {}",
        config.socket_path.display()
    );
    #[cfg(windows)]
    info!(
        "windows host detected: using AF_UNIX socket at {}",
        config.socket_path.display()
    );

    if let Err(e) = platform::ensure_dirs(&config.state_dir) {
        error!("{e}");
        process::exit(1);
    }

    let agent = Agent::new(config);
    if let Err(e) = agent.run().await {
        error!("{e}");
        #[cfg(windows)]
        info!("hint: ensure Windows 10 1803+ and that the afunix driver is enabled (sc query afunix)");
        process::exit(1);
    }
}
