use {
    anyhow::{Context as _, Result},
    clap::Parser,
    fs_err::OpenOptions,
    sealdrop_sdk::signal::shutdown_signal,
    sealdrop_server::Config,
    std::{path::PathBuf, sync::Mutex},
    tokio::select,
    tracing::info,
    tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt},
};

/// Reference storage endpoint for sealdrop uploads.
#[derive(Debug, Parser)]
struct Cli {
    /// Path to the JSON5 config file.
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config: Config = json5::from_str(&fs_err::read_to_string(&cli.config)?)
        .with_context(|| format!("failed to parse config {:?}", cli.config))?;

    let file_layer = config
        .log_file
        .as_ref()
        .map(|path| -> Result<_> {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Ok(tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)))
        })
        .transpose()?;
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_filter)?)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    select! {
        result = sealdrop_server::run(config) => result,
        signal = shutdown_signal() => {
            info!("exiting on {}", signal?);
            Ok(())
        }
    }
}
