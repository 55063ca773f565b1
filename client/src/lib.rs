pub mod cli;
pub mod config;
mod decrypt;
pub mod term;
mod upload;

use {
    crate::{
        cli::{Cli, Command},
        config::Config,
        decrypt::decrypt,
        term::TermLayer,
        upload::{Interrupted, upload},
    },
    anyhow::Result,
    fs_err::OpenOptions,
    sealdrop_sdk::{BucketEndpoint, HttpCatalog, NetworkFacade, TransferClient, UploadError},
    std::{path::PathBuf, sync::{Arc, Mutex}},
    tokio::task::block_in_place,
    tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Debug)]
pub struct Ctx {
    pub config: Config,
    pub facade: NetworkFacade,
    pub catalog: HttpCatalog,
}

impl Ctx {
    pub fn new(config: Config) -> Result<Self> {
        let transfer = TransferClient::new(config.connect_timeout)?;
        let resolver = BucketEndpoint::new(
            config.server_url.clone(),
            Some(config.access_token.clone()),
        );
        Ok(Self {
            facade: NetworkFacade::new(
                transfer,
                Arc::new(resolver),
                config.shared_secret.clone(),
                config.progress_weights()?,
            ),
            catalog: HttpCatalog::new(config.server_url.clone(), config.access_token.clone())?,
            config,
        })
    }
}

pub async fn run(cli: Cli, config: Config) -> Result<()> {
    let ctx = Ctx::new(config)?;
    match cli.command {
        Command::Upload { path, folder } => upload(&ctx, &path, folder).await,
        Command::Decrypt {
            encrypted,
            output,
            index,
            bucket,
        } => block_in_place(|| decrypt(&ctx, &encrypted, &output, index, bucket)),
    }
}

/// Whether the command stopped because the user interrupted it.
#[must_use]
pub fn is_interrupted(err: &anyhow::Error) -> bool {
    err.downcast_ref::<UploadError>()
        .is_some_and(UploadError::is_aborted)
        || err.downcast_ref::<Interrupted>().is_some()
}

pub fn setup_logger(log_file: Option<PathBuf>, log_filter: &str) -> Result<()> {
    let file_layer = log_file
        .map(|path| -> Result<_> {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Ok(tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)))
        })
        .transpose()?;
    tracing_subscriber::registry()
        .with(file_layer)
        .with(EnvFilter::try_new(log_filter)?)
        .with(TermLayer)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use {super::*, anyhow::Context as _};

    #[test]
    fn interrupted_errors() {
        let err = anyhow::Error::new(UploadError::Aborted).context("failed to upload");
        assert!(is_interrupted(&err));

        let err = anyhow::Error::new(UploadError::EmptySource);
        assert!(!is_interrupted(&err));

        let err = Err::<(), _>(UploadError::Aborted)
            .context("registering failed")
            .unwrap_err();
        assert!(is_interrupted(&err));

        assert!(is_interrupted(&anyhow::Error::new(Interrupted)));
    }
}
