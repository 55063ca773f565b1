use {
    clap::Parser,
    sealdrop::{cli::Cli, config::Config, is_interrupted, run, setup_logger, term::clear_status},
    std::process::ExitCode,
    tracing::error,
};

/// Exit code of a process stopped by SIGINT.
const INTERRUPTED_EXIT_CODE: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match Config::load(cli.config.clone()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err:?}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = setup_logger(config.log_file.clone(), &config.log_filter) {
        eprintln!("Failed to set up logging: {err:?}");
        return ExitCode::FAILURE;
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            clear_status();
            if is_interrupted(&err) {
                error!("Interrupted.");
                ExitCode::from(INTERRUPTED_EXIT_CODE)
            } else {
                error!("{err:?}");
                ExitCode::FAILURE
            }
        }
    }
}
