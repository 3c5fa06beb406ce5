pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
pub mod logging;
pub mod memory;
pub mod probe;
pub mod report;

use cli::Cli;
use error::SetupError;
use inference::OllamaClient;
use memory::MemoryMonitor;
use probe::{ProbeController, ProbeRun, TrialRunner};

/// Run one probe as described by the command line.
///
/// Setup problems (bad arguments, unusable log directory, non-local host)
/// are returned as errors. Once probing starts every outcome, including a
/// backend failure, is a completed run.
pub fn run(cli: &Cli) -> Result<ProbeRun, SetupError> {
    let config = cli.to_probe_config()?;
    let client = OllamaClient::new(&cli.base_url())?;

    let log_path = logging::init_logging(&cli.logs_dir(), &config.model)?;
    tracing::info!("{} v{} starting", config::APP_NAME, config::APP_VERSION);
    tracing::info!("Log file created: {}", log_path.display());
    tracing::debug!(base_url = client.base_url(), "Using Ollama endpoint");

    let monitor = MemoryMonitor::new();
    let runner = TrialRunner::new(&client, &monitor);
    let run = ProbeController::new(&config, runner).run();

    report::log_summary(&run.outcome, &config);

    if !cli.no_report {
        let report_path = log_path.with_extension("json");
        match report::write_json_report(&report_path, &config, &run) {
            Ok(()) => tracing::info!("Run report written to: {}", report_path.display()),
            Err(e) => tracing::warn!("Could not write run report {}: {e}", report_path.display()),
        }
    }

    println!("\nResults have been saved to: {}", log_path.display());
    Ok(run)
}
