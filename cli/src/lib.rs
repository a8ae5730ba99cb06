//! Blackout application: configuration, collaborators and orchestration.

pub mod audit;
pub mod batch;
pub mod cli;
pub mod config;
pub mod detect;
pub mod pipeline;
pub mod stage;

#[cfg(test)]
mod testing;

use audit::RecordLog;
use batch::{BatchOrchestrator, BatchSummary};
use blackout_core::DocumentParser;
use blackout_pdf::LopdfParser;
use cli::Cli;
use config::load_config;
use detect::LlmDetector;
use pipeline::FileProcessor;
use stage::LocalStage;
use std::sync::Arc;

/// Loads configuration, wires the collaborators and runs the batch.
///
/// Errors are startup or record-log failures; per-file failures are in the
/// returned summary and the record log.
pub fn run(cli: &Cli) -> anyhow::Result<BatchSummary> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(root) = &cli.stage_root {
        config.stage.root = root.clone();
    }
    if let Some(path) = &cli.log_path {
        config.log.path = path.clone();
    }

    let stage = LocalStage::new(&config.stage.root)?;
    let detector = LlmDetector::new(config.detector.clone())?;
    let log = RecordLog::new(&config.log.path);
    let parser: Arc<dyn DocumentParser> = Arc::new(LopdfParser);
    log::info!(
        "[Batch] stage {}, parser {}, model {}, records {}",
        stage.root().display(),
        parser.name(),
        detector.config().model,
        log.path().display()
    );

    let processor = FileProcessor::new(parser, &detector, &stage, &config);
    let orchestrator = BatchOrchestrator::new(processor, &stage, &log, &config);
    Ok(orchestrator.run(&cli.request())?)
}
