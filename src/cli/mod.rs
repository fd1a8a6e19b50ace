//! CLI entry point: logging setup and the run command

mod logging;

pub use logging::{init_logging, LogLevel};

// Re-export Cli from config for convenience
pub use crate::config::Cli;

use crate::config::{apply_overrides, read_config, DistillSpec};
use crate::distill::{run, RunOutcome};
use crate::Result;

/// Merge the YAML spec (if any) with command-line overrides
pub fn resolve_spec(cli: &Cli) -> Result<DistillSpec> {
    let mut spec = match &cli.config {
        Some(path) => read_config(path)?,
        None => DistillSpec::default(),
    };
    apply_overrides(&mut spec, cli);
    Ok(spec)
}

/// Execute a parsed command line
pub fn run_command(cli: Cli) -> Result<()> {
    init_logging(LogLevel::from_flags(cli.verbose, cli.quiet));

    let spec = resolve_spec(&cli)?;
    tracing::debug!(?spec, "resolved spec");

    match run(&spec)? {
        RunOutcome::Trained(result) => tracing::info!(
            epochs = result.history.len(),
            best_val_loss = result.best_val_loss,
            output_dir = %result.output_dir.display(),
            "training complete"
        ),
        RunOutcome::Evaluated(stats) => tracing::info!(
            acc1 = stats.acc1,
            acc5 = stats.acc5,
            loss = stats.loss,
            "evaluation complete"
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_args;
    use std::io::Write;

    #[test]
    fn test_cli_overrides_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "epochs: 5\nbatch_size: 8").unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let cli = parse_args(["blockdistill", "--config", &path, "--epochs", "7"]).unwrap();
        let spec = resolve_spec(&cli).unwrap();
        assert_eq!(spec.epochs, 7);
        assert_eq!(spec.batch_size, 8);
    }

    #[test]
    fn test_missing_mode_is_an_error() {
        let cli = parse_args(["blockdistill", "-q"]).unwrap();
        let err = run_command(cli).unwrap_err();
        assert!(err.to_string().contains("running mode"));
    }
}
