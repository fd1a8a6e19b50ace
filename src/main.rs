//! blockdistill CLI
//!
//! # Usage
//!
//! ```bash
//! # Distill block 1 of DeiT-Tiny on CIFAR-100
//! blockdistill --train --replace 1 --d-weight deit_tiny_patch16_224.safetensors \
//!     --data-path data/cifar-100-binary
//!
//! # Same, from a YAML spec with overrides
//! blockdistill --config distill.yaml --epochs 10 --lr 0.001
//!
//! # Evaluate a trained student
//! blockdistill --eval --replace 1 --eval-model output/2024-01-01-12-00/best.safetensors
//! ```

use blockdistill::cli::{run_command, Cli};
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
