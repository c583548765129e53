//! Span check command: reports out-of-range devices and reservation units.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::common::{StoreArgs, EXIT_FAILURE, EXIT_REJECTED, EXIT_SUCCESS};
use crate::models::RackId;
use crate::services::{SpanViolation, ToggleCoordinator, ToggleError};

/// Check a rack for spans outside its unit range, without changing anything
#[derive(Debug, Clone, Args)]
pub struct CheckArgs {
    /// Rack id
    #[arg(short, long)]
    pub rack: RackId,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct CheckResponse<'a> {
    rack_id: RackId,
    valid: bool,
    violations: &'a [SpanViolation],
}

impl CheckArgs {
    /// Execute the check command
    pub fn execute(&self) -> Result<ExitCode> {
        let config = self.store.load_config()?;
        let store = self.store.open_store(&config)?;
        let grants = config.grant_table();
        let coordinator = ToggleCoordinator::new(&store, &grants);

        let violations = match coordinator.check(self.rack) {
            Ok(violations) => violations,
            Err(e @ ToggleError::RackNotFound(_)) => {
                eprintln!("Error: {e}");
                return Ok(ExitCode::from(EXIT_FAILURE));
            }
            Err(e) => return Err(e.into()),
        };

        if self.json {
            let response = CheckResponse {
                rack_id: self.rack,
                valid: violations.is_empty(),
                violations: &violations,
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
        } else if violations.is_empty() {
            println!("Rack {}: all spans fit the rack's unit range", self.rack);
        } else {
            println!(
                "Rack {}: {} span(s) outside the rack's unit range",
                self.rack,
                violations.len()
            );
            for violation in &violations {
                println!("  - {violation}");
            }
        }

        Ok(ExitCode::from(if violations.is_empty() {
            EXIT_SUCCESS
        } else {
            EXIT_REJECTED
        }))
    }
}
