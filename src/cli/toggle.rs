//! Toggle command: flips a rack's unit order against the inventory file.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::auth::Subject;
use crate::cli::common::{StoreArgs, EXIT_FAILURE, EXIT_REJECTED, EXIT_SUCCESS};
use crate::models::RackId;
use crate::services::{ToggleCoordinator, ToggleError};

/// Switch a rack between ascending and descending units, keeping the layout
#[derive(Debug, Clone, Args)]
pub struct ToggleArgs {
    /// Rack id
    #[arg(short, long)]
    pub rack: RackId,

    /// User to act as (checked against the configured grants)
    #[arg(short, long)]
    pub user: String,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Output the outcome as JSON
    #[arg(long)]
    pub json: bool,
}

impl ToggleArgs {
    /// Execute the toggle command
    pub fn execute(&self) -> Result<ExitCode> {
        let config = self.store.load_config()?;
        let store = self.store.open_store(&config)?;
        let grants = config.grant_table();
        let coordinator = ToggleCoordinator::new(&store, &grants);

        match coordinator.toggle(self.rack, &Subject::new(&self.user)) {
            Ok(outcome) => {
                if self.json {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                } else {
                    println!("{}", outcome.message());
                }
                Ok(ExitCode::from(EXIT_SUCCESS))
            }
            Err(ToggleError::Validation { violations, .. }) => {
                eprintln!("{}", crate::services::VALIDATION_FAILURE_MESSAGE);
                for violation in &violations {
                    eprintln!("  - {violation}");
                }
                Ok(ExitCode::from(EXIT_REJECTED))
            }
            Err(e) => {
                eprintln!("Error: {e}");
                Ok(ExitCode::from(EXIT_FAILURE))
            }
        }
    }
}
