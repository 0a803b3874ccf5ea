//! meterflow CLI entry point.

use meterflow_lib::cli::{self, Cli};
use meterflow_lib::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli::execute(cli).await
}
