//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`], [`validate`], or [`health`]. Each handler
//! lives in its own submodule.

pub mod health;
pub mod run;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::SplicegateError;

pub async fn dispatch(cli: Cli) -> Result<(), SplicegateError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Validate(ref args)) => validate::execute(args).await,
        Some(Commands::Health(args)) => health::execute(args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  splicegate v{version}: header-driven response enrichment proxy\n\n  \
         No command provided. To get started:\n\n    \
         splicegate run                    Start the proxy (auto-detects ./splicegate.yaml)\n    \
         splicegate run -c rules.yaml      Start with a specific config file\n    \
         splicegate validate rules.yaml    Check a config file\n    \
         splicegate --help                 See all commands and options\n"
    );
}
