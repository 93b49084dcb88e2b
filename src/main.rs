//! linkdupe - content addressed file deduplication
//!
//! Entry point for the linkdupe CLI application.

use clap::Parser;
use linkdupe::{
    cli::Cli,
    error::{ExitCode, StructuredError},
    logging::init_logging,
};

fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();
    let json_errors = cli.json_errors;
    init_logging(cli.verbose, cli.quiet);

    match linkdupe::run_app(cli) {
        Ok(code) => std::process::exit(code.as_i32()),
        Err(err) => {
            let exit_code = ExitCode::GeneralError;

            if json_errors {
                let structured = StructuredError::new(&err, exit_code);
                if let Ok(json) = serde_json::to_string_pretty(&structured) {
                    eprintln!("{}", json);
                } else {
                    eprintln!("[{}] Error: {:#}", exit_code.code_prefix(), err);
                }
            } else {
                eprintln!("[{}] Error: {:#}", exit_code.code_prefix(), err);
            }

            std::process::exit(exit_code.as_i32());
        }
    }
}
