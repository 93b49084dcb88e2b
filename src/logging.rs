//! Log output for linkdupe, via the `log` facade and `env_logger`.
//!
//! The level is chosen in this order:
//!
//! 1. `RUST_LOG`, when set
//! 2. `--quiet`: errors only
//! 3. `-v`: debug, which shows every indexed file; `-vv`: trace
//! 4. info, which shows pool entries created and files linked
//!
//! Debug builds prefix each line with a timestamp, and with the module path
//! in verbose mode. Release builds print `LEVEL message`.
//!
//! ```rust,no_run
//! use linkdupe::logging::init_logging;
//!
//! init_logging(1, false);
//! log::debug!("Indexing /data/a.txt");
//! ```

use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::io::Write;

/// Install the global logger for the given CLI verbosity.
///
/// * `verbose` - `-v` count (0 info, 1 debug, 2+ trace)
/// * `quiet` - errors only, unless `RUST_LOG` says otherwise
///
/// Only the first call installs a logger; later calls are ignored.
pub fn init_logging(verbose: u8, quiet: bool) {
    let from_env = env::var("RUST_LOG").ok();

    let mut builder = Builder::new();
    match &from_env {
        Some(_) => {
            builder.parse_default_env();
        }
        None => {
            builder.filter_level(determine_level(verbose, quiet));
        }
    }
    configure_format(&mut builder, verbose);

    if builder.try_init().is_err() {
        return;
    }
    match from_env {
        Some(filter) => log::debug!("Log filter taken from RUST_LOG={filter}"),
        None => log::debug!("Log level: {:?}", determine_level(verbose, quiet)),
    }
}

fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn configure_format(builder: &mut Builder, verbose: u8) {
    #[cfg(debug_assertions)]
    {
        builder.format(move |buf, record| {
            let level = record.level();
            let style = buf.default_level_style(level);
            let timestamp = buf.timestamp_seconds();
            if verbose >= 1 {
                writeln!(
                    buf,
                    "{timestamp} {style}{level:<5}{style:#} [{}] {}",
                    record.module_path().unwrap_or("unknown"),
                    record.args()
                )
            } else {
                writeln!(buf, "{timestamp} {style}{level:<5}{style:#} {}", record.args())
            }
        });
    }

    #[cfg(not(debug_assertions))]
    {
        let _ = verbose;
        builder.format(|buf, record| {
            let level = record.level();
            let style = buf.default_level_style(level);
            writeln!(buf, "{style}{level:<5}{style:#} {}", record.args())
        });
    }
}
