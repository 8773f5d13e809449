//! Argument parsing (spec.md §6).
//!
//! Four positional arguments, in order: source host, source service,
//! destination host, destination service. Anything else is a usage error.

use std::fmt;

pub struct Args {
    pub source_host: String,
    pub source_service: String,
    pub dest_host: String,
    pub dest_service: String,
}

pub struct UsageError {
    program: String,
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "usage: {} <source-host> <source-service> <dest-host> <dest-service>",
            self.program
        )
    }
}

/// Parses `argv` (including the program name at index 0).
pub fn parse(argv: &[String]) -> Result<Args, UsageError> {
    let program = argv.first().cloned().unwrap_or_else(|| "tcpbridge".to_string());

    if argv.len() != 5 {
        return Err(UsageError { program });
    }

    Ok(Args {
        source_host: argv[1].clone(),
        source_service: argv[2].clone(),
        dest_host: argv[3].clone(),
        dest_service: argv[4].clone(),
    })
}
