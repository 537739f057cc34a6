//! Command-line interface

use clap::Parser;
use std::path::PathBuf;

/// flashcert - flash device IO certification
#[derive(Parser, Debug)]
#[command(name = "flashcert")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Extra "key: value" settings applied after the file
    #[arg(value_name = "OVERRIDE")]
    pub overrides: Vec<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
