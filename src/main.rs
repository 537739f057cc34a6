//! flashcert CLI entry point

use flashcert::config::cli::Cli;
use flashcert::config::Config;
use flashcert::coordinator;
use log::error;

fn main() {
    init_logging();

    println!(
        "flashcert {} - flash device IO certification\n",
        env!("CARGO_PKG_VERSION")
    );

    let cli = Cli::parse_args();

    if let Err(err) = run(&cli) {
        error!("{:#}", err);
        std::process::exit(-1);
    }
}

fn run(cli: &Cli) -> flashcert::Result<()> {
    let cfg = Config::load(&cli.config, &cli.overrides)?;
    cfg.echo();
    coordinator::run(cfg)
}

/// Diagnostics share stdout with the report stream; errors carry the
/// `ERROR:` prefix.
fn init_logging() {
    use env_logger::{Builder, Env, Target};
    use log::Level;
    use std::io::Write;

    Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stdout)
        .format(|buf, record| match record.level() {
            Level::Error => writeln!(buf, "ERROR: {}", record.args()),
            Level::Warn => writeln!(buf, "WARNING: {}", record.args()),
            _ => writeln!(buf, "{}", record.args()),
        })
        .init();
}
