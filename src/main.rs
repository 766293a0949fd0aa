mod cmd;

use {
    crate::cmd::MainCmd,
    anyhow::{Context, Result},
    tracing_subscriber::EnvFilter,
};

fn main() -> Result<()> {
    install_tracing();

    let cmd: MainCmd = argh::from_env();
    cmd.run().context("failed to run subcommand")
}

fn install_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
