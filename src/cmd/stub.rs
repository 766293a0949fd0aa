use {
    crate::cmd::SubCmd,
    anyhow::Result,
    argh::FromArgs,
    native_relocator::{DeliveryMode, natives::exporter::export_stub},
};

/// Print the stub module a relocated binary is loaded through.
#[derive(FromArgs)]
#[argh(subcommand, name = "stub")]
pub struct StubSubCmd {
    #[argh(positional)]
    /// module name of the relocated binary, e.g. `./natives/addon.node`
    name: String,

    #[argh(option, short = 'm', default = "DeliveryMode::Plain")]
    /// delivery mode: plain, dlopen or esm
    mode: DeliveryMode,
}

impl SubCmd for StubSubCmd {
    fn run(&self) -> Result<()> {
        print!("{}", export_stub(&self.name, self.mode));
        Ok(())
    }
}
