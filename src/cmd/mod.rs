pub mod relocate;
pub mod resolve;
pub mod stub;

use {
    anyhow::Result,
    argh::FromArgs,
    native_relocator::{Config, ConfigFile, DeliveryMode},
    relocate::RelocateSubCmd,
    resolve::ResolveSubCmd,
    std::path::{Path, PathBuf},
    stub::StubSubCmd,
};

pub trait SubCmd {
    fn run(&self) -> anyhow::Result<()>;
}

/// Relocate native addons referenced by JavaScript sources.
#[derive(FromArgs)]
#[argh(help_triggers("-h", "--help", "help"))]
pub struct MainCmd {
    #[argh(subcommand)]
    nested: Cmd,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Cmd {
    Relocate(RelocateSubCmd),
    Resolve(ResolveSubCmd),
    Stub(StubSubCmd),
}

impl MainCmd {
    /// Run the nested command.
    pub fn run(&self) -> Result<()> {
        match &self.nested {
            Cmd::Relocate(relocate_cmd) => relocate_cmd.run(),
            Cmd::Resolve(resolve_cmd) => resolve_cmd.run(),
            Cmd::Stub(stub_cmd) => stub_cmd.run(),
        }
    }
}

/// Command line values layered over the config file.
#[derive(Debug, Default)]
pub struct ConfigOverrides<'a> {
    pub config: Option<&'a Path>,
    pub copy_to: Option<&'a PathBuf>,
    pub dest_dir: Option<&'a String>,
    pub mode: Option<DeliveryMode>,
    pub platform: Option<&'a String>,
    pub arch: Option<&'a String>,
    pub no_source_map: bool,
}

/// Build the plugin configuration: defaults, then the config file (if any),
/// then command line overrides.
pub fn load_config(overrides: ConfigOverrides<'_>) -> Result<Config> {
    let mut config = match overrides.config {
        Some(path) => Config::from_file(ConfigFile::load(path)?),
        None => Config::default(),
    };

    if let Some(copy_to) = overrides.copy_to {
        config.copy_to = copy_to.clone();
    }
    if let Some(dest_dir) = overrides.dest_dir {
        config.dest_dir = dest_dir.clone();
    }
    if let Some(mode) = overrides.mode {
        config.mode = mode;
    }
    if let Some(platform) = overrides.platform {
        config.target.platform = platform.clone();
    }
    if let Some(arch) = overrides.arch {
        config.target.arch = arch.clone();
    }
    if overrides.no_source_map {
        config.source_map = false;
    }
    config.target.probe_runtime();

    Ok(config)
}
