use {
    crate::cmd::{ConfigOverrides, SubCmd, load_config},
    anyhow::{Context, Result},
    argh::FromArgs,
    native_relocator::{DeliveryMode, NativesPlugin},
    std::path::PathBuf,
};

/// Resolve one import the way the bundler would, copying the binary it names.
#[derive(FromArgs)]
#[argh(subcommand, name = "resolve")]
pub struct ResolveSubCmd {
    #[argh(positional)]
    /// imported specifier, e.g. `./build/Release/addon.node`
    importee: String,

    #[argh(option, short = 'i')]
    /// file the import appears in
    importer: Option<String>,

    #[argh(option, short = 'c')]
    /// path to a `natives.toml` config file
    config: Option<PathBuf>,

    #[argh(option)]
    /// directory binaries are copied into
    copy_to: Option<PathBuf>,

    #[argh(option)]
    /// directory binaries are referenced from in the bundle
    dest_dir: Option<String>,

    #[argh(option, short = 'm')]
    /// delivery mode: plain, dlopen or esm
    mode: Option<DeliveryMode>,
}

impl SubCmd for ResolveSubCmd {
    fn run(&self) -> Result<()> {
        let config = load_config(ConfigOverrides {
            config: self.config.as_deref(),
            copy_to: self.copy_to.as_ref(),
            dest_dir: self.dest_dir.as_ref(),
            mode: self.mode,
            ..Default::default()
        })
        .context("failed to load configuration")?;

        let mut plugin = NativesPlugin::new(config);
        plugin.build_start()?;

        let Some(id) = plugin
            .resolve_id(&self.importee, self.importer.as_deref())
            .context(format!("failed to resolve {:?}", self.importee))?
        else {
            println!("{:?} is not a native binary import", self.importee);
            plugin.build_end();
            return Ok(());
        };

        println!("Resolved {:?} -> {id:?}", self.importee);
        if let Some(stub) = plugin.load(&id) {
            println!("{stub}");
        }
        for warning in plugin.build_end() {
            println!("warning: {warning}");
        }
        Ok(())
    }
}
