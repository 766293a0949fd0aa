mod context;
mod phases;

use {
    crate::cmd::{ConfigOverrides, SubCmd, load_config, relocate::context::RelocatorContext},
    anyhow::{Context, Result},
    argh::FromArgs,
    native_relocator::DeliveryMode,
    phases::RelocationPhase,
    std::path::PathBuf,
};

/// Rewrite native addon references in a source tree and copy the binaries.
#[derive(FromArgs)]
#[argh(subcommand, name = "relocate")]
pub struct RelocateSubCmd {
    #[argh(positional)]
    /// directory with the JavaScript sources to process
    src: PathBuf,

    #[argh(option, short = 'o')]
    /// output directory, mirrors the layout of the source directory
    out: PathBuf,

    #[argh(option, short = 'c')]
    /// path to a `natives.toml` config file
    config: Option<PathBuf>,

    #[argh(option)]
    /// directory binaries are copied into (default: `<out>/natives`)
    copy_to: Option<PathBuf>,

    #[argh(option)]
    /// directory binaries are referenced from, relative to their stubs
    dest_dir: Option<String>,

    #[argh(option, short = 'm')]
    /// delivery mode: plain, dlopen or esm
    mode: Option<DeliveryMode>,

    #[argh(option)]
    /// target platform, e.g. `linux`, `darwin`, `win32`
    platform: Option<String>,

    #[argh(option)]
    /// target architecture, e.g. `x64`, `arm64`
    arch: Option<String>,

    #[argh(switch)]
    /// do not write source maps
    no_source_map: bool,
}

impl SubCmd for RelocateSubCmd {
    fn run(&self) -> Result<()> {
        // Without a config file, binaries and their stubs land in
        // `<out>/natives`.
        let default_copy_to = self.out.join("natives");
        let standalone = self.config.is_none();
        let config = load_config(ConfigOverrides {
            config: self.config.as_deref(),
            copy_to: self
                .copy_to
                .as_ref()
                .or(standalone.then_some(&default_copy_to)),
            dest_dir: self.dest_dir.as_ref(),
            mode: self.mode,
            platform: self.platform.as_ref(),
            arch: self.arch.as_ref(),
            no_source_map: self.no_source_map,
        })
        .context("failed to load configuration")?;

        let mut ctx = RelocatorContext::new(&self.src, &self.out, config).context(format!(
            "failed to create relocation context for {}",
            self.src.display()
        ))?;

        Relocator::new(&mut ctx)?
            .start_build()?
            .transform_sources()?
            .emit_stubs()?
            .complete_relocation()
    }
}

#[derive(Debug)]
struct Relocator<'a, P: RelocationPhase = phases::StartBuild> {
    ctx: &'a mut RelocatorContext,
    state: P,
}

impl<'a> Relocator<'a> {
    fn new(ctx: &'a mut RelocatorContext) -> Result<Self> {
        Ok(Self {
            ctx,
            state: phases::StartBuild,
        })
    }
}
