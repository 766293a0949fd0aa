use {
    anyhow::{Context, Result},
    native_relocator::{
        BinaryIdentity,
        Config,
        NativesPlugin,
        natives::utils::{absolutize, relative_specifier, with_suffix},
    },
    std::{
        fs,
        path::{Path, PathBuf},
    },
};

#[derive(Debug)]
pub struct RelocatorContext {
    /// Source tree root, in canonical form.
    pub src_root: PathBuf,

    /// Output tree root, in canonical form.
    pub out_root: PathBuf,

    /// Plugin instance driving the build.
    pub plugin: NativesPlugin,

    /// Source files to process, collected when the build starts.
    pub sources: Vec<PathBuf>,

    /// Number of files that had native references rewritten.
    pub rewritten: usize,
}

impl RelocatorContext {
    pub fn new(src: &Path, out: &Path, mut config: Config) -> Result<Self> {
        let src_root = src
            .canonicalize()
            .context("source directory is not found")?;

        fs::create_dir_all(out).context("failed to create output directory")?;
        let out_root = out
            .canonicalize()
            .context("failed to canonicalize output directory")?;

        // Rewritten files load each binary through its stub module on disk.
        let (src, out) = (src_root.clone(), out_root.clone());
        config.specifier = Some(Box::new(move |identity: &BinaryIdentity, importer: &Path| {
            let out_file = match importer.strip_prefix(&src) {
                Ok(rel) => out.join(rel),
                Err(_) => importer.to_path_buf(),
            };
            let dir = out_file.parent().unwrap_or(out.as_path());
            relative_specifier(dir, &stub_path(identity))
        }));

        Ok(Self {
            src_root,
            out_root,
            plugin: NativesPlugin::new(config),
            sources: Vec::new(),
            rewritten: 0,
        })
    }

    /// Output location of a source file.
    pub fn out_path(&self, src: &Path) -> Result<PathBuf> {
        let rel = src
            .strip_prefix(&self.src_root)
            .context("source file is outside of the source directory")?;
        Ok(self.out_root.join(rel))
    }
}

/// Stub module of a relocated binary, next to the copied binary:
/// `addon.node` is loaded through `addon.node.js`.
pub fn stub_path(identity: &BinaryIdentity) -> PathBuf {
    with_suffix(&absolutize(&identity.output_path), ".js")
}
