use {
    crate::cmd::relocate::{
        Relocator,
        phases::{self, RelocationPhase},
    },
    anyhow::{Context, Result},
    std::path::Path,
    walkdir::{DirEntry, WalkDir},
};

const SOURCE_EXTENSIONS: [&str; 3] = ["js", "cjs", "mjs"];

/// Starts the plugin build and collects the source files to process.
#[derive(Debug)]
pub struct StartBuild;

impl RelocationPhase for StartBuild {}

impl<'a> Relocator<'a, StartBuild> {
    pub fn start_build(mut self) -> Result<Relocator<'a, phases::TransformSources>> {
        self.ctx
            .plugin
            .build_start()
            .context("failed to start build")?;

        let out_root = self.ctx.out_root.clone();
        let mut sources = Vec::new();
        let walker = WalkDir::new(&self.ctx.src_root)
            .sort_by_file_name()
            .into_iter()
            // The output may live inside the source tree; never read it back.
            .filter_entry(|entry| entry.path() != out_root);
        for entry in walker {
            let entry = entry.context("failed to walk source directory")?;
            if is_source_file(&entry) {
                sources.push(entry.into_path());
            }
        }

        println!(
            "Relocating {} -> {} ({} source files)",
            self.ctx.src_root.display(),
            self.ctx.out_root.display(),
            sources.len()
        );
        self.ctx.sources = sources;

        Ok(Relocator {
            ctx: self.ctx,
            state: phases::TransformSources,
        })
    }
}

fn is_source_file(entry: &DirEntry) -> bool {
    entry.file_type().is_file() && has_source_extension(entry.path())
}

fn has_source_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}
