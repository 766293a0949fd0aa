use {
    crate::cmd::relocate::{
        Relocator,
        phases::{self, RelocationPhase},
    },
    anyhow::{Context, Result},
    native_relocator::TransformOutput,
    std::{fs, path::Path},
};

/// Runs every collected source file through the transform hook and writes
/// the result into the output tree.
#[derive(Debug)]
pub struct TransformSources;

impl RelocationPhase for TransformSources {}

impl<'a> Relocator<'a, TransformSources> {
    pub fn transform_sources(mut self) -> Result<Relocator<'a, phases::EmitStubs>> {
        let sources = std::mem::take(&mut self.ctx.sources);
        for src in &sources {
            let dst = self.ctx.out_path(src)?;
            let code = fs::read_to_string(src)
                .context(format!("failed to read source file {}", src.display()))?;
            let id = src.display().to_string();

            let output = self
                .ctx
                .plugin
                .transform(&code, &id)
                .context(format!("failed to transform {id}"))?;

            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)
                    .context(format!("failed to create directory {}", parent.display()))?;
            }
            match output {
                TransformOutput::Unchanged => {
                    fs::write(&dst, &code)
                        .context(format!("failed to write {}", dst.display()))?;
                }
                TransformOutput::Changed { code, map } => {
                    write_changed(&dst, code, map.map(|m| m.to_json()).transpose()?)?;
                    self.ctx.rewritten += 1;
                    println!("  rewrote {}", dst.display());
                }
            }
        }

        Ok(Relocator {
            ctx: self.ctx,
            state: phases::EmitStubs {
                processed: sources.len(),
            },
        })
    }
}

fn write_changed(dst: &Path, mut code: String, map: Option<String>) -> Result<()> {
    if let Some(map) = map {
        let map_path = dst.with_extension(
            dst.extension()
                .map(|ext| format!("{}.map", ext.to_string_lossy()))
                .unwrap_or_else(|| "map".to_string()),
        );
        let map_name = map_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !code.ends_with('\n') {
            code.push('\n');
        }
        code.push_str(&format!("//# sourceMappingURL={map_name}\n"));
        fs::write(&map_path, map).context(format!("failed to write {}", map_path.display()))?;
    }
    fs::write(dst, code).context(format!("failed to write {}", dst.display()))
}
