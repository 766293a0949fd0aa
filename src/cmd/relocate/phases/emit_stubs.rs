use {
    crate::cmd::relocate::{
        Relocator,
        context::stub_path,
        phases::{self, RelocationPhase},
    },
    anyhow::{Context, Result},
    std::fs,
};

/// Serves every registered identity through the load hook and writes the
/// stub next to the copied binary.
pub struct EmitStubs {
    pub processed: usize,
}

impl RelocationPhase for EmitStubs {}

impl<'a> Relocator<'a, EmitStubs> {
    pub fn emit_stubs(self) -> Result<Relocator<'a, phases::CompleteRelocation>> {
        let stubs: Vec<_> = self
            .ctx
            .plugin
            .state()
            .into_iter()
            .flat_map(|state| state.registry().iter())
            .filter_map(|identity| {
                let stub = self.ctx.plugin.load(&identity.virtual_id)?;
                Some((stub_path(identity), stub))
            })
            .collect();

        for (path, stub) in &stubs {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .context(format!("failed to create directory {}", parent.display()))?;
            }
            fs::write(path, stub).context(format!("failed to write stub {}", path.display()))?;
        }

        Ok(Relocator {
            ctx: self.ctx,
            state: phases::CompleteRelocation {
                processed: self.state.processed,
                stubs: stubs.len(),
            },
        })
    }
}
