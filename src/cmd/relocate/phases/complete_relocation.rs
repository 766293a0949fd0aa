use {
    crate::cmd::relocate::{Relocator, phases::RelocationPhase},
    anyhow::Result,
    tap::Tap,
};

/// Marks the end of the relocation process.
pub struct CompleteRelocation {
    pub processed: usize,
    pub stubs: usize,
}

impl RelocationPhase for CompleteRelocation {}

impl<'a> Relocator<'a, CompleteRelocation> {
    pub fn complete_relocation(mut self) -> Result<()> {
        if let Some(state) = self.ctx.plugin.state() {
            let identities = state
                .registry()
                .iter()
                .collect::<Vec<_>>()
                .tap_mut(|ids| ids.sort_by(|a, b| a.output_name.cmp(&b.output_name)));
            for identity in identities {
                println!(
                    "  {} -> {}",
                    identity.source_path.display(),
                    identity.output_name
                );
            }
        }

        let warnings = self.ctx.plugin.build_end();
        for warning in &warnings {
            println!("warning: {warning}");
        }

        println!(
            "Relocation completed: {} of {} files rewritten into {:?}, {} stubs, {} warnings",
            self.ctx.rewritten,
            self.state.processed,
            self.ctx.out_root,
            self.state.stubs,
            warnings.len()
        );

        Ok(())
    }
}
