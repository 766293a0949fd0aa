//! Native addon relocation, exposed through bundler-style hooks.
//!
//! A build goes `build_start` -> (`resolve_id` | `transform` | `load`)* ->
//! `build_end`. All state lives in a [`BuildState`] created by `build_start`
//! and dropped by `build_end`.

pub mod candidates;
pub mod config;
pub mod exporter;
pub mod idioms;
pub mod materialize;
pub mod module_root;
pub mod patch;
pub mod pre_gyp;
pub mod registry;
pub mod rewrite;
pub mod state;
pub mod utils;

use {
    anyhow::{Context, Result, anyhow},
    config::Config,
    idioms::{Detector, Idiom, IdiomMatch},
    patch::SourceMap,
    registry::VIRTUAL_PREFIX,
    rewrite::Resolved,
    state::{BuildState, Warning, WarningKind},
    std::{
        env,
        fs,
        path::{Path, PathBuf},
    },
    tracing::debug,
    utils::{
        NATIVE_EXTENSIONS,
        absolutize,
        has_native_extension,
        strip_plugin_prefix,
        to_slash,
        with_suffix,
    },
};

/// Result of the transform hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutput {
    /// No idiom was rewritten; the original text stands.
    Unchanged,
    Changed { code: String, map: Option<SourceMap> },
}

#[derive(Debug)]
pub struct NativesPlugin {
    config: Config,
    state: Option<BuildState>,
}

impl NativesPlugin {
    pub const NAME: &'static str = "native-relocator";

    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// State of the running build, if one was started.
    pub fn state(&self) -> Option<&BuildState> {
        self.state.as_ref()
    }

    /// Create the copy destination and start from an empty registry.
    pub fn build_start(&mut self) -> Result<()> {
        fs::create_dir_all(&self.config.copy_to).with_context(|| {
            format!(
                "failed to create copy destination {}",
                self.config.copy_to.display()
            )
        })?;
        self.state = Some(BuildState::new());
        Ok(())
    }

    /// Discard the build state, handing back the warnings it recorded.
    pub fn build_end(&mut self) -> Vec<Warning> {
        self.state
            .take()
            .map(BuildState::into_warnings)
            .unwrap_or_default()
    }

    /// Claim virtual ids and imports of native binaries.
    pub fn resolve_id(&mut self, importee: &str, importer: Option<&str>) -> Result<Option<String>> {
        if importee.starts_with(VIRTUAL_PREFIX) {
            return Ok(Some(importee.to_string()));
        }

        let importee = strip_plugin_prefix(importee);
        let base = match importer.map(strip_plugin_prefix) {
            Some(importer) => Path::new(importer)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            None => env::current_dir().unwrap_or_default(),
        };
        let resolved = absolutize(&base.join(importee));

        let native = if has_native_extension(importee) {
            Some(resolved)
        } else {
            NATIVE_EXTENSIONS
                .iter()
                .map(|ext| with_suffix(&resolved, ext))
                .find(|p| p.is_file())
        };
        let Some(native) = native else {
            return Ok(None);
        };

        let state = self.state.as_mut().ok_or_else(not_started)?;
        let identity = state.identity_for(&native, &self.config)?;
        Ok(Some(identity.virtual_id.clone()))
    }

    /// Stub code for a virtual id, or for a binary path already registered.
    pub fn load(&self, id: &str) -> Option<String> {
        if let Some(name) = id.strip_prefix(VIRTUAL_PREFIX) {
            return Some(exporter::export_stub(name, self.config.mode));
        }
        let identity = self.state.as_ref()?.registry().get(Path::new(id))?;
        Some(exporter::export_stub(&identity.output_name, self.config.mode))
    }

    /// Rewrite native binary idioms in one source unit.
    pub fn transform(&mut self, code: &str, id: &str) -> Result<TransformOutput> {
        // Virtual modules of any plugin have no file behind them.
        if id.starts_with('\0') {
            return Ok(TransformOutput::Unchanged);
        }
        let state = self.state.as_mut().ok_or_else(not_started)?;
        let config = &self.config;

        let detector = Detector::new(code, Path::new(id));
        let occurrences = detector.detect();
        if occurrences.is_empty() {
            return Ok(TransformOutput::Unchanged);
        }

        let mut resolved = Vec::with_capacity(occurrences.len());
        for occurrence in occurrences {
            let Some(path) = locate_binary(&occurrence, &detector, config, state) else {
                continue;
            };
            let identity = state.identity_for(&path, config)?;
            resolved.push(Resolved {
                specifier: config.specifier_for(&identity, detector.file()),
                occurrence,
                identity,
            });
        }

        let (patch, applied) = rewrite::rewrite(code, &resolved)?;
        if !applied {
            return Ok(TransformOutput::Unchanged);
        }
        debug!(file = id, rewritten = resolved.len(), "native references rewritten");

        let map = config
            .source_map
            .then(|| patch.source_map(&to_slash(detector.file())));
        Ok(TransformOutput::Changed {
            code: patch.apply(),
            map,
        })
    }
}

/// Absolute path of the binary an occurrence refers to, or `None` when the
/// occurrence must be left untouched.
fn locate_binary(
    occurrence: &IdiomMatch,
    detector: &Detector<'_>,
    config: &Config,
    state: &mut BuildState,
) -> Option<PathBuf> {
    match &occurrence.idiom {
        Idiom::GenericLookup { alias } => Some(candidates::resolve(
            alias,
            detector.module_root(),
            config,
        )),
        Idiom::DirectLiteral { path } => Some(path.clone()),
        Idiom::PreGypLookup(lookup) => match pre_gyp::find(&lookup.package_json, &config.target) {
            Ok(path) => Some(path),
            Err(e) => {
                state.warn(
                    WarningKind::UnresolvedLookup,
                    &lookup.package_json,
                    format!("pre-compiled binary lookup left untouched: {e:#}"),
                );
                None
            }
        },
    }
}

fn not_started() -> anyhow::Error {
    anyhow!("{} hook called before build_start", NativesPlugin::NAME)
}
