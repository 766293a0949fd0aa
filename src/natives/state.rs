use {
    crate::natives::{
        config::Config,
        materialize::materialize,
        registry::{BinaryIdentity, IdentityRegistry},
    },
    anyhow::Result,
    std::{
        fmt,
        path::{Path, PathBuf},
        rc::Rc,
    },
    tracing::warn,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// The binary did not exist when it was due to be copied.
    MissingBinary,
    /// A pre-compiled binary lookup was recognized but could not be resolved.
    UnresolvedLookup,
}

/// Non-fatal diagnostic recorded during a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.path.display())
    }
}

/// State of one build, from `build_start` to `build_end`.
#[derive(Debug, Default)]
pub struct BuildState {
    registry: IdentityRegistry,
    warnings: Vec<Warning>,
}

impl BuildState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }

    /// Identity for `source_path`. A newly created identity is materialized
    /// before it is returned.
    pub fn identity_for(
        &mut self,
        source_path: &Path,
        config: &Config,
    ) -> Result<Rc<BinaryIdentity>> {
        let (identity, created) = self.registry.identity_for(source_path, config);
        if created {
            materialize(&identity, config, self)?;
        }
        Ok(identity)
    }

    pub fn warn(&mut self, kind: WarningKind, path: &Path, message: impl Into<String>) {
        let warning = Warning {
            kind,
            path: path.to_path_buf(),
            message: message.into(),
        };
        warn!("{warning}");
        self.warnings.push(warning);
    }
}
