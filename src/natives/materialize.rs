use {
    crate::natives::{
        config::Config,
        registry::BinaryIdentity,
        state::{BuildState, WarningKind},
    },
    anyhow::{Context, Result},
    std::fs,
    tracing::debug,
};

/// Copy a newly created identity's binary to its output path.
///
/// The redirect hook, when configured, may substitute the source first. A
/// missing source is recorded as a warning and nothing is copied. Returns
/// whether a copy happened.
pub fn materialize(
    identity: &BinaryIdentity,
    config: &Config,
    state: &mut BuildState,
) -> Result<bool> {
    let mut source = identity.source_path.clone();
    let mut exists = source.is_file();
    if let Some(redirect) = &config.redirect {
        if let Some(substitute) = redirect(&source, exists) {
            debug!(
                from = %source.display(),
                to = %substitute.display(),
                "binary origin redirected"
            );
            exists = substitute.is_file();
            source = substitute;
        }
    }

    if !exists {
        state.warn(
            WarningKind::MissingBinary,
            &source,
            format!("native binary not found, {} was not copied", identity.output_basename),
        );
        return Ok(false);
    }

    if let Some(parent) = identity.output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    fs::copy(&source, &identity.output_path).with_context(|| {
        format!(
            "failed to copy {} to {}",
            source.display(),
            identity.output_path.display()
        )
    })?;
    debug!(from = %source.display(), to = %identity.output_path.display(), "binary copied");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::path::{Path, PathBuf},
        tempfile::TempDir,
    };

    fn config(tmp: &TempDir) -> Config {
        let mut config = Config::default();
        config.copy_to = tmp.path().join("out");
        config
    }

    #[test]
    fn first_sight_copies_bytes_once() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("pkg/build/Release/addon.node");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, b"\x7fELF-addon").unwrap();
        let config = config(&tmp);
        let mut state = BuildState::new();

        let identity = state.identity_for(&source, &config).unwrap();
        assert_eq!(fs::read(&identity.output_path).unwrap(), b"\x7fELF-addon");

        // A second request must not copy again.
        fs::write(&identity.output_path, b"marker").unwrap();
        state.identity_for(&source, &config).unwrap();
        assert_eq!(fs::read(&identity.output_path).unwrap(), b"marker");
        assert!(state.warnings().is_empty());
    }

    #[test]
    fn missing_binary_is_a_warning() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp);
        let mut state = BuildState::new();
        let source = tmp.path().join("pkg/build/gone.node");

        let identity = state.identity_for(&source, &config).unwrap();
        assert_eq!(identity.output_basename, "gone.node");
        assert!(!identity.output_path.exists());
        assert_eq!(state.warnings().len(), 1);
        assert_eq!(state.warnings()[0].kind, WarningKind::MissingBinary);
        assert_eq!(state.warnings()[0].path, source);
    }

    #[test]
    fn redirect_hook_substitutes_origin() {
        let tmp = TempDir::new().unwrap();
        let prebuilt = tmp.path().join("prebuilt/addon.node");
        fs::create_dir_all(prebuilt.parent().unwrap()).unwrap();
        fs::write(&prebuilt, b"prebuilt").unwrap();

        let mut config = config(&tmp);
        let substitute = prebuilt.clone();
        config.redirect = Some(Box::new(move |_path: &Path, exists: bool| {
            (!exists).then(|| substitute.clone())
        }));
        let mut state = BuildState::new();

        let identity = state
            .identity_for(&tmp.path().join("pkg/build/addon.node"), &config)
            .unwrap();
        assert_eq!(fs::read(&identity.output_path).unwrap(), b"prebuilt");
        assert_eq!(identity.source_path, tmp.path().join("pkg/build/addon.node"));

        // Redirecting to a path that doesn't exist counts as missing.
        config.redirect = Some(Box::new(|_: &Path, _: bool| {
            Some(PathBuf::from("/definitely/missing.node"))
        }));
        state
            .identity_for(&tmp.path().join("pkg/build/other.node"), &config)
            .unwrap();
        assert_eq!(state.warnings().len(), 1);
        assert_eq!(state.warnings()[0].path, PathBuf::from("/definitely/missing.node"));
    }
}
