use {
    crate::natives::config::Config,
    std::path::{Path, PathBuf},
    tracing::debug,
};

/// Conventional install layouts, in probing order. Each segment is either a
/// placeholder name or a literal directory.
const LAYOUTS: [&[&str]; 4] = [
    &["module_root", "build", "bindings"],
    &["module_root", "build", "Debug", "bindings"],
    &["module_root", "build", "Release", "bindings"],
    &["module_root", "compiled", "version", "platform", "arch", "bindings"],
];

/// Expand every layout for the given binary alias.
pub fn candidates(alias: &str, module_root: &Path, config: &Config) -> Vec<PathBuf> {
    let target = &config.target;
    LAYOUTS
        .iter()
        .map(|parts| {
            let mut path = PathBuf::new();
            for part in parts.iter() {
                match *part {
                    "module_root" => path.push(module_root),
                    "compiled" => path.push(&config.compiled_dir),
                    "platform" => path.push(&target.platform),
                    "arch" => path.push(&target.arch),
                    "version" => path.push(&target.runtime_version),
                    "bindings" => path.push(alias),
                    literal => path.push(literal),
                }
            }
            path
        })
        .collect()
}

/// Pick the first candidate that exists, or the first candidate when none do.
pub fn resolve(alias: &str, module_root: &Path, config: &Config) -> PathBuf {
    let mut candidates = candidates(alias, module_root, config);
    match candidates.iter().position(|p| p.exists()) {
        Some(idx) => candidates.swap_remove(idx),
        None => {
            debug!(
                alias,
                root = %module_root.display(),
                "no candidate exists, using the first one"
            );
            candidates.swap_remove(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::fs, tempfile::TempDir};

    fn config() -> Config {
        let mut config = Config::default();
        config.compiled_dir = "compiled".to_string();
        config.target.platform = "linux".to_string();
        config.target.arch = "x64".to_string();
        config.target.runtime_version = "20.11.1".to_string();
        config
    }

    #[test]
    fn layouts_are_expanded_in_order() {
        let root = Path::new("/pkg");
        let expanded = candidates("addon.node", root, &config());
        assert_eq!(
            expanded,
            vec![
                PathBuf::from("/pkg/build/addon.node"),
                PathBuf::from("/pkg/build/Debug/addon.node"),
                PathBuf::from("/pkg/build/Release/addon.node"),
                PathBuf::from("/pkg/compiled/20.11.1/linux/x64/addon.node"),
            ]
        );
    }

    #[test]
    fn compiled_directory_override_is_used() {
        let mut config = config();
        config.compiled_dir = "prebuilds".to_string();
        let expanded = candidates("a.node", Path::new("/pkg"), &config);
        assert_eq!(
            expanded[3],
            PathBuf::from("/pkg/prebuilds/20.11.1/linux/x64/a.node")
        );
    }

    #[test]
    fn first_existing_candidate_wins() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("build/Release")).unwrap();
        fs::create_dir_all(tmp.path().join("compiled/20.11.1/linux/x64")).unwrap();
        fs::write(tmp.path().join("build/Release/addon.node"), b"r").unwrap();
        fs::write(tmp.path().join("compiled/20.11.1/linux/x64/addon.node"), b"c").unwrap();

        assert_eq!(
            resolve("addon.node", tmp.path(), &config()),
            tmp.path().join("build/Release/addon.node")
        );
    }

    #[test]
    fn missing_binary_defaults_to_first_candidate() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(
            resolve("addon.node", tmp.path(), &config()),
            tmp.path().join("build/addon.node")
        );
    }
}
