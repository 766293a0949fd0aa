use {
    crate::natives::{
        config::{Config, NameOverride},
        utils::absolutize,
    },
    std::{
        collections::{HashMap, HashSet},
        path::{Path, PathBuf},
        rc::Rc,
    },
};

/// Prefix marking ids owned by this plugin.
pub const VIRTUAL_PREFIX: &str = "\0natives:";

/// Identity of one relocated binary. Immutable once created.
#[derive(Debug, PartialEq, Eq)]
pub struct BinaryIdentity {
    /// Absolute path the binary was discovered at.
    pub source_path: PathBuf,
    /// Virtual module id, `VIRTUAL_PREFIX` + `output_name`.
    pub virtual_id: String,
    /// Module name the bundle loads the binary by.
    pub output_name: String,
    /// File name in the copy destination, unique across the build.
    pub output_basename: String,
    /// Where the binary is copied to.
    pub output_path: PathBuf,
}

/// Maps discovered binaries to their identities for the duration of one
/// build.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    by_path: HashMap<PathBuf, Rc<BinaryIdentity>>,
    basenames: HashSet<String>,
    /// Absolute form of every claimed output path.
    output_paths: HashSet<PathBuf>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source_path: &Path) -> Option<&Rc<BinaryIdentity>> {
        self.by_path.get(source_path)
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<BinaryIdentity>> {
        self.by_path.values()
    }

    /// Identity for `source_path`, creating it on first sight.
    ///
    /// The flag is `true` when the identity was just created, in which case
    /// the caller materializes it.
    pub fn identity_for(
        &mut self,
        source_path: &Path,
        config: &Config,
    ) -> (Rc<BinaryIdentity>, bool) {
        if let Some(identity) = self.by_path.get(source_path) {
            return (Rc::clone(identity), false);
        }

        let overridden = config
            .naming
            .as_ref()
            .and_then(|naming| naming(source_path));
        let identity = match overridden {
            Some(NameOverride::Explicit { name, copy_to }) => {
                self.explicit_identity(source_path, &name, &copy_to)
            }
            Some(NameOverride::Path(path)) => self.default_identity(source_path, &path, config),
            None => self.default_identity(source_path, source_path, config),
        };

        let identity = Rc::new(identity);
        self.basenames.insert(identity.output_basename.clone());
        self.output_paths.insert(absolutize(&identity.output_path));
        self.by_path
            .insert(source_path.to_path_buf(), Rc::clone(&identity));
        (identity, true)
    }

    /// First suffix round `n` for which both the basename and the output
    /// path are unclaimed: `addon.node`, then `addon_1.node`, `addon_2.node`,
    /// ...
    fn available(
        &self,
        basename: &str,
        output_path: impl Fn(usize) -> PathBuf,
    ) -> (String, PathBuf) {
        (0..)
            .map(|n| (suffixed(basename, n), output_path(n)))
            .find(|(basename, path)| {
                !self.basenames.contains(basename)
                    && !self.output_paths.contains(&absolutize(path))
            })
            .unwrap_or_else(|| (basename.to_string(), output_path(0)))
    }

    fn default_identity(
        &self,
        source_path: &Path,
        name_from: &Path,
        config: &Config,
    ) -> BinaryIdentity {
        let basename = name_from
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "native.node".to_string());
        let (basename, output_path) = self.available(&basename, |n| {
            config.copy_to.join(suffixed(&basename, n))
        });
        let output_name = config.rebase(&basename);
        BinaryIdentity {
            source_path: source_path.to_path_buf(),
            virtual_id: format!("{VIRTUAL_PREFIX}{output_name}"),
            output_path,
            output_name,
            output_basename: basename,
        }
    }

    /// Caller-chosen name and destination. A taken basename or destination is
    /// still suffixed, in both the name and the destination.
    fn explicit_identity(&self, source_path: &Path, name: &str, copy_to: &Path) -> BinaryIdentity {
        let (dir, basename) = match name.rfind(['/', '\\']) {
            Some(idx) => name.split_at(idx + 1),
            None => ("", name),
        };
        let file_name = copy_to
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| basename.to_string());
        let (unique, output_path) = self.available(basename, |n| match n {
            0 => copy_to.to_path_buf(),
            n => copy_to.with_file_name(suffixed(&file_name, n)),
        });
        let output_name = if unique == basename {
            name.replace('\\', "/")
        } else {
            format!("{dir}{unique}").replace('\\', "/")
        };
        BinaryIdentity {
            source_path: source_path.to_path_buf(),
            virtual_id: format!("{VIRTUAL_PREFIX}{output_name}"),
            output_name,
            output_basename: unique,
            output_path,
        }
    }
}

/// `addon.node` with suffix `n`: `addon_n.node`, or unchanged for `0`.
fn suffixed(basename: &str, n: usize) -> String {
    if n == 0 {
        return basename.to_string();
    }
    match basename.rfind('.') {
        Some(idx) if idx > 0 => {
            let (stem, ext) = basename.split_at(idx);
            format!("{stem}_{n}{ext}")
        }
        _ => format!("{basename}_{n}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        let mut config = Config::default();
        config.copy_to = PathBuf::from("/out/natives");
        config.dest_dir = "./natives".to_string();
        config
    }

    #[test]
    fn repeated_lookups_return_the_same_identity() {
        let config = config();
        let mut registry = IdentityRegistry::new();
        let path = Path::new("/a/build/Release/addon.node");
        let (first, created) = registry.identity_for(path, &config);
        assert!(created);
        let (second, created) = registry.identity_for(path, &config);
        assert!(!created);
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);

        assert_eq!(first.output_name, "./natives/addon.node");
        assert_eq!(first.virtual_id, "\0natives:./natives/addon.node");
        assert_eq!(first.output_path, PathBuf::from("/out/natives/addon.node"));
    }

    #[test]
    fn colliding_basenames_get_numeric_suffixes() {
        let config = config();
        let mut registry = IdentityRegistry::new();
        let names: Vec<_> = ["/a/addon.node", "/b/addon.node", "/c/addon.node", "/d/noext"]
            .iter()
            .map(|p| registry.identity_for(Path::new(p), &config).0)
            .map(|identity| identity.output_basename.clone())
            .collect();
        assert_eq!(names, ["addon.node", "addon_1.node", "addon_2.node", "noext"]);

        let ids: HashSet<_> = registry.iter().map(|i| i.virtual_id.clone()).collect();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn naming_override_replaces_default_mapping() {
        let mut config = config();
        config.naming = Some(Box::new(|path: &Path| match path.to_str()? {
            "/a/addon.node" => Some(NameOverride::Path(PathBuf::from("sqlite.node"))),
            "/b/addon.node" | "/c/addon.node" => Some(NameOverride::Explicit {
                name: "lib/fast.node".to_string(),
                copy_to: PathBuf::from("/elsewhere/fast.node"),
            }),
            _ => None,
        }));
        let mut registry = IdentityRegistry::new();

        let renamed = registry.identity_for(Path::new("/a/addon.node"), &config).0;
        assert_eq!(renamed.output_name, "./natives/sqlite.node");

        let explicit = registry.identity_for(Path::new("/b/addon.node"), &config).0;
        assert_eq!(explicit.output_name, "lib/fast.node");
        assert_eq!(explicit.output_path, PathBuf::from("/elsewhere/fast.node"));

        let suffixed = registry.identity_for(Path::new("/c/addon.node"), &config).0;
        assert_eq!(suffixed.output_name, "lib/fast_1.node");
        assert_eq!(suffixed.output_path, PathBuf::from("/elsewhere/fast_1.node"));
    }

    #[test]
    fn explicit_destination_is_not_shared_with_default_mapping() {
        let mut config = config();
        config.naming = Some(Box::new(|path: &Path| {
            (path == Path::new("/a/a.node")).then(|| NameOverride::Explicit {
                name: "./a.node".to_string(),
                copy_to: PathBuf::from("/out/natives/x.node"),
            })
        }));
        let mut registry = IdentityRegistry::new();

        let explicit = registry.identity_for(Path::new("/a/a.node"), &config).0;
        let defaulted = registry.identity_for(Path::new("/b/x.node"), &config).0;
        assert_eq!(explicit.output_path, PathBuf::from("/out/natives/x.node"));
        assert_eq!(defaulted.output_basename, "x_1.node");
        assert_eq!(defaulted.output_path, PathBuf::from("/out/natives/x_1.node"));
        assert_eq!(defaulted.output_name, "./natives/x_1.node");

        // And the other way around: an explicit destination already claimed
        // by a default mapping is suffixed.
        config.naming = Some(Box::new(|path: &Path| {
            (path == Path::new("/c/c.node")).then(|| NameOverride::Explicit {
                name: "lib/c.node".to_string(),
                copy_to: PathBuf::from("/out/natives/x.node"),
            })
        }));
        let moved = registry.identity_for(Path::new("/c/c.node"), &config).0;
        assert_eq!(moved.output_name, "lib/c_2.node");
        assert_eq!(moved.output_path, PathBuf::from("/out/natives/x_2.node"));

        let paths: HashSet<_> = registry.iter().map(|i| i.output_path.clone()).collect();
        assert_eq!(paths.len(), 3);
    }
}
