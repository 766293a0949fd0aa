use {
    crate::natives::registry::BinaryIdentity,
    anyhow::{Context, Result, anyhow},
    serde::Deserialize,
    std::{
        collections::HashMap,
        env,
        fmt,
        fs,
        path::{Path, PathBuf},
        process,
        str::FromStr,
    },
    tracing::debug,
};

/// Environment variable overriding the `compiled` directory name used by the
/// per-platform candidate layout.
pub const COMPILED_DIR_ENV: &str = "NODE_BINDINGS_COMPILED_DIR";

/// Placeholder value for target fields that could not be determined.
pub const UNKNOWN: &str = "unknown";

/// How generated stub code loads a relocated binary at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// `export default require("<name>")`.
    #[default]
    Plain,
    /// Opens the binary through `process.dlopen`, once, and caches the handle.
    Dlopen,
    /// CommonJS loader synthesized inside an ES module via `createRequire`.
    #[serde(alias = "esm-shim")]
    Esm,
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "dlopen" => Ok(Self::Dlopen),
            "esm" | "esm-shim" => Ok(Self::Esm),
            other => Err(format!(
                "unknown delivery mode {other:?} (expected plain, dlopen or esm)"
            )),
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::Dlopen => "dlopen",
            Self::Esm => "esm",
        })
    }
}

/// Output naming chosen by the naming override for one binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameOverride {
    /// Derive the default mapping from this path's basename instead.
    Path(PathBuf),
    /// Use this module name and copy destination as is.
    Explicit { name: String, copy_to: PathBuf },
}

pub type NamingFn = Box<dyn Fn(&Path) -> Option<NameOverride>>;
pub type RedirectFn = Box<dyn Fn(&Path, bool) -> Option<PathBuf>>;
pub type SpecifierFn = Box<dyn Fn(&BinaryIdentity, &Path) -> String>;

/// Platform the bundle is packaged for.
///
/// Names follow the runtime's own conventions (`linux`, `darwin`, `win32`;
/// `x64`, `arm64`, `ia32`), since that's what install layouts are keyed by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub platform: String,
    pub arch: String,
    /// Runtime version, e.g. `20.11.1`.
    pub runtime_version: String,
    /// Module ABI label, e.g. `node-v115`.
    pub node_abi: String,
    pub libc: String,
}

impl Target {
    /// Target matching the running host. Runtime version and ABI stay
    /// [`UNKNOWN`] until [`Target::probe_runtime`] is called.
    pub fn host() -> Self {
        let platform = match env::consts::OS {
            "macos" => "darwin",
            "windows" => "win32",
            other => other,
        };
        let arch = match env::consts::ARCH {
            "x86_64" => "x64",
            "x86" => "ia32",
            "aarch64" => "arm64",
            "powerpc64" => "ppc64",
            other => other,
        };
        Self {
            platform: platform.to_string(),
            arch: arch.to_string(),
            runtime_version: UNKNOWN.to_string(),
            node_abi: UNKNOWN.to_string(),
            libc: if platform == "linux" { "glibc" } else { UNKNOWN }.to_string(),
        }
    }

    /// Fill the runtime version and module ABI from the installed runtime,
    /// where they are still unknown.
    pub fn probe_runtime(&mut self) {
        if self.runtime_version != UNKNOWN && self.node_abi != UNKNOWN {
            return;
        }
        let output = process::Command::new("node")
            .arg("-p")
            .arg("process.versions.node + ' ' + process.versions.modules")
            .output();
        let stdout = match output {
            Ok(output) if output.status.success() => output.stdout,
            _ => {
                debug!("runtime not available, version placeholders stay unknown");
                return;
            }
        };
        let stdout = String::from_utf8_lossy(&stdout);
        let mut parts = stdout.split_whitespace();
        if let (Some(version), Some(modules)) = (parts.next(), parts.next()) {
            if self.runtime_version == UNKNOWN {
                self.runtime_version = version.to_string();
            }
            if self.node_abi == UNKNOWN {
                self.node_abi = format!("node-v{modules}");
            }
        }
    }
}

/// Plugin configuration, supplied once at construction.
pub struct Config {
    /// Directory binaries are copied into.
    pub copy_to: PathBuf,
    /// Directory binaries are referenced from, as written in the bundle.
    pub dest_dir: String,
    pub mode: DeliveryMode,
    pub target: Target,
    /// Name of the `compiled` directory in the per-platform candidate layout.
    pub compiled_dir: String,
    /// Emit source maps for transformed units.
    pub source_map: bool,
    pub naming: Option<NamingFn>,
    pub redirect: Option<RedirectFn>,
    /// Module specifier rewritten code loads an identity by, given the
    /// importing file. The virtual id when unset.
    pub specifier: Option<SpecifierFn>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            copy_to: PathBuf::from("./"),
            dest_dir: "./".to_string(),
            mode: DeliveryMode::default(),
            target: Target::host(),
            compiled_dir: compiled_dir_from(env::var(COMPILED_DIR_ENV).ok()),
            source_map: true,
            naming: None,
            redirect: None,
            specifier: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("copy_to", &self.copy_to)
            .field("dest_dir", &self.dest_dir)
            .field("mode", &self.mode)
            .field("target", &self.target)
            .field("compiled_dir", &self.compiled_dir)
            .field("source_map", &self.source_map)
            .field("naming", &self.naming.is_some())
            .field("redirect", &self.redirect.is_some())
            .field("specifier", &self.specifier.is_some())
            .finish()
    }
}

impl Config {
    /// Module name of a basename as written in the bundle: `dest_dir` joined
    /// with the basename, forward slashes only.
    pub fn rebase(&self, basename: &str) -> String {
        let sep = if self.dest_dir.ends_with('/') || self.dest_dir.ends_with('\\') {
            ""
        } else {
            "/"
        };
        format!("{}{sep}{basename}", self.dest_dir).replace('\\', "/")
    }

    /// Specifier rewritten code in `importer` loads `identity` by.
    pub fn specifier_for(&self, identity: &BinaryIdentity, importer: &Path) -> String {
        match &self.specifier {
            Some(specifier) => specifier(identity, importer),
            None => identity.virtual_id.clone(),
        }
    }

    /// Build configuration from a parsed config file, on top of the defaults.
    pub fn from_file(file: ConfigFile) -> Self {
        let mut config = Self::default();
        if let Some(copy_to) = file.copy_to {
            config.copy_to = copy_to;
        }
        if let Some(dest_dir) = file.dest_dir {
            config.dest_dir = dest_dir;
        }
        if let Some(mode) = file.mode {
            config.mode = mode;
        }
        if let Some(source_map) = file.source_map {
            config.source_map = source_map;
        }
        if let Some(compiled_dir) = file.compiled_dir {
            config.compiled_dir = compiled_dir;
        }
        file.target.apply(&mut config.target);

        if !file.map.is_empty() {
            let map = file.map;
            config.naming = Some(Box::new(move |path: &Path| {
                map.get(path).map(|entry| match entry {
                    MapEntry::Name(name) => NameOverride::Path(PathBuf::from(name)),
                    MapEntry::Explicit { name, copy_to } => NameOverride::Explicit {
                        name: name.clone(),
                        copy_to: copy_to.clone(),
                    },
                })
            }));
        }
        if !file.redirect.is_empty() {
            let redirect = file.redirect;
            config.redirect = Some(Box::new(move |path: &Path, _exists: bool| {
                redirect.get(path).cloned()
            }));
        }
        config
    }
}

/// Name of the `compiled` directory, given the value of
/// [`COMPILED_DIR_ENV`]. Empty values fall back to `compiled`.
pub fn compiled_dir_from(value: Option<String>) -> String {
    value
        .filter(|dir| !dir.is_empty())
        .unwrap_or_else(|| "compiled".to_string())
}

/// On-disk form of [`Config`] (`natives.toml`).
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub copy_to: Option<PathBuf>,
    pub dest_dir: Option<String>,
    pub mode: Option<DeliveryMode>,
    pub source_map: Option<bool>,
    pub compiled_dir: Option<String>,
    pub target: TargetFile,
    /// Static naming overrides, keyed by absolute binary path.
    pub map: HashMap<PathBuf, MapEntry>,
    /// Origin redirects, keyed by absolute binary path.
    pub redirect: HashMap<PathBuf, PathBuf>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .map_err(|e| anyhow!("failed to parse config file {}: {e}", path.display()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetFile {
    pub platform: Option<String>,
    pub arch: Option<String>,
    pub runtime_version: Option<String>,
    pub node_abi: Option<String>,
    pub libc: Option<String>,
}

impl TargetFile {
    fn apply(self, target: &mut Target) {
        let fields = [
            (self.platform, &mut target.platform),
            (self.arch, &mut target.arch),
            (self.runtime_version, &mut target.runtime_version),
            (self.node_abi, &mut target.node_abi),
            (self.libc, &mut target.libc),
        ];
        for (value, slot) in fields {
            if let Some(value) = value {
                *slot = value;
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MapEntry {
    Name(String),
    Explicit { name: String, copy_to: PathBuf },
}
