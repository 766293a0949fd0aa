use {
    crate::natives::{config::Target, utils::normalize},
    anyhow::{Context, Result, anyhow},
    regex::Regex,
    serde_json::Value,
    std::{
        collections::HashMap,
        fs,
        path::{Path, PathBuf},
        sync::LazyLock,
    },
};

/// Package names the pre-compiled binary locator is published under.
pub const LOCATOR_PACKAGES: [&str; 2] = ["node-pre-gyp", "@mapbox/node-pre-gyp"];

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_]+)\}").expect("placeholder pattern is valid"));

/// Whether any of the locator packages is installed in a `node_modules`
/// directory reachable from `from_dir`, following the usual upward lookup.
pub fn locator_available(from_dir: &Path) -> bool {
    from_dir.ancestors().any(|dir| {
        LOCATOR_PACKAGES.iter().any(|pkg| {
            dir.join("node_modules")
                .join(pkg)
                .join("package.json")
                .is_file()
        })
    })
}

/// Locate the binary a package declares in the `binary` section of its
/// `package.json`.
///
/// `module_path` is a template; placeholders such as `{node_abi}`,
/// `{platform}` or `{configuration}` are expanded for `target`. The result is
/// `<package dir>/<module_path>/<module_name>.node`.
pub fn find(package_json: &Path, target: &Target) -> Result<PathBuf> {
    let content = fs::read_to_string(package_json)
        .with_context(|| format!("failed to read {}", package_json.display()))?;
    let package: Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", package_json.display()))?;

    let binary = package
        .get("binary")
        .ok_or_else(|| anyhow!("{} has no `binary` section", package_json.display()))?;
    let module_name = binary
        .get("module_name")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("`binary.module_name` is missing"))?;
    let module_path = binary
        .get("module_path")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("`binary.module_path` is missing"))?;

    let opts = template_options(&package, module_name, target);
    let module_path = expand(module_path, &opts);

    let package_dir = package_json.parent().unwrap_or(Path::new(""));
    Ok(normalize(
        &package_dir
            .join(module_path)
            .join(format!("{module_name}.node")),
    ))
}

fn template_options(
    package: &Value,
    module_name: &str,
    target: &Target,
) -> HashMap<&'static str, String> {
    let str_field = |key: &str| {
        package
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let version = str_field("version");
    let (core, build) = version.split_once('+').unwrap_or((version.as_str(), ""));
    let (core, prerelease) = core.split_once('-').unwrap_or((core, ""));
    let mut numbers = core.split('.');
    let mut next = || numbers.next().unwrap_or("0").to_string();
    let (major, minor, patch) = (next(), next(), next());

    // Highest declared N-API version; the runtime supports all released ones.
    let napi = package
        .pointer("/binary/napi_versions")
        .and_then(Value::as_array)
        .and_then(|versions| versions.iter().filter_map(Value::as_u64).max())
        .map(|v| v.to_string())
        .unwrap_or_default();

    HashMap::from([
        ("name", str_field("name")),
        ("module_name", module_name.to_string()),
        ("module_main", str_field("main")),
        ("version", version.clone()),
        ("major", major),
        ("minor", minor),
        ("patch", patch),
        ("prerelease", prerelease.to_string()),
        ("build", build.to_string()),
        ("configuration", "Release".to_string()),
        ("node_abi", target.node_abi.clone()),
        ("runtime", "node".to_string()),
        ("platform", target.platform.clone()),
        ("target_platform", target.platform.clone()),
        ("arch", target.arch.clone()),
        ("target_arch", target.arch.clone()),
        ("libc", target.libc.clone()),
        ("toolset", String::new()),
        ("napi_build_version", napi.clone()),
        (
            "node_napi_label",
            if napi.is_empty() {
                target.node_abi.clone()
            } else {
                format!("napi-v{napi}")
            },
        ),
    ])
}

/// Unknown placeholders are left in place.
fn expand(template: &str, opts: &HashMap<&'static str, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            opts.get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
