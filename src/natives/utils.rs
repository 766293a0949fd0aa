use std::{
    env,
    path::{Component, Path, PathBuf},
};

/// File extensions recognized as native binaries.
pub const NATIVE_EXTENSIONS: [&str; 2] = [".node", ".dll"];

/// Lexically normalize a path: drop `.` segments and fold `..` into the
/// preceding segment. The filesystem is never consulted.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            // `..` at the root stays at the root, the way `path.resolve` does.
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Make a path absolute against the process working directory, then normalize
/// it.
pub fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize(path);
    }
    let cwd = env::current_dir().unwrap_or_default();
    normalize(&cwd.join(path))
}

/// Path rendered with forward slashes, as it is written in bundled code.
pub fn to_slash(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

/// Whether the specifier already names a native binary by its extension.
pub fn has_native_extension(specifier: &str) -> bool {
    let lower = specifier.to_ascii_lowercase();
    NATIVE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Append a suffix to the last path segment (`addon` -> `addon.node`).
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Encode a string as a double-quoted JavaScript string literal.
pub fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_owned()).to_string()
}

/// Other plugins wrap ids as `\0<plugin>:<id>`. Return the wrapped id.
pub fn strip_plugin_prefix(id: &str) -> &str {
    if id.starts_with('\0') {
        if let Some(idx) = id.find(':') {
            return &id[idx + 1..];
        }
    }
    id
}

/// Relative module specifier of `target` as seen from `from_dir`, both
/// absolute: `./x.js`, `../natives/x.js`. Paths with no common root are
/// returned as is.
pub fn relative_specifier(from_dir: &Path, target: &Path) -> String {
    let from = normalize(from_dir);
    let target = normalize(target);
    let mut from_parts = from.components().peekable();
    let mut target_parts = target.components().peekable();
    if from_parts.peek() != target_parts.peek() {
        return to_slash(&target);
    }
    while let (Some(a), Some(b)) = (from_parts.peek(), target_parts.peek()) {
        if a != b {
            break;
        }
        from_parts.next();
        target_parts.next();
    }

    let ups = from_parts.count();
    let rest: PathBuf = target_parts.collect();
    let rest = to_slash(&rest);
    match ups {
        0 => format!("./{rest}"),
        n => format!("{}{rest}", "../".repeat(n)),
    }
}

pub fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_parent_segments() {
        assert_eq!(
            normalize(Path::new("/a/b/./c/../d.node")),
            PathBuf::from("/a/b/d.node")
        );
        assert_eq!(normalize(Path::new("/../x")), PathBuf::from("/x"));
        assert_eq!(normalize(Path::new("../x")), PathBuf::from("../x"));
    }

    #[test]
    fn native_extension_is_case_insensitive() {
        assert!(has_native_extension("./build/addon.node"));
        assert!(has_native_extension("C:/lib/Addon.DLL"));
        assert!(!has_native_extension("./addon"));
        assert!(!has_native_extension("./addon.node.js"));
    }

    #[test]
    fn plugin_prefix_is_stripped_once() {
        assert_eq!(strip_plugin_prefix("\0commonjs-proxy:/a/b.js"), "/a/b.js");
        assert_eq!(strip_plugin_prefix("/a/b.js"), "/a/b.js");
        assert_eq!(strip_plugin_prefix("\0nocolon"), "\0nocolon");
    }

    #[test]
    fn js_string_escapes_nul_and_quotes() {
        assert_eq!(js_string("a\"b"), r#""a\"b""#);
        assert_eq!(js_string("\0natives:./x.node"), r#""\u0000natives:./x.node""#);
    }

    #[test]
    fn relative_specifiers_climb_to_common_ancestor() {
        assert_eq!(
            relative_specifier(Path::new("/out/pkg/lib"), Path::new("/out/natives/a.node.js")),
            "../../natives/a.node.js"
        );
        assert_eq!(
            relative_specifier(Path::new("/out"), Path::new("/out/natives/a.node.js")),
            "./natives/a.node.js"
        );
        assert_eq!(
            relative_specifier(Path::new("/out/natives/"), Path::new("/out/natives/a.node.js")),
            "./a.node.js"
        );
    }
}
