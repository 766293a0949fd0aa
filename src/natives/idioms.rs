use {
    crate::natives::{
        module_root,
        pre_gyp,
        utils::{NATIVE_EXTENSIONS, absolutize, has_native_extension, with_suffix},
    },
    regex::Regex,
    std::{
        cell::OnceCell,
        ops::Range,
        path::{Path, PathBuf},
        sync::LazyLock,
    },
    tracing::debug,
};

/// Alias used by `require('bindings')()` when called without arguments.
pub const DEFAULT_ALIAS: &str = "bindings.node";

/// A single-line JavaScript string literal, either quote style.
const STRING_LITERAL: &str = r#"(?:'(?:[^'\\\n]|\\.)*'|"(?:[^"\\\n]|\\.)*")"#;

static GENERIC_LOOKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"require\(\s*(?:'bindings'|"bindings")\s*\)\s*\(([^()]*)\)"#)
        .expect("generic lookup pattern is valid")
});

/// Any call of the `bindings` module, whatever its argument.
static BINDINGS_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"require\(\s*(?:'bindings'|"bindings")\s*\)\s*\("#)
        .expect("bindings call pattern is valid")
});

static DIRECT_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"require\(\s*(?:'([^'\\\n]*)'|"([^"\\\n]*)")\s*\)"#)
        .expect("direct literal pattern is valid")
});

static LOCATOR_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        concat!(
            r#"\b(?:var|let|const)\s+([A-Za-z_$][\w$]*)\s*=\s*"#,
            r#"require\(\s*(?:'(?:@mapbox/)?node-pre-gyp'|"(?:@mapbox/)?node-pre-gyp")\s*\)\s*;?"#,
        ),
    )
    .expect("locator import pattern is valid")
});

/// Kind of a recognized idiom. Ordering is the precedence used when two
/// matches would overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IdiomKind {
    PreGypLookup,
    GenericLookup,
    DirectLiteral,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Idiom {
    /// `require('bindings')(<alias>)`, alias already carrying `.node`.
    GenericLookup { alias: String },
    /// `require('<literal>')` naming an existing binary.
    DirectLiteral { path: PathBuf },
    PreGypLookup(PreGypLookup),
}

/// `var <path_var> = <locator>.find(...); var <binding_var> = require(<path_var>)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreGypLookup {
    pub import: LocatorImport,
    /// Package descriptor handed to `find`, resolved against the file's
    /// directory.
    pub package_json: PathBuf,
    pub path_decl: String,
    pub path_var: String,
    pub binding_decl: String,
    pub binding_var: String,
}

/// Statement binding the pre-compiled binary locator package to a variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorImport {
    pub span: Range<usize>,
    pub var_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdiomMatch {
    pub span: Range<usize>,
    pub idiom: Idiom,
}

impl IdiomMatch {
    pub fn kind(&self) -> IdiomKind {
        match self.idiom {
            Idiom::GenericLookup { .. } => IdiomKind::GenericLookup,
            Idiom::DirectLiteral { .. } => IdiomKind::DirectLiteral,
            Idiom::PreGypLookup(_) => IdiomKind::PreGypLookup,
        }
    }
}

/// Scans one source unit for native binary idioms.
///
/// The module root is looked up at most once per unit, and only when some
/// idiom needs it.
pub struct Detector<'a> {
    text: &'a str,
    file: PathBuf,
    dir: PathBuf,
    module_root: OnceCell<PathBuf>,
}

impl<'a> Detector<'a> {
    pub fn new(text: &'a str, file: &Path) -> Self {
        let file = absolutize(file);
        let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            text,
            file,
            dir,
            module_root: OnceCell::new(),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn module_root(&self) -> &Path {
        self.module_root
            .get_or_init(|| module_root::locate(&self.file))
    }

    /// All idiom occurrences, ordered by position.
    ///
    /// Spans never overlap: each matcher runs independently, and a match that
    /// intersects one of higher precedence is dropped.
    pub fn detect(&self) -> Vec<IdiomMatch> {
        let mut found = self.pre_gyp_lookups();
        found.extend(self.generic_lookups());
        found.extend(self.direct_literals());
        found.sort_by_key(IdiomMatch::kind);

        let mut accepted: Vec<IdiomMatch> = Vec::with_capacity(found.len());
        for candidate in found {
            let overlapping = accepted.iter().any(|m| {
                candidate.span.start < m.span.end && m.span.start < candidate.span.end
            });
            if overlapping {
                continue;
            }
            accepted.push(candidate);
        }
        accepted.sort_by_key(|m| m.span.start);
        accepted
    }

    fn generic_lookups(&self) -> Vec<IdiomMatch> {
        GENERIC_LOOKUP
            .captures_iter(self.text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let arg = caps[1].trim();
                let mut alias = if arg.is_empty() {
                    DEFAULT_ALIAS.to_string()
                } else {
                    match eval_string_concat(arg) {
                        Some(alias) => alias,
                        None => {
                            debug!(
                                file = %self.file.display(),
                                arg,
                                "skipping non-literal bindings alias"
                            );
                            return None;
                        }
                    }
                };
                if !alias.ends_with(".node") {
                    alias.push_str(".node");
                }
                Some(IdiomMatch {
                    span: whole.range(),
                    idiom: Idiom::GenericLookup { alias },
                })
            })
            .collect()
    }

    /// `require('<literal>')` calls naming an existing binary.
    ///
    /// The head of a `bindings` call is never one of them, even when the
    /// call itself could not be resolved.
    fn direct_literals(&self) -> Vec<IdiomMatch> {
        let heads: Vec<_> = BINDINGS_CALL
            .find_iter(self.text)
            .map(|m| m.range())
            .collect();
        DIRECT_LITERAL
            .captures_iter(self.text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                if heads.iter().any(|head| head.start < whole.end() && whole.start() < head.end) {
                    return None;
                }
                let specifier = caps.get(1).or_else(|| caps.get(2))?.as_str();
                if specifier.is_empty() {
                    return None;
                }
                let path = self.existing_binary(specifier)?;
                Some(IdiomMatch {
                    span: whole.range(),
                    idiom: Idiom::DirectLiteral { path },
                })
            })
            .collect()
    }

    /// Resolve a literal specifier to an existing binary, trying the file's
    /// directory first and the module root second.
    fn existing_binary(&self, specifier: &str) -> Option<PathBuf> {
        let probe = |base: &Path| {
            let resolved = absolutize(&base.join(specifier));
            if has_native_extension(specifier) {
                return resolved.is_file().then_some(resolved);
            }
            NATIVE_EXTENSIONS
                .iter()
                .map(|ext| with_suffix(&resolved, ext))
                .find(|p| p.is_file())
        };

        probe(&self.dir).or_else(|| {
            let root = self.module_root();
            if root == self.dir {
                return None;
            }
            probe(root)
        })
    }

    /// Import statements of the locator package, in source order.
    pub fn locator_imports(&self) -> Vec<LocatorImport> {
        LOCATOR_IMPORT
            .captures_iter(self.text)
            .filter_map(|caps| {
                Some(LocatorImport {
                    span: caps.get(0)?.range(),
                    var_name: caps[1].to_string(),
                })
            })
            .collect()
    }

    fn pre_gyp_lookups(&self) -> Vec<IdiomMatch> {
        let imports = self.locator_imports();
        if imports.is_empty() {
            return Vec::new();
        }
        if !pre_gyp::locator_available(&self.dir) {
            debug!(
                file = %self.file.display(),
                "locator package is not installed, leaving lookup untouched"
            );
            return Vec::new();
        }

        let mut matches = Vec::new();
        let mut seen = Vec::new();
        for import in imports {
            if seen.contains(&import.var_name) {
                continue;
            }
            seen.push(import.var_name.clone());

            // The lookup pattern is specialized to the variable this file bound
            // the locator to.
            let Some(lookup) = find_lookup_pattern(&import.var_name) else {
                continue;
            };
            let offset = import.span.end;
            for caps in lookup.captures_iter(&self.text[offset..]) {
                let (Some(whole), Some(required)) = (caps.get(0), caps.get(6)) else {
                    continue;
                };
                if required.as_str() != &caps[2] {
                    continue;
                }
                let Some(sub_path) = eval_string_concat(&caps[3]) else {
                    continue;
                };
                matches.push(IdiomMatch {
                    span: whole.start() + offset..whole.end() + offset,
                    idiom: Idiom::PreGypLookup(PreGypLookup {
                        import: import.clone(),
                        package_json: absolutize(&self.dir.join(sub_path)),
                        path_decl: caps[1].to_string(),
                        path_var: caps[2].to_string(),
                        binding_decl: caps[4].to_string(),
                        binding_var: caps[5].to_string(),
                    }),
                });
            }
        }
        matches
    }
}

fn find_lookup_pattern(var_name: &str) -> Option<Regex> {
    let name = regex::escape(var_name);
    let lit = STRING_LITERAL;
    Regex::new(&format!(
        r#"\b(var|let|const)\s+([A-Za-z_$][\w$]*)\s*=\s*{name}\.find\(\s*path\.resolve\(\s*path\.join\(\s*__dirname\s*,\s*({lit}(?:\s*\+\s*{lit})*)\s*\)\s*\)\s*\)\s*;?\s*(var|let|const)\s+([A-Za-z_$][\w$]*)\s*=\s*require\(\s*([A-Za-z_$][\w$]*)\s*\)"#
    ))
    .ok()
}

/// Evaluate an expression made only of string literals joined with `+`.
///
/// Anything else (identifiers, calls, template interpolation) yields `None`.
pub fn eval_string_concat(expr: &str) -> Option<String> {
    let mut value = String::new();
    let mut rest = expr.trim();
    loop {
        let (literal, tail) = parse_string_literal(rest)?;
        value.push_str(&literal);
        let tail = tail.trim_start();
        if tail.is_empty() {
            return Some(value);
        }
        rest = tail.strip_prefix('+')?.trim_start();
    }
}

/// Parse one leading string literal, returning its value and the rest of the
/// input.
fn parse_string_literal(s: &str) -> Option<(String, &str)> {
    let mut chars = s.char_indices().peekable();
    let (_, quote) = chars.next()?;
    if !matches!(quote, '\'' | '"' | '`') {
        return None;
    }

    let mut value = String::new();
    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => return Some((value, &s[i + 1..])),
            '\n' if quote != '`' => return None,
            '$' if quote == '`' && chars.peek().is_some_and(|&(_, n)| n == '{') => return None,
            '\\' => {
                let (_, escaped) = chars.next()?;
                match escaped {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    'b' => value.push('\u{8}'),
                    'f' => value.push('\u{c}'),
                    'v' => value.push('\u{b}'),
                    '0' => value.push('\0'),
                    'x' => {
                        let hex: String =
                            (0..2).filter_map(|_| chars.next().map(|(_, c)| c)).collect();
                        value.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
                    }
                    'u' => {
                        let hex: String = if chars.peek().is_some_and(|&(_, n)| n == '{') {
                            chars.next();
                            chars
                                .by_ref()
                                .map(|(_, c)| c)
                                .take_while(|&c| c != '}')
                                .collect()
                        } else {
                            (0..4).filter_map(|_| chars.next().map(|(_, c)| c)).collect()
                        };
                        value.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
                    }
                    // Line continuation.
                    '\n' => {}
                    other => value.push(other),
                }
            }
            c => value.push(c),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use {super::*, std::fs, tempfile::TempDir};

    #[test]
    fn string_concatenation_is_evaluated() {
        assert_eq!(eval_string_concat("'foo'"), Some("foo".to_string()));
        assert_eq!(
            eval_string_concat(r#""./lib/" + 'addon' + `.node`"#),
            Some("./lib/addon.node".to_string())
        );
        assert_eq!(eval_string_concat(r"'a\'b\x41B\u{43}'"), Some("a'bABC".to_string()));
        assert_eq!(eval_string_concat("name + '.node'"), None);
        assert_eq!(eval_string_concat("'a' + "), None);
        assert_eq!(eval_string_concat("`${x}.node`"), None);
        assert_eq!(eval_string_concat(""), None);
    }

    #[test]
    fn generic_lookup_defaults_and_appends_extension() {
        let text = "a = require('bindings')();\nb = require(\"bindings\")('foo');\nc = require('bindings')('bar.node')";
        let matches = Detector::new(text, Path::new("/nowhere/index.js")).detect();
        let aliases: Vec<_> = matches
            .iter()
            .map(|m| match &m.idiom {
                Idiom::GenericLookup { alias } => alias.as_str(),
                other => panic!("unexpected idiom {other:?}"),
            })
            .collect();
        assert_eq!(aliases, ["bindings.node", "foo.node", "bar.node"]);
        assert_eq!(&text[matches[0].span.clone()], "require('bindings')()");
    }

    #[test]
    fn dynamic_alias_is_skipped() {
        let text = "require('bindings')(name);\nrequire('bindings')({ bindings: 'x' })";
        assert!(Detector::new(text, Path::new("/nowhere/index.js")).detect().is_empty());
    }

    #[test]
    fn direct_literal_requires_existing_binary() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("native")).unwrap();
        fs::write(tmp.path().join("native/addon.node"), b"bin").unwrap();
        fs::write(tmp.path().join("native/helper.js"), "").unwrap();
        fs::write(tmp.path().join("package.json"), "{}").unwrap();

        let text = "require('./native/addon'); require('./native/helper'); require(dynamic); require('./native/addon.node')";
        let matches = Detector::new(text, &tmp.path().join("index.js")).detect();

        assert_eq!(matches.len(), 2);
        for m in &matches {
            assert_eq!(m.kind(), IdiomKind::DirectLiteral);
            assert_eq!(
                m.idiom,
                Idiom::DirectLiteral {
                    path: tmp.path().join("native/addon.node")
                }
            );
        }
        assert_eq!(&text[matches[0].span.clone()], "require('./native/addon')");
    }

    #[test]
    fn direct_literal_falls_back_to_module_root() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("lib")).unwrap();
        fs::create_dir_all(tmp.path().join("build")).unwrap();
        fs::write(tmp.path().join("build/x.dll"), b"bin").unwrap();
        fs::write(tmp.path().join("package.json"), "{}").unwrap();

        let matches =
            Detector::new("require('./build/x')", &tmp.path().join("lib/index.js")).detect();
        assert_eq!(
            matches[0].idiom,
            Idiom::DirectLiteral {
                path: tmp.path().join("build/x.dll")
            }
        );
    }

    fn pre_gyp_fixture(tmp: &TempDir) {
        let locator = tmp.path().join("node_modules/node-pre-gyp");
        fs::create_dir_all(&locator).unwrap();
        fs::write(locator.join("package.json"), "{}").unwrap();
    }

    const PRE_GYP_SOURCE: &str = "var pregyp = require('node-pre-gyp');\nvar path = require('path');\nvar binding_path = pregyp.find(path.resolve(path.join(__dirname, './package.json')));\nvar binding = require(binding_path);\nmodule.exports = binding;\n";

    #[test]
    fn pre_gyp_lookup_binds_import_variable() {
        let tmp = TempDir::new().unwrap();
        pre_gyp_fixture(&tmp);

        let matches = Detector::new(PRE_GYP_SOURCE, &tmp.path().join("lib/index.js")).detect();
        assert_eq!(matches.len(), 1);
        let Idiom::PreGypLookup(lookup) = &matches[0].idiom else {
            panic!("expected a pre-gyp lookup, got {:?}", matches[0].idiom);
        };
        assert_eq!(lookup.import.var_name, "pregyp");
        assert_eq!(
            &PRE_GYP_SOURCE[lookup.import.span.clone()],
            "var pregyp = require('node-pre-gyp');"
        );
        assert_eq!(lookup.package_json, tmp.path().join("lib/package.json"));
        assert_eq!(lookup.path_var, "binding_path");
        assert_eq!(lookup.binding_var, "binding");
        assert!(PRE_GYP_SOURCE[matches[0].span.clone()].ends_with("require(binding_path)"));
    }

    #[test]
    fn pre_gyp_lookup_through_other_name_is_ignored() {
        let tmp = TempDir::new().unwrap();
        pre_gyp_fixture(&tmp);

        // The locator is bound to `pregyp`, the lookup goes through `binary`.
        let text = PRE_GYP_SOURCE.replace("pregyp.find", "binary.find");
        assert!(Detector::new(&text, &tmp.path().join("index.js")).detect().is_empty());

        // The require must consume the variable the lookup produced.
        let text = PRE_GYP_SOURCE.replace("require(binding_path)", "require(other_path)");
        assert!(Detector::new(&text, &tmp.path().join("index.js")).detect().is_empty());
    }

    #[test]
    fn pre_gyp_lookup_without_locator_package_is_skipped() {
        let tmp = TempDir::new().unwrap();
        assert!(Detector::new(PRE_GYP_SOURCE, &tmp.path().join("index.js")).detect().is_empty());
    }

    #[test]
    fn overlapping_matches_keep_higher_precedence() {
        let tmp = TempDir::new().unwrap();
        // `require('bindings')` alone would qualify as a direct literal here.
        fs::write(tmp.path().join("bindings.node"), b"bin").unwrap();
        let matches =
            Detector::new("require('bindings')('x')", &tmp.path().join("index.js")).detect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].kind(), IdiomKind::GenericLookup);
    }

    #[test]
    fn unresolved_bindings_call_is_not_claimed_as_direct_literal() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("bindings.node"), b"bin").unwrap();
        fs::write(tmp.path().join("package.json"), "{}").unwrap();
        let file = tmp.path().join("index.js");

        for text in [
            "module.exports = require('bindings')(name);",
            "module.exports = require(\"bindings\")(opts('x'));",
        ] {
            assert!(Detector::new(text, &file).detect().is_empty(), "{text}");
        }

        // Without a call, the literal is an ordinary require of the binary.
        let matches = Detector::new("require('bindings')", &file).detect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].kind(), IdiomKind::DirectLiteral);
    }
}
