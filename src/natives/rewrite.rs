use {
    crate::natives::{
        idioms::{Idiom, IdiomMatch, LocatorImport},
        patch::TextPatch,
        registry::BinaryIdentity,
        utils::{is_ident_char, js_string},
    },
    anyhow::Result,
    std::rc::Rc,
};

/// An idiom occurrence whose binary got an identity.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub occurrence: IdiomMatch,
    pub identity: Rc<BinaryIdentity>,
    /// Module specifier the rewritten code loads the identity by.
    pub specifier: String,
}

/// Replace every resolved occurrence in `text` with a load of its identity.
///
/// The returned flag is `false` when nothing was edited. Locator imports
/// left without any reference by the rewrite are deleted as well.
pub fn rewrite<'a>(text: &'a str, resolved: &[Resolved]) -> Result<(TextPatch<'a>, bool)> {
    let mut patch = TextPatch::new(text);
    let mut imports: Vec<&LocatorImport> = Vec::new();

    for Resolved {
        occurrence,
        identity,
        specifier,
    } in resolved
    {
        let replacement = replacement(&occurrence.idiom, identity, specifier);
        patch.overwrite(occurrence.span.clone(), replacement)?;
        if let Idiom::PreGypLookup(lookup) = &occurrence.idiom {
            if !imports.contains(&&lookup.import) {
                imports.push(&lookup.import);
            }
        }
    }

    for import in imports {
        if patch.overlaps(&import.span) || is_referenced(text, import, &patch) {
            continue;
        }
        patch.remove(import.span.clone())?;
    }

    let applied = !patch.is_empty();
    Ok((patch, applied))
}

fn replacement(idiom: &Idiom, identity: &BinaryIdentity, specifier: &str) -> String {
    let id = js_string(specifier);
    match idiom {
        Idiom::GenericLookup { .. } | Idiom::DirectLiteral { .. } => format!("require({id})"),
        Idiom::PreGypLookup(lookup) => format!(
            "{} {} = {};{} {} = require({id})",
            lookup.path_decl,
            lookup.path_var,
            js_string(&identity.output_name),
            lookup.binding_decl,
            lookup.binding_var,
        ),
    }
}

/// Whether the import's variable is still used outside the import itself and
/// the spans already rewritten.
fn is_referenced(text: &str, import: &LocatorImport, patch: &TextPatch<'_>) -> bool {
    let name = import.var_name.as_str();
    text.match_indices(name).any(|(start, _)| {
        let end = start + name.len();
        let standalone = !text[..start].chars().next_back().is_some_and(is_ident_char)
            && !text[end..].chars().next().is_some_and(is_ident_char);
        let span = start..end;
        standalone
            && !(import.span.start <= start && end <= import.span.end)
            && !patch.overlaps(&span)
    })
}
