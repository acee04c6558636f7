//! Decides whether a cursor position is live for the engine: inside an
//! inline template literal of a host-language document, anywhere in a plain
//! markup document, or adjacent to a pipe boundary in an expression.

use swc_ecma_ast::Expr;

use crate::extract;

/// Documents whose own language is markup are live everywhere; no literal
/// detection is needed.
pub fn is_markup_language(language_id: &str) -> bool {
    matches!(
        language_id,
        "html" | "xml" | "pug" | "jade" | "handlebars"
    )
}

/// Un-quoted body spans (byte offsets, backticks excluded) of every template
/// literal attached to a component annotation in `source`. Recomputed per
/// request; document content changes between keystrokes.
pub fn template_body_spans(source: &str) -> Vec<(usize, usize)> {
    let Some(module) = extract::parse_module(source) else {
        return Vec::new();
    };

    let mut spans = Vec::new();
    for (_, class) in extract::top_level_classes(&module) {
        let Some((_, decorator)) = extract::annotation(class, &["Component"]) else {
            continue;
        };
        let Some(obj) = extract::object_arg(decorator) else {
            continue;
        };
        if let Some(Expr::Tpl(tpl)) = extract::prop_value(obj, "template") {
            // Spans are 1-based and include the backticks.
            let lo = (tpl.span.lo.0 as usize).saturating_sub(1);
            let hi = (tpl.span.hi.0 as usize).saturating_sub(1);
            if hi > lo + 1 {
                spans.push((lo + 1, hi - 1));
            }
        }
    }
    spans
}

/// True when the byte offset falls inside the body of an inline template.
pub fn offset_in_template(source: &str, offset: usize) -> bool {
    template_body_spans(source)
        .iter()
        .any(|(start, end)| offset >= *start && offset <= *end)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameContext {
    Tag,
    Pipe,
}

/// Backward scan for the nearer of `<` and `|`. A nearer `|` puts the cursor
/// inside a binding or interpolation expression.
pub fn name_context(prefix: &str) -> Option<NameContext> {
    match (prefix.rfind('<'), prefix.rfind('|')) {
        (None, None) => None,
        (Some(_), None) => Some(NameContext::Tag),
        (None, Some(_)) => Some(NameContext::Pipe),
        (Some(tag), Some(pipe)) => Some(if pipe > tag {
            NameContext::Pipe
        } else {
            NameContext::Tag
        }),
    }
}

pub fn expression_context(prefix: &str) -> bool {
    name_context(prefix) == Some(NameContext::Pipe)
}
