//! Contextual completion over raw template text. No markup AST exists here;
//! which component a trigger belongs to is decided by substring proximity,
//! and the known mis-attributions of that approach (interleaved same-named
//! or nested tags) are accepted behavior.

use tower_lsp::lsp_types::{
    Command, CompletionItem, CompletionItemKind, CompletionTextEdit, Documentation, Position,
    Range, TextEdit,
};

use crate::candidate::ComponentCandidate;
use crate::index::CandidateIndex;
use crate::template;

/// Items are authoritative over generic text suggestions and always sort to
/// the front of the list.
const FRONT_SORT_KEY: &str = "0";

/// Single-slot memo of the component the user was last completing
/// attributes for. A stale entry is only ever corrected by a fresh
/// proximity search; it is not a queue.
#[derive(Debug, Default)]
pub struct CompletionSession {
    pub current: Option<ComponentCandidate>,
}

impl CompletionSession {
    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// `<`: start a tag.
    Tag,
    /// `/`: finish a closing tag the user already opened with `</`.
    EndSlash,
    /// `>`: a tag was just closed; offer the matching end tag.
    EndGt,
    /// `[`: input binding attribute.
    Input,
    /// `(`: output binding attribute.
    Output,
    /// `[(`: two-way binding attribute.
    TwoWay,
    /// `|`: pipe name inside an expression.
    Pipe,
}

/// The trigger is implied by the characters adjacent to the cursor rather
/// than taken from the request, so manual invocations behave identically.
fn trigger_at(prefix: &str) -> Option<Trigger> {
    let mut chars = prefix.chars().rev();
    let last = chars.next()?;
    let previous = chars.next();
    match last {
        '<' => Some(Trigger::Tag),
        '/' => Some(Trigger::EndSlash),
        '>' => Some(Trigger::EndGt),
        '[' => Some(Trigger::Input),
        '(' if previous == Some('[') => Some(Trigger::TwoWay),
        '(' => Some(Trigger::Output),
        '|' => Some(Trigger::Pipe),
        _ => None,
    }
}

/// Resolve a completion request against the current index snapshot.
///
/// `markup_document` marks documents whose own language is markup; for host
/// documents liveness requires the offset to sit inside an inline template.
/// Pipe completion is gated on expression context alone.
pub fn resolve(
    text: &str,
    offset: usize,
    position: Position,
    markup_document: bool,
    index: &CandidateIndex,
    session: &mut CompletionSession,
) -> Vec<CompletionItem> {
    let offset = offset.min(text.len());
    let prefix = &text[..offset];
    let Some(trigger) = trigger_at(prefix) else {
        return Vec::new();
    };

    if trigger == Trigger::Pipe {
        if !template::expression_context(prefix) {
            return Vec::new();
        }
        return pipe_items(index);
    }

    if !markup_document && !template::offset_in_template(text, offset) {
        return Vec::new();
    }

    match trigger {
        Trigger::Tag => tag_items(index),
        Trigger::EndSlash => {
            // Strip the freshly typed `/` so the scanned text still ends
            // inside the open-tag grammar.
            let items = closing_items(&prefix[..prefix.len() - 1], index, session, false);
            session.clear();
            items
        }
        Trigger::EndGt => {
            let items = closing_items(prefix, index, session, true);
            session.clear();
            items
        }
        Trigger::Input => input_items(prefix, position, index, session),
        Trigger::Output => output_items(prefix, position, index, session),
        Trigger::TwoWay => two_way_items(prefix, position, index, session),
        Trigger::Pipe => Vec::new(),
    }
}

fn base_item(label: String, kind: CompletionItemKind, detail: String) -> CompletionItem {
    CompletionItem {
        label,
        kind: Some(kind),
        detail: Some(detail),
        sort_text: Some(FRONT_SORT_KEY.to_string()),
        ..CompletionItem::default()
    }
}

fn component_detail(component: &ComponentCandidate) -> String {
    format!(
        "{} ({})",
        component.class_name,
        component.source_path.display()
    )
}

fn tag_items(index: &CandidateIndex) -> Vec<CompletionItem> {
    index
        .components
        .iter()
        .map(|component| {
            let mut item = base_item(
                component.selector.clone(),
                CompletionItemKind::CLASS,
                component_detail(component),
            );
            // With no bindings to fill in there is nothing left to type
            // inside the tag, so emit the closed empty element directly.
            item.insert_text = Some(if component.has_bindings() {
                component.selector.clone()
            } else {
                format!("{0}></{0}>", component.selector)
            });
            if !component.selector_source.is_empty() {
                item.documentation = Some(Documentation::String(component.selector_source.clone()));
            }
            item
        })
        .collect()
}

fn closing_items(
    scan_prefix: &str,
    index: &CandidateIndex,
    session: &mut CompletionSession,
    prefixed: bool,
) -> Vec<CompletionItem> {
    let Some(component) = nearest_component(scan_prefix, index, session) else {
        return Vec::new();
    };
    let insert = if prefixed {
        format!("</{}>", component.selector)
    } else {
        format!("{}>", component.selector)
    };
    let mut item = base_item(
        insert.clone(),
        CompletionItemKind::CLASS,
        component_detail(&component),
    );
    item.insert_text = Some(insert);
    vec![item]
}

fn input_items(
    prefix: &str,
    position: Position,
    index: &CandidateIndex,
    session: &mut CompletionSession,
) -> Vec<CompletionItem> {
    let Some(component) = nearest_component(prefix, index, session) else {
        return Vec::new();
    };
    component
        .inputs
        .iter()
        .map(|input| {
            attribute_item(
                format!("[{}]", input.external_name),
                format!("[{}]=\"\"", input.external_name),
                1,
                position,
                &component,
                &input.source,
            )
        })
        .collect()
}

fn output_items(
    prefix: &str,
    position: Position,
    index: &CandidateIndex,
    session: &mut CompletionSession,
) -> Vec<CompletionItem> {
    let Some(component) = nearest_component(prefix, index, session) else {
        return Vec::new();
    };
    component
        .outputs
        .iter()
        .map(|output| {
            attribute_item(
                format!("({})", output.external_name),
                format!("({})=\"\"", output.external_name),
                1,
                position,
                &component,
                &output.source,
            )
        })
        .collect()
}

/// Two-way completions exist only for inputs paired with a `<name>Change`
/// output, the banana-in-a-box convention.
fn two_way_items(
    prefix: &str,
    position: Position,
    index: &CandidateIndex,
    session: &mut CompletionSession,
) -> Vec<CompletionItem> {
    let Some(component) = nearest_component(prefix, index, session) else {
        return Vec::new();
    };
    component
        .inputs
        .iter()
        .filter(|input| {
            let change = format!("{}Change", input.external_name);
            component
                .outputs
                .iter()
                .any(|output| output.external_name == change)
        })
        .map(|input| {
            attribute_item(
                format!("[({})]", input.external_name),
                format!("[({})]=\"\"", input.external_name),
                2,
                position,
                &component,
                &input.source,
            )
        })
        .collect()
}

/// An attribute completion replaces the trigger character(s) the user just
/// typed and parks the cursor between the quotes afterwards.
fn attribute_item(
    label: String,
    new_text: String,
    replaced_chars: u32,
    position: Position,
    component: &ComponentCandidate,
    source: &str,
) -> CompletionItem {
    let mut item = base_item(label, CompletionItemKind::FIELD, component_detail(component));
    let start = Position::new(
        position.line,
        position.character.saturating_sub(replaced_chars),
    );
    item.text_edit = Some(CompletionTextEdit::Edit(TextEdit {
        range: Range::new(start, position),
        new_text,
    }));
    item.command = Some(Command {
        title: "cursor left".to_string(),
        command: "cursorLeft".to_string(),
        arguments: None,
    });
    if !source.is_empty() {
        item.documentation = Some(Documentation::String(source.to_string()));
    }
    item
}

fn pipe_items(index: &CandidateIndex) -> Vec<CompletionItem> {
    index
        .pipes
        .iter()
        .map(|pipe| {
            let mut detail = format!("{} ({})", pipe.class_name, pipe.source_path.display());
            if !pipe.pure {
                detail.push_str(" [impure]");
            }
            let mut item = base_item(pipe.name.clone(), CompletionItemKind::FUNCTION, detail);
            item.insert_text = Some(format!(" {}", pipe.name));
            if !pipe.name_source.is_empty() {
                item.documentation = Some(Documentation::String(pipe.name_source.clone()));
            }
            item
        })
        .collect()
}

/// Nearest enclosing component by text proximity.
///
/// For each known selector, the last `<selector` occurrence in the scanned
/// prefix is accepted only if everything after it still matches the open-tag
/// grammar; among accepted occurrences the latest start wins, with ties
/// falling to the later candidate in iteration order. A memoized candidate
/// with the winning selector is returned as-is for identity continuity, and
/// a single-component workspace skips the scan entirely.
pub fn nearest_component(
    prefix: &str,
    index: &CandidateIndex,
    session: &mut CompletionSession,
) -> Option<ComponentCandidate> {
    if index.components.len() == 1 {
        let only = index.components[0].clone();
        session.current = Some(only.clone());
        return Some(only);
    }

    let mut best: Option<(usize, &ComponentCandidate)> = None;
    for component in &index.components {
        let needle = format!("<{}", component.selector);
        let Some(at) = prefix.rfind(&needle) else {
            continue;
        };
        if !tail_stays_in_tag(&prefix[at + needle.len()..]) {
            continue;
        }
        match best {
            Some((seen, _)) if at < seen => {}
            _ => best = Some((at, component)),
        }
    }

    let winner = best?.1;
    if let Some(current) = &session.current {
        if current.selector == winner.selector {
            return Some(current.clone());
        }
    }
    let found = winner.clone();
    session.current = Some(found.clone());
    Some(found)
}

/// Open-tag grammar check for the text following a `<selector` occurrence:
/// runs of non-`<>='"` characters or quoted attribute values, optionally a
/// `>` with trailing text and at most one final `<`. An unterminated quote
/// at the end of the scan counts as still typing inside the value.
fn tail_stays_in_tag(tail: &str) -> bool {
    let bytes = tail.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                if i == bytes.len() {
                    return true;
                }
                i += 1;
            }
            b'=' => {
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                match bytes.get(i) {
                    None => return true,
                    Some(&quote @ (b'"' | b'\'')) => {
                        i += 1;
                        while i < bytes.len() && bytes[i] != quote {
                            i += 1;
                        }
                        if i == bytes.len() {
                            return true;
                        }
                        i += 1;
                    }
                    Some(_) => return false,
                }
            }
            b'<' => return false,
            b'>' => {
                // The tag was closed; text content may follow, but another
                // `<` with anything after it crosses into a different
                // element's name.
                i += 1;
                while i < bytes.len() && bytes[i] != b'<' {
                    i += 1;
                }
                return i >= bytes.len() || i + 1 == bytes.len();
            }
            _ => i += 1,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{BindingMember, PipeCandidate};
    use std::path::PathBuf;

    fn binding(name: &str) -> BindingMember {
        BindingMember {
            member_name: name.to_string(),
            external_name: name.to_string(),
            source: format!("@Input() {name}: string;"),
        }
    }

    fn component(selector: &str, inputs: &[&str], outputs: &[&str]) -> ComponentCandidate {
        ComponentCandidate {
            selector: selector.to_string(),
            inputs: inputs.iter().map(|n| binding(n)).collect(),
            outputs: outputs.iter().map(|n| binding(n)).collect(),
            source_path: PathBuf::from("/ws/src/a.component.ts"),
            class_name: "AComponent".to_string(),
            selector_source: format!("selector: \"{selector}\""),
        }
    }

    fn pipe(name: &str) -> PipeCandidate {
        PipeCandidate {
            name: name.to_string(),
            pure: true,
            source_path: PathBuf::from("/ws/src/p.pipe.ts"),
            class_name: "PPipe".to_string(),
            name_source: format!("name: \"{name}\""),
        }
    }

    fn index_of(components: Vec<ComponentCandidate>, pipes: Vec<PipeCandidate>) -> CandidateIndex {
        CandidateIndex { components, pipes }
    }

    fn resolve_markup(
        text: &str,
        index: &CandidateIndex,
        session: &mut CompletionSession,
    ) -> Vec<CompletionItem> {
        let offset = text.len();
        let line = text.lines().count().saturating_sub(1) as u32;
        let character = text.lines().last().map(|l| l.len()).unwrap_or(0) as u32;
        resolve(text, offset, Position::new(line, character), true, index, session)
    }

    #[test]
    fn tag_trigger_lists_every_component() {
        let index = index_of(
            vec![component("app-card", &["title"], &[]), component("app-sep", &[], &[])],
            vec![],
        );
        let mut session = CompletionSession::default();
        let items = resolve_markup("<", &index, &mut session);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].insert_text.as_deref(), Some("app-card"));
        assert_eq!(items[1].insert_text.as_deref(), Some("app-sep></app-sep>"));
        assert!(items.iter().all(|i| i.sort_text.as_deref() == Some("0")));
    }

    #[test]
    fn input_trigger_offers_bracket_attributes() {
        let index = index_of(
            vec![
                component("app-card", &["title", "body"], &[]),
                component("app-other", &["x"], &[]),
            ],
            vec![],
        );
        let mut session = CompletionSession::default();
        let text = "<app-card [";
        let items = resolve_markup(text, &index, &mut session);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, "[title]");
        let Some(CompletionTextEdit::Edit(edit)) = &items[0].text_edit else {
            panic!("expected a text edit");
        };
        assert_eq!(edit.new_text, "[title]=\"\"");
        // The edit swallows the trigger character the user already typed.
        assert_eq!(edit.range.start.character, (text.len() - 1) as u32);
        assert_eq!(
            items[0].command.as_ref().map(|c| c.command.as_str()),
            Some("cursorLeft")
        );
    }

    #[test]
    fn output_and_two_way_triggers() {
        let index = index_of(
            vec![
                component("app-card", &["value", "title"], &["valueChange", "closed"]),
                component("app-other", &[], &[]),
            ],
            vec![],
        );
        let mut session = CompletionSession::default();

        let items = resolve_markup("<app-card (", &index, &mut session);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, "(valueChange)");

        // `[(` only offers inputs with a matching Change output.
        let items = resolve_markup("<app-card [(", &index, &mut session);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "[(value)]");
        let Some(CompletionTextEdit::Edit(edit)) = &items[0].text_edit else {
            panic!("expected a text edit");
        };
        assert_eq!(edit.new_text, "[(value)]=\"\"");
        assert_eq!(edit.range.start.character, ("<app-card ".len()) as u32);
    }

    #[test]
    fn closing_tag_variants_and_session_clearing() {
        let index = index_of(
            vec![component("app-card", &["title"], &[]), component("app-x", &[], &[])],
            vec![],
        );
        let mut session = CompletionSession::default();

        let items = resolve_markup("<app-card>hello</", &index, &mut session);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].insert_text.as_deref(), Some("app-card>"));
        assert!(session.current.is_none());

        let items = resolve_markup("<app-card title=\"x\">", &index, &mut session);
        assert_eq!(items[0].insert_text.as_deref(), Some("</app-card>"));
        assert!(session.current.is_none());
    }

    #[test]
    fn pipe_trigger_requires_expression_context() {
        let index = index_of(vec![], vec![pipe("upper"), pipe("shorten")]);
        let mut session = CompletionSession::default();

        let items = resolve_markup("<div>{{ name |", &index, &mut session);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].insert_text.as_deref(), Some(" upper"));

        // Without a typed trigger there is nothing to offer.
        let items = resolve_markup("{{ a | b }}<div ", &index, &mut session);
        assert!(items.is_empty());
    }

    #[test]
    fn host_documents_require_the_template_region() {
        let index = index_of(
            vec![component("app-a", &[], &[]), component("app-b", &[], &[])],
            vec![],
        );
        let mut session = CompletionSession::default();

        let host = "@Component({ selector: \"app-a\", template: `<` })\nexport class AComponent {}\n";
        let inside = host.find('`').map(|i| i + 2).unwrap_or(0);
        let items = resolve(
            host,
            inside,
            Position::new(0, inside as u32),
            false,
            &index,
            &mut session,
        );
        assert!(!items.is_empty());

        // A `<` outside any template literal is dead.
        let plain = "let a = 1 < 2;";
        let items = resolve(
            plain,
            "let a = 1 <".len(),
            Position::new(0, 11),
            false,
            &index,
            &mut session,
        );
        assert!(items.is_empty());
    }

    #[test]
    fn proximity_prefers_the_innermost_open_tag() {
        let index = index_of(
            vec![component("app-outer", &["o"], &[]), component("app-inner", &["i"], &[])],
            vec![],
        );
        let mut session = CompletionSession::default();
        let items = resolve_markup("<app-outer><app-inner [", &index, &mut session);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "[i]");
    }

    #[test]
    fn proximity_rejects_occurrences_past_a_sibling() {
        let index = index_of(
            vec![component("app-a", &["a"], &[]), component("app-b", &["b"], &[])],
            vec![],
        );
        let mut session = CompletionSession::default();
        let items = resolve_markup("<app-a x=\"1\"></app-a><app-b [", &index, &mut session);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "[b]");
    }

    #[test]
    fn proximity_tie_falls_to_the_later_candidate() {
        // `<app-item2` also contains `<app-item`, so both score the same
        // start offset; the later candidate in iteration order prevails.
        let index = index_of(
            vec![component("app-item", &["short"], &[]), component("app-item2", &["long"], &[])],
            vec![],
        );
        let mut session = CompletionSession::default();
        let items = resolve_markup("<app-item2 [", &index, &mut session);
        assert_eq!(items[0].label, "[long]");
    }

    #[test]
    fn single_component_fast_path_skips_the_scan() {
        let index = index_of(vec![component("app-only", &["x"], &[])], vec![]);
        let mut session = CompletionSession::default();
        // No `<app-only` occurrence anywhere in the scanned text.
        let items = resolve_markup("unrelated [", &index, &mut session);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "[x]");
    }

    #[test]
    fn memoized_candidate_wins_on_selector_match() {
        let index = index_of(
            vec![component("app-card", &["fresh"], &[]), component("app-x", &[], &[])],
            vec![],
        );
        let mut session = CompletionSession::default();
        // Seed the memo with a same-selector candidate whose bindings differ
        // from the index copy; the memoized object must be returned.
        session.current = Some(component("app-card", &["memoized"], &[]));
        let items = resolve_markup("<app-card [", &index, &mut session);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "[memoized]");
    }

    #[test]
    fn unterminated_attribute_value_is_still_inside_the_tag() {
        assert!(tail_stays_in_tag(" [title]=\"unfinished"));
        assert!(tail_stays_in_tag(" disabled"));
        assert!(tail_stays_in_tag(">text content"));
        assert!(tail_stays_in_tag(">text<"));
        assert!(!tail_stays_in_tag(">text</"));
        assert!(!tail_stays_in_tag(" a=b"));
        assert!(!tail_stays_in_tag("><other attr"));
    }

    #[test]
    fn no_trigger_means_no_items() {
        let index = index_of(vec![component("app-a", &[], &[])], vec![]);
        let mut session = CompletionSession::default();
        assert!(resolve_markup("plain text", &index, &mut session).is_empty());
        assert!(resolve_markup("", &index, &mut session).is_empty());
    }
}
