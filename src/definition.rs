//! Jump-to-declaration for tag names and pipe names. The engine only knows
//! which file declared a candidate, so every hit points at the top of that
//! file rather than the precise declaration line.

use tower_lsp::lsp_types::{Location, Position, Range, Url};

use crate::index::CandidateIndex;
use crate::template::{name_context, NameContext};

/// Resolve the identifier under the cursor against the index snapshot.
/// The backward `<`-vs-`|` scan picks the partition to search.
pub fn resolve(text: &str, offset: usize, index: &CandidateIndex) -> Option<Location> {
    let offset = offset.min(text.len());
    let token = name_token_at(text, offset)?;

    match name_context(&text[..offset])? {
        NameContext::Tag => file_location(index.component(&token)?.source_path.as_path()),
        NameContext::Pipe => file_location(index.pipe(&token)?.source_path.as_path()),
    }
}

fn file_location(path: &std::path::Path) -> Option<Location> {
    let uri = Url::from_file_path(path).ok()?;
    Some(Location::new(
        uri,
        Range::new(Position::new(0, 0), Position::new(0, 0)),
    ))
}

/// The identifier token under the cursor: longest XML-name suffix of the
/// text before it joined with the longest XML-name prefix after it.
fn name_token_at(text: &str, offset: usize) -> Option<String> {
    let mut start = offset;
    for (idx, ch) in text[..offset].char_indices().rev() {
        if is_name_char(ch) {
            start = idx;
        } else {
            break;
        }
    }

    let mut end = offset;
    for (idx, ch) in text[offset..].char_indices() {
        if is_name_char(ch) {
            end = offset + idx + ch.len_utf8();
        } else {
            break;
        }
    }

    (start < end).then(|| text[start..end].to_string())
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | ':' | '.' | '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{ComponentCandidate, PipeCandidate};
    use std::path::PathBuf;

    fn index() -> CandidateIndex {
        CandidateIndex {
            components: vec![ComponentCandidate {
                selector: "app-card".to_string(),
                inputs: vec![],
                outputs: vec![],
                source_path: PathBuf::from("/ws/src/card.component.ts"),
                class_name: "CardComponent".to_string(),
                selector_source: String::new(),
            }],
            pipes: vec![PipeCandidate {
                name: "shorten".to_string(),
                pure: true,
                source_path: PathBuf::from("/ws/src/shorten.pipe.ts"),
                class_name: "ShortenPipe".to_string(),
                name_source: String::new(),
            }],
        }
    }

    #[test]
    fn tag_name_resolves_to_the_declaring_file() {
        let text = "<app-card [title]=\"x\">";
        let offset = "<app-".len();
        let location = resolve(text, offset, &index()).unwrap();
        assert!(location.uri.path().ends_with("card.component.ts"));
        assert_eq!(location.range.start, Position::new(0, 0));
        assert_eq!(location.range.end, Position::new(0, 0));
    }

    #[test]
    fn pipe_name_resolves_through_the_pipe_partition() {
        let text = "{{ title | shorten }}";
        let offset = text.find("shor").unwrap() + 2;
        let location = resolve(text, offset, &index()).unwrap();
        assert!(location.uri.path().ends_with("shorten.pipe.ts"));
    }

    #[test]
    fn token_spans_both_sides_of_the_cursor() {
        let text = "<app-card>";
        // Cursor in the middle of the selector still yields the whole token.
        assert_eq!(name_token_at(text, 5), Some("app-card".to_string()));
        assert_eq!(name_token_at("| x", 0), None);
    }

    #[test]
    fn unknown_names_and_wrong_partitions_miss() {
        // `shorten` is a pipe, but the nearer `<` forces a component lookup.
        assert!(resolve("<shorten>", 4, &index()).is_none());
        assert!(resolve("{{ x | unknown }}", 9, &index()).is_none());
        assert!(resolve("no markers here", 4, &index()).is_none());
    }
}
