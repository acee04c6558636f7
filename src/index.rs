//! Whole-workspace candidate index. Sweeps enumerate every host source file
//! under the root, run the extractor on each, and build a complete
//! replacement index; nothing is patched incrementally.

use std::path::Path;

use glob::Pattern;
use walkdir::WalkDir;

use crate::candidate::{Candidate, ComponentCandidate, PipeCandidate};
use crate::extract;

#[derive(Debug, Clone, Default)]
pub struct CandidateIndex {
    pub components: Vec<ComponentCandidate>,
    pub pipes: Vec<PipeCandidate>,
}

impl CandidateIndex {
    /// Duplicates are kept as-is; the first match in scan order wins.
    pub fn component(&self, selector: &str) -> Option<&ComponentCandidate> {
        self.components.iter().find(|c| c.selector == selector)
    }

    pub fn pipe(&self, name: &str) -> Option<&PipeCandidate> {
        self.pipes.iter().find(|p| p.name == name)
    }

    pub fn counts(&self) -> (usize, usize) {
        (self.components.len(), self.pipes.len())
    }
}

/// Sweep the workspace tree under `root`, skipping files whose root-relative
/// path matches any of `ignore_globs`. Files that fail to read or parse are
/// skipped without aborting the sweep.
pub fn sweep(root: &Path, ignore_globs: &[String]) -> CandidateIndex {
    let patterns: Vec<Pattern> = ignore_globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(pattern) => Some(pattern),
            Err(err) => {
                log::warn!("ignoring malformed glob {glob:?}: {err}");
                None
            }
        })
        .collect();

    let mut index = CandidateIndex::default();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("ts") {
            continue;
        }
        if is_ignored(path, root, &patterns) {
            continue;
        }
        for candidate in extract::extract_file(path) {
            match candidate {
                Candidate::Component(component) => index.components.push(component),
                Candidate::Pipe(pipe) => index.pipes.push(pipe),
            }
        }
    }

    log::debug!(
        "sweep of {} found {} components, {} pipes",
        root.display(),
        index.components.len(),
        index.pipes.len()
    );
    index
}

fn is_ignored(path: &Path, root: &Path, patterns: &[Pattern]) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    patterns.iter().any(|pattern| pattern.matches_path(relative))
}
