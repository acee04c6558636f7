use std::path::PathBuf;

use regex::Regex;

/// A declaration harvested from the workspace, either a component class
/// (markup selector plus bound members) or a named pipe.
#[derive(Debug, Clone)]
pub enum Candidate {
    Component(ComponentCandidate),
    Pipe(PipeCandidate),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentCandidate {
    pub selector: String,
    pub inputs: Vec<BindingMember>,
    pub outputs: Vec<BindingMember>,
    pub source_path: PathBuf,
    pub class_name: String,
    /// Raw `selector: '...'` property text, shown as item documentation.
    pub selector_source: String,
}

impl ComponentCandidate {
    pub fn has_bindings(&self) -> bool {
        !self.inputs.is_empty() || !self.outputs.is_empty()
    }
}

/// A class member carrying an `Input`/`Output` annotation. The external name
/// is what markup binds against; the member name is only a fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingMember {
    pub member_name: String,
    pub external_name: String,
    /// Raw member declaration text, annotation included.
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeCandidate {
    pub name: String,
    pub pure: bool,
    pub source_path: PathBuf,
    pub class_name: String,
    /// Raw `name: '...'` property text, shown as item documentation.
    pub name_source: String,
}

/// Selectors must form a legal XML name; anything else can never appear as a
/// tag in a template and is dropped at extraction time.
pub fn is_valid_selector(name: &str) -> bool {
    Regex::new("^[A-Za-z_:][A-Za-z0-9_:.-]*$")
        .unwrap()
        .is_match(name)
}

pub fn is_valid_pipe_name(name: &str) -> bool {
    Regex::new("^[A-Za-z0-9]+$").unwrap().is_match(name)
}
