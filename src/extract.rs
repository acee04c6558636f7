//! Structural extraction of component and pipe declarations from host
//! source files. Parsing is done with a real TypeScript parser; templates
//! themselves are never parsed here.

use std::fs;
use std::io::sink;
use std::path::Path;

use swc_common::{
    errors::{EmitterWriter, Handler, HANDLER},
    sync::Lrc,
    FileName, SourceMap, Span, Spanned, GLOBALS,
};
use swc_ecma_ast::{
    Callee, Class, ClassMember, Decl, Decorator, DefaultDecl, EsVersion, Expr, Lit, Module,
    ModuleDecl, ModuleItem, ObjectLit, Prop, PropName, PropOrSpread, Stmt,
};
use swc_ecma_parser::{lexer::Lexer, Parser, StringInput, Syntax, TsConfig};

use crate::candidate::{
    is_valid_pipe_name, is_valid_selector, BindingMember, Candidate, ComponentCandidate,
    PipeCandidate,
};

/// Extract all candidates declared in the file at `path`, reading its saved
/// contents from disk. Unreadable files yield nothing.
pub fn extract_file(path: &Path) -> Vec<Candidate> {
    match fs::read_to_string(path) {
        Ok(source) => extract_source(path, &source),
        Err(err) => {
            log::debug!("skipping unreadable file {}: {}", path.display(), err);
            Vec::new()
        }
    }
}

/// Extract all candidates from `source`, which overrides whatever is on disk
/// at `path` (unsaved editor buffers). A file that fails to parse yields no
/// candidates; it must never abort a sweep over the remaining files.
pub fn extract_source(path: &Path, source: &str) -> Vec<Candidate> {
    let Some(module) = parse_module(source) else {
        log::debug!("failed to parse {}", path.display());
        return Vec::new();
    };

    let mut candidates = Vec::new();
    for (class_name, class) in top_level_classes(&module) {
        let Some((annotation_name, decorator)) = annotation(class, &["Component", "Pipe"]) else {
            continue;
        };
        let candidate = match annotation_name.as_str() {
            "Component" => {
                component_candidate(source, path, &class_name, class, decorator)
                    .map(Candidate::Component)
            }
            _ => pipe_candidate(source, path, &class_name, decorator).map(Candidate::Pipe),
        };
        if let Some(candidate) = candidate {
            candidates.push(candidate);
        }
    }
    candidates
}

/// Parse `source` as a TypeScript module with decorator syntax enabled.
/// Diagnostics are swallowed; the caller only cares whether parsing worked.
pub(crate) fn parse_module(source: &str) -> Option<Module> {
    let cm: Lrc<SourceMap> = Default::default();
    let handler = Handler::with_emitter(
        false,
        false,
        Box::new(EmitterWriter::new(Box::new(sink()), None, false, false)),
    );

    GLOBALS.set(&Default::default(), || {
        HANDLER.set(&handler, || {
            let fm = cm.new_source_file(FileName::Anon, source.to_string());
            let lexer = Lexer::new(
                Syntax::Typescript(TsConfig {
                    tsx: false,
                    decorators: true,
                    dts: false,
                    ..Default::default()
                }),
                EsVersion::Es2022,
                StringInput::from(&*fm),
                None,
            );
            let mut parser = Parser::new_from(lexer);
            match parser.parse_module() {
                Ok(module) => Some(module),
                Err(err) => {
                    err.into_diagnostic(&handler).emit();
                    None
                }
            }
        })
    })
}

/// Top-level class declarations, whether plain, exported, or default-exported.
pub(crate) fn top_level_classes(module: &Module) -> Vec<(String, &Class)> {
    let mut classes = Vec::new();
    for item in &module.body {
        match item {
            ModuleItem::Stmt(Stmt::Decl(Decl::Class(decl))) => {
                classes.push((decl.ident.sym.to_string(), &*decl.class));
            }
            ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(export)) => {
                if let Decl::Class(decl) = &export.decl {
                    classes.push((decl.ident.sym.to_string(), &*decl.class));
                }
            }
            ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultDecl(export)) => {
                if let DefaultDecl::Class(expr) = &export.decl {
                    let name = expr
                        .ident
                        .as_ref()
                        .map(|ident| ident.sym.to_string())
                        .unwrap_or_else(|| "default".to_string());
                    classes.push((name, &*expr.class));
                }
            }
            _ => {}
        }
    }
    classes
}

/// First decorator on `class` whose callee matches one of `names`.
pub(crate) fn annotation<'a>(
    class: &'a Class,
    names: &[&str],
) -> Option<(String, &'a Decorator)> {
    class.decorators.iter().find_map(|dec| {
        let name = decorator_name(dec)?;
        names.contains(&name.as_str()).then_some((name, dec))
    })
}

fn decorator_name(dec: &Decorator) -> Option<String> {
    match &*dec.expr {
        Expr::Call(call) => match &call.callee {
            Callee::Expr(callee) => match &**callee {
                Expr::Ident(ident) => Some(ident.sym.to_string()),
                _ => None,
            },
            _ => None,
        },
        Expr::Ident(ident) => Some(ident.sym.to_string()),
        _ => None,
    }
}

/// The object-literal argument of an annotation call, e.g. the `{...}` in
/// `@Component({...})`.
pub(crate) fn object_arg(dec: &Decorator) -> Option<&ObjectLit> {
    let Expr::Call(call) = &*dec.expr else {
        return None;
    };
    match &*call.args.first()?.expr {
        Expr::Object(obj) => Some(obj),
        _ => None,
    }
}

/// Value expression of the property named `key` in an object literal.
pub(crate) fn prop_value<'a>(obj: &'a ObjectLit, key: &str) -> Option<&'a Expr> {
    obj.props.iter().find_map(|prop| {
        let PropOrSpread::Prop(prop) = prop else {
            return None;
        };
        let Prop::KeyValue(kv) = &**prop else {
            return None;
        };
        (prop_key_name(&kv.key)? == key).then_some(&*kv.value)
    })
}

fn prop_span<'a>(obj: &'a ObjectLit, key: &str) -> Option<Span> {
    obj.props.iter().find_map(|prop| {
        let PropOrSpread::Prop(prop) = prop else {
            return None;
        };
        let Prop::KeyValue(kv) = &**prop else {
            return None;
        };
        (prop_key_name(&kv.key)? == key).then(|| kv.value.span())
    })
}

fn string_prop(obj: &ObjectLit, key: &str) -> Option<String> {
    match prop_value(obj, key)? {
        Expr::Lit(Lit::Str(value)) => Some(value.value.to_string()),
        _ => None,
    }
}

fn bool_prop(obj: &ObjectLit, key: &str) -> Option<bool> {
    match prop_value(obj, key)? {
        Expr::Lit(Lit::Bool(value)) => Some(value.value),
        _ => None,
    }
}

fn prop_key_name(key: &PropName) -> Option<String> {
    match key {
        PropName::Ident(ident) => Some(ident.sym.to_string()),
        PropName::Str(value) => Some(value.value.to_string()),
        _ => None,
    }
}

fn component_candidate(
    source: &str,
    path: &Path,
    class_name: &str,
    class: &Class,
    decorator: &Decorator,
) -> Option<ComponentCandidate> {
    let obj = object_arg(decorator)?;
    let selector = string_prop(obj, "selector")?;
    if !is_valid_selector(&selector) {
        return None;
    }

    let selector_source = prop_span(obj, "selector")
        .map(|span| format!("selector: {}", span_text(source, span)))
        .unwrap_or_default();

    let (inputs, outputs) = binding_members(source, class);

    Some(ComponentCandidate {
        selector,
        inputs,
        outputs,
        source_path: path.to_path_buf(),
        class_name: class_name.to_string(),
        selector_source,
    })
}

fn pipe_candidate(
    source: &str,
    path: &Path,
    class_name: &str,
    decorator: &Decorator,
) -> Option<PipeCandidate> {
    let obj = object_arg(decorator)?;
    let name = string_prop(obj, "name")?;
    if !is_valid_pipe_name(&name) {
        return None;
    }

    let name_source = prop_span(obj, "name")
        .map(|span| format!("name: {}", span_text(source, span)))
        .unwrap_or_default();

    Some(PipeCandidate {
        name,
        pure: bool_prop(obj, "pure").unwrap_or(true),
        source_path: path.to_path_buf(),
        class_name: class_name.to_string(),
        name_source,
    })
}

/// Collect `@Input`/`@Output` members in declaration order. Any member kind
/// qualifies: plain properties, methods, and get/set accessors all carry
/// their own decorator lists.
fn binding_members(source: &str, class: &Class) -> (Vec<BindingMember>, Vec<BindingMember>) {
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();

    for member in &class.body {
        let (key, decorators, span) = match member {
            ClassMember::ClassProp(prop) => (&prop.key, &prop.decorators, prop.span),
            ClassMember::Method(method) => (&method.key, &method.function.decorators, method.span),
            _ => continue,
        };
        let Some(member_name) = prop_key_name(key) else {
            continue;
        };
        let Some(dec) = decorators.iter().find(|dec| {
            matches!(decorator_name(dec).as_deref(), Some("Input") | Some("Output"))
        }) else {
            continue;
        };

        let member = BindingMember {
            external_name: binding_external_name(dec, &member_name),
            member_name,
            source: member_source(source, decorators, span),
        };
        match decorator_name(dec).as_deref() {
            Some("Input") => inputs.push(member),
            _ => outputs.push(member),
        }
    }

    (inputs, outputs)
}

/// The name markup binds against: the annotation's first string argument if
/// one is given, else the member's own identifier.
fn binding_external_name(dec: &Decorator, member_name: &str) -> String {
    if let Expr::Call(call) = &*dec.expr {
        if let Some(arg) = call.args.first() {
            if let Expr::Lit(Lit::Str(value)) = &*arg.expr {
                return value.value.to_string();
            }
        }
    }
    member_name.to_string()
}

/// Raw text of a member declaration. Member spans do not cover the attached
/// decorators, so widen to the first decorator's start.
fn member_source(source: &str, decorators: &[Decorator], span: Span) -> String {
    let lo = decorators
        .first()
        .map(|dec| dec.span.lo)
        .unwrap_or(span.lo)
        .min(span.lo);
    span_text_between(source, lo.0, span.hi.0).trim().to_string()
}

fn span_text(source: &str, span: Span) -> &str {
    span_text_between(source, span.lo.0, span.hi.0)
}

// Byte positions are 1-based within the single-file source map.
fn span_text_between(source: &str, lo: u32, hi: u32) -> &str {
    let lo = (lo as usize).saturating_sub(1).min(source.len());
    let hi = (hi as usize).saturating_sub(1).min(source.len());
    if lo >= hi {
        ""
    } else {
        &source[lo..hi]
    }
}
