//! Per-module rewriting into the bundle's CommonJS registry form.
//!
//! ES module syntax is rewritten from statement spans in the oxc AST:
//! imports become `require` calls hoisted to the top of the module,
//! exports become getters on `exports`. CommonJS `require` calls are left as
//! they are and only collected so the bundler can resolve them.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use oxc::allocator::Allocator;
use oxc::ast::ast::{
    BindingIdentifier, Declaration, ExportDefaultDeclarationKind, ImportDeclaration,
    ImportDeclarationSpecifier, ModuleExportName, Program, Statement,
};
use oxc::parser::Parser;
use oxc::span::{GetSpan, SourceType};
use regex::Regex;

use crate::errors::StageError;

static REQUIRE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[^\w$.])require\(\s*(?:'([^'\n]+)'|"([^"\n]+)")\s*\)"#)
        .expect("require pattern")
});

/// How a dependency was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// `import`/`export ... from`; unresolvable is an error.
    Import,
    /// A CommonJS `require` call; unresolvable is left to fail at runtime.
    Require,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub specifier: String,
    pub kind: RequestKind,
}

/// Options that change how imports are rewritten.
#[derive(Debug, Clone, Copy, Default)]
pub struct RewriteOptions<'a> {
    /// Libraries whose named imports are split into per-method modules.
    pub cherry_pick: &'a [String],
}

/// A module body ready to be wrapped in a registry function.
#[derive(Debug, Clone)]
pub struct RewrittenModule {
    pub code: String,
    /// Byte offset after the directive prologue where extra declarations
    /// may be inserted.
    pub insert_at: usize,
    pub requests: Vec<Request>,
    /// Names bound at the top level of the module.
    pub top_level: BTreeSet<String>,
}

impl RewrittenModule {
    /// Insert `lines` at [`RewrittenModule::insert_at`].
    pub fn insert(&mut self, lines: &str) {
        self.code.insert_str(self.insert_at, lines);
        self.insert_at += lines.len();
    }
}

struct Edit {
    start: usize,
    end: usize,
    text: String,
}

#[derive(Default)]
struct Collector<'o> {
    options: RewriteOptions<'o>,
    edits: Vec<Edit>,
    /// Hoisted import statements.
    imports: Vec<String>,
    /// `(exported name, local expression)` pairs.
    exports: Vec<(String, String)>,
    requests: Vec<Request>,
    top_level: BTreeSet<String>,
    is_module: bool,
    counter: usize,
}

/// Parse `source` and rewrite it for the registry.
///
/// Sources that fail to parse as ES modules are retried as scripts, which
/// covers sloppy-mode CommonJS and UMD files.
pub fn rewrite_module(
    path: &Path,
    source: &str,
    options: RewriteOptions<'_>,
) -> Result<RewrittenModule, StageError> {
    let allocator = Allocator::default();
    let mut ret = Parser::new(&allocator, source, SourceType::mjs()).parse();
    if !ret.errors.is_empty() {
        let script = Parser::new(&allocator, source, SourceType::cjs()).parse();
        if script.errors.is_empty() {
            ret = script;
        }
    }
    if let Some(err) = ret.errors.first() {
        return Err(StageError::transform(path, err.to_string()));
    }

    let mut collector = Collector {
        options,
        ..Collector::default()
    };
    collector.visit_program(path, source, &ret.program)?;
    collector.collect_requires(source);

    let insert = ret
        .program
        .directives
        .last()
        .map(|d| d.span.end as usize)
        .unwrap_or(0);
    Ok(collector.finish(source, insert))
}

fn export_name(name: &ModuleExportName<'_>) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(lit) => lit.value.to_string(),
    }
}

/// JSON string literal, which is also a valid JS string literal.
fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
}

fn span_text<'s>(source: &'s str, node: &impl GetSpan) -> &'s str {
    let span = node.span();
    &source[span.start as usize..span.end as usize]
}

impl<'o> Collector<'o> {
    fn fresh(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("__{prefix}_{}", self.counter)
    }

    fn request(&mut self, specifier: &str, kind: RequestKind) {
        let exists = self
            .requests
            .iter()
            .any(|r| r.specifier == specifier && (r.kind == kind || r.kind == RequestKind::Import));
        if !exists {
            self.requests.push(Request {
                specifier: specifier.to_string(),
                kind,
            });
        }
    }

    fn bind(&mut self, id: Option<&BindingIdentifier<'_>>) -> Option<String> {
        let name = id?.name.to_string();
        self.top_level.insert(name.clone());
        Some(name)
    }

    fn replace(&mut self, node: &impl GetSpan, text: String) {
        let span = node.span();
        self.edits.push(Edit {
            start: span.start as usize,
            end: span.end as usize,
            text,
        });
    }

    fn visit_program(
        &mut self,
        path: &Path,
        source: &str,
        program: &Program<'_>,
    ) -> Result<(), StageError> {
        for stmt in &program.body {
            match stmt {
                Statement::ImportDeclaration(decl) => {
                    self.is_module = true;
                    self.import(decl);
                    self.replace(&**decl, String::new());
                }
                Statement::ExportNamedDeclaration(decl) => {
                    self.is_module = true;
                    let text = if let Some(declaration) = &decl.declaration {
                        self.export_declaration(path, declaration)?;
                        span_text(source, declaration).to_string()
                    } else if let Some(from) = &decl.source {
                        let module = self.fresh("reexport");
                        self.request(from.value.as_str(), RequestKind::Import);
                        for spec in &decl.specifiers {
                            let local = export_name(&spec.local);
                            self.exports
                                .push((export_name(&spec.exported), format!("{module}[{}]", quote(&local))));
                        }
                        format!("var {module} = require({});", quote(from.value.as_str()))
                    } else {
                        for spec in &decl.specifiers {
                            self.exports
                                .push((export_name(&spec.exported), export_name(&spec.local)));
                        }
                        String::new()
                    };
                    self.replace(&**decl, text);
                }
                Statement::ExportDefaultDeclaration(decl) => {
                    self.is_module = true;
                    let text = span_text(source, &decl.declaration).to_string();
                    let named = match &decl.declaration {
                        ExportDefaultDeclarationKind::FunctionDeclaration(f) => self.bind(f.id.as_ref()),
                        ExportDefaultDeclarationKind::ClassDeclaration(c) => self.bind(c.id.as_ref()),
                        _ => None,
                    };
                    let text = match named {
                        Some(local) => {
                            self.exports.push(("default".to_string(), local));
                            text
                        }
                        None => format!("exports.default = {text};"),
                    };
                    self.replace(&**decl, text);
                }
                Statement::ExportAllDeclaration(decl) => {
                    self.is_module = true;
                    let specifier = decl.source.value.as_str();
                    self.request(specifier, RequestKind::Import);
                    let text = match &decl.exported {
                        Some(name) => {
                            let module = self.fresh("reexport");
                            self.exports.push((export_name(name), module.clone()));
                            format!("var {module} = require({});", quote(specifier))
                        }
                        None => format!(
                            "(function (m) {{ for (var k in m) if (k !== \"default\" && !Object.prototype.hasOwnProperty.call(exports, k)) (function (k) {{ Object.defineProperty(exports, k, {{ enumerable: true, get: function () {{ return m[k]; }} }}); }})(k); }})(require({}));",
                            quote(specifier)
                        ),
                    };
                    self.replace(&**decl, text);
                }
                Statement::VariableDeclaration(decl) => {
                    for declarator in &decl.declarations {
                        self.bind(declarator.id.get_binding_identifier());
                    }
                }
                Statement::FunctionDeclaration(f) => {
                    self.bind(f.id.as_ref());
                }
                Statement::ClassDeclaration(c) => {
                    self.bind(c.id.as_ref());
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn export_declaration(&mut self, path: &Path, declaration: &Declaration<'_>) -> Result<(), StageError> {
        let names: Vec<String> = match declaration {
            Declaration::VariableDeclaration(decl) => {
                let mut names = Vec::new();
                for declarator in &decl.declarations {
                    let name = self.bind(declarator.id.get_binding_identifier()).ok_or_else(|| {
                        StageError::transform(path, "destructuring in export declarations is not supported")
                    })?;
                    names.push(name);
                }
                names
            }
            Declaration::FunctionDeclaration(f) => self.bind(f.id.as_ref()).into_iter().collect(),
            Declaration::ClassDeclaration(c) => self.bind(c.id.as_ref()).into_iter().collect(),
            _ => Vec::new(),
        };
        for name in names {
            self.exports.push((name.clone(), name));
        }
        Ok(())
    }

    fn import(&mut self, decl: &ImportDeclaration<'_>) {
        let specifier = decl.source.value.as_str();

        let Some(specifiers) = &decl.specifiers else {
            self.request(specifier, RequestKind::Import);
            self.imports.push(format!("require({});", quote(specifier)));
            return;
        };

        let cherry_pick = self.options.cherry_pick.iter().any(|lib| lib == specifier)
            && !specifiers.is_empty()
            && specifiers
                .iter()
                .all(|s| matches!(s, ImportDeclarationSpecifier::ImportSpecifier(_)));
        if cherry_pick {
            for spec in specifiers {
                if let ImportDeclarationSpecifier::ImportSpecifier(spec) = spec {
                    let method = format!("{specifier}/{}", export_name(&spec.imported));
                    let local = spec.local.name.to_string();
                    self.top_level.insert(local.clone());
                    self.request(&method, RequestKind::Import);
                    self.import_default(&local, &method);
                }
            }
            return;
        }

        self.request(specifier, RequestKind::Import);
        let module = self.fresh("import");
        self.imports
            .push(format!("var {module} = require({});", quote(specifier)));
        for spec in specifiers {
            match spec {
                ImportDeclarationSpecifier::ImportDefaultSpecifier(spec) => {
                    let local = spec.local.name.to_string();
                    self.imports.push(format!(
                        "var {local} = {module} && {module}.__esModule ? {module}.default : {module};"
                    ));
                    self.top_level.insert(local);
                }
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(spec) => {
                    let local = spec.local.name.to_string();
                    self.imports.push(format!("var {local} = {module};"));
                    self.top_level.insert(local);
                }
                ImportDeclarationSpecifier::ImportSpecifier(spec) => {
                    let local = spec.local.name.to_string();
                    let imported = export_name(&spec.imported);
                    self.imports
                        .push(format!("var {local} = {module}[{}];", quote(&imported)));
                    self.top_level.insert(local);
                }
            }
        }
    }

    fn import_default(&mut self, local: &str, specifier: &str) {
        let module = self.fresh("import");
        self.imports
            .push(format!("var {module} = require({});", quote(specifier)));
        self.imports.push(format!(
            "var {local} = {module} && {module}.__esModule ? {module}.default : {module};"
        ));
    }

    fn collect_requires(&mut self, source: &str) {
        for caps in REQUIRE_CALL.captures_iter(source) {
            if let Some(specifier) = caps.get(1).or_else(|| caps.get(2)) {
                self.request(specifier.as_str(), RequestKind::Require);
            }
        }
    }

    fn finish(mut self, source: &str, insert: usize) -> RewrittenModule {
        let mut header = String::new();
        if self.is_module {
            header.push_str("Object.defineProperty(exports, \"__esModule\", { value: true });\n");
        }
        for (name, local) in &self.exports {
            header.push_str(&format!(
                "Object.defineProperty(exports, {}, {{ enumerable: true, get: function () {{ return {local}; }} }});\n",
                quote(name)
            ));
        }
        for line in &self.imports {
            header.push_str(line);
            header.push('\n');
        }

        self.edits.sort_by_key(|e| e.start);

        let mut code = String::with_capacity(source.len() + header.len() + 1);
        code.push_str(&source[..insert]);
        code.push('\n');
        if self.is_module {
            code.push_str("\"use strict\";\n");
        }
        let insert_at = code.len();
        code.push_str(&header);

        let mut cursor = insert;
        for edit in &self.edits {
            code.push_str(&source[cursor..edit.start]);
            code.push_str(&edit.text);
            cursor = edit.end;
        }
        code.push_str(&source[cursor..]);

        RewrittenModule {
            code,
            insert_at,
            requests: self.requests,
            top_level: self.top_level,
        }
    }
}
