//! parsed and evaluated module configuration file
//!
//! [ModuleFile] is the boundary to the HCL parser. It tracks
//! - the source path
//! - the evaluated `locals` (absent when the file has no `locals` block)
//! - `include` references (in declaration order)
//! - `dependency`/`dependencies` paths
//! - the `terraform { source = ... }` value
//!
//! Everything else in the file is ignored. Failures are returned as values, the parser never unwinds
//! into the caller.
use crate::util::{normalize_path, path_str_to_slash, FunctionRewriter};
use crate::value::{self, EvaluatedScope};
use crate::visit::VisitFuncCallsMut;
use hcl::eval::{Context, Evaluate};
use hcl::Expression;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct ModuleFile {
    pub path: PathBuf,
    pub locals: Option<EvaluatedScope>,
    /// Locals that could not be evaluated, with the reason
    pub unresolved_locals: IndexMap<String, String>,
    pub includes: Vec<IncludeRef>,
    /// `dependency` config paths and `dependencies` paths as declared
    pub dependencies: Vec<String>,
    /// Empty when the file declares a source that could not be evaluated
    pub terraform_source: Option<String>,
}

/// Reference from a module file to a parent configuration file
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeRef {
    pub label: Option<String>,
    /// Normalized, relative paths are resolved against the including file's directory
    pub path: PathBuf,
}

impl ModuleFile {
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        tracing::info!(path=%path.display(), "loading file");

        let source = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_owned(),
            source,
        })?;

        Self::parse(&source, path)
    }

    /// Parse a module file from source text
    ///
    /// Files ending in `.json` are read as HCL-JSON, everything else as native HCL.
    pub fn parse(source: &str, path: impl Into<PathBuf>) -> Result<Self, LoadError> {
        let path = path.into();

        if path.extension().is_some_and(|ext| ext == "json") {
            Self::parse_json(source, path)
        } else {
            Self::parse_hcl(source, path)
        }
    }

    fn parse_hcl(source: &str, path: PathBuf) -> Result<Self, LoadError> {
        let body: hcl::Body = hcl_edit::parser::parse_body(source)
            .map_err(|err| SyntaxError::new(&path, err))?
            .into();

        let dir = module_dir(&path);
        let mut rewriter = FunctionRewriter::new(&dir);
        let mut rewritten = |expr: &Expression| {
            let mut expr = expr.clone();
            expr.visit_func_calls_mut(&mut rewriter);
            expr
        };

        let mut locals: Option<IndexMap<String, Expression>> = None;
        let mut includes = vec![];
        let mut dependencies = vec![];
        let mut terraform_source = None;

        for block in body.blocks() {
            match block.identifier.as_str() {
                "locals" => {
                    let locals = locals.get_or_insert_with(IndexMap::new);
                    for attribute in block.body.attributes() {
                        locals.insert(attribute.key.to_string(), rewritten(&attribute.expr));
                    }
                }
                "include" => {
                    let label = block.labels.first().map(|label| label.as_str().to_string());
                    let expr = block_attribute(block, "path").map(&mut rewritten);
                    includes.push((label, expr));
                }
                "dependency" => {
                    if let Some(expr) = block_attribute(block, "config_path") {
                        dependencies.push(("dependency.config_path", rewritten(expr)));
                    }
                }
                "dependencies" => {
                    if let Some(expr) = block_attribute(block, "paths") {
                        dependencies.push(("dependencies.paths", rewritten(expr)));
                    }
                }
                "terraform" => {
                    if let Some(expr) = block_attribute(block, "source") {
                        terraform_source = Some(rewritten(expr));
                    }
                }
                _ => {}
            }
        }

        let mut file = ModuleFile {
            path,
            ..Default::default()
        };

        let context = match locals {
            Some(locals) => {
                let (scope, unresolved) = evaluate_locals(locals);
                let context = locals_context(&scope);
                file.locals = Some(scope);
                file.unresolved_locals = unresolved;
                context
            }
            None => locals_context(&EvaluatedScope::new()),
        };

        for (label, expr) in includes {
            let name = match &label {
                Some(label) => format!("include.{label}.path"),
                None => "include.path".to_string(),
            };
            let Some(expr) = expr else {
                return Err(file.evaluation_error(name, "missing attribute `path`"));
            };
            let include_path = file.evaluate_string(&expr, &context, &name)?;
            file.includes.push(IncludeRef {
                label,
                path: normalize_path(&dir.join(include_path)),
            });
        }

        for (name, expr) in dependencies {
            let value = expr
                .evaluate(&context)
                .map_err(|err| file.evaluation_error(name, err))?;
            match name {
                "dependencies.paths" => {
                    let paths = value::coerce_string_list(&value)
                        .map_err(|err| file.evaluation_error(name, err))?;
                    file.dependencies.extend(
                        paths
                            .unwrap_or_default()
                            .iter()
                            .map(|path| path_str_to_slash(path)),
                    );
                }
                _ => {
                    if let Some(path) = value::coerce_string(&value)
                        .map_err(|err| file.evaluation_error(name, err))?
                    {
                        file.dependencies.push(path_str_to_slash(&path));
                    }
                }
            }
        }

        file.terraform_source = terraform_source.map(|expr| {
            match expr.evaluate(&context).map(|value| value::coerce_string(&value)) {
                Ok(Ok(Some(source))) => source,
                Ok(_) => String::new(),
                Err(err) => {
                    tracing::debug!(path=%file.path.display(), %err, "terraform source not evaluated");
                    String::new()
                }
            }
        });

        Ok(file)
    }

    fn parse_json(source: &str, path: PathBuf) -> Result<Self, LoadError> {
        let document: serde_json::Value =
            serde_json::from_str(source).map_err(|err| SyntaxError::new(&path, err))?;
        let serde_json::Value::Object(mut root) = document else {
            return Err(SyntaxError::new(&path, "expected an object at the top level").into());
        };

        let dir = module_dir(&path);
        let mut file = ModuleFile {
            path,
            ..Default::default()
        };

        if let Some(locals) = root.remove("locals") {
            let serde_json::Value::Object(locals) = locals else {
                return Err(SyntaxError::new(&file.path, "`locals` must be an object").into());
            };
            file.locals = Some(
                locals
                    .into_iter()
                    .map(|(key, value)| (key, value::from_json(value)))
                    .collect(),
            );
        }

        match root.remove("include") {
            None => {}
            Some(serde_json::Value::Object(include)) if include.contains_key("path") => {
                let path = json_string(&file, &include, "path", "include.path")?;
                file.includes.push(IncludeRef {
                    label: None,
                    path: normalize_path(&dir.join(path)),
                });
            }
            Some(serde_json::Value::Object(labelled)) => {
                for (label, include) in labelled {
                    let name = format!("include.{label}.path");
                    let serde_json::Value::Object(include) = include else {
                        return Err(file.evaluation_error(name, "expected an object"));
                    };
                    let path = json_string(&file, &include, "path", &name)?;
                    file.includes.push(IncludeRef {
                        label: Some(label),
                        path: normalize_path(&dir.join(path)),
                    });
                }
            }
            Some(_) => return Err(file.evaluation_error("include", "expected an object")),
        }

        if let Some(serde_json::Value::Object(dependency_blocks)) = root.remove("dependency") {
            for (label, dependency) in dependency_blocks {
                let name = format!("dependency.{label}.config_path");
                let serde_json::Value::Object(dependency) = dependency else {
                    return Err(file.evaluation_error(name, "expected an object"));
                };
                let config_path = json_string(&file, &dependency, "config_path", &name)?;
                file.dependencies.push(path_str_to_slash(&config_path));
            }
        }

        if let Some(serde_json::Value::Object(mut dependencies)) = root.remove("dependencies") {
            if let Some(paths) = dependencies.remove("paths") {
                let paths = value::coerce_string_list(&value::from_json(paths))
                    .map_err(|err| file.evaluation_error("dependencies.paths", err))?;
                file.dependencies.extend(
                    paths
                        .unwrap_or_default()
                        .iter()
                        .map(|path| path_str_to_slash(path)),
                );
            }
        }

        if let Some(serde_json::Value::Object(terraform)) = root.remove("terraform") {
            if let Some(serde_json::Value::String(source)) = terraform.get("source") {
                file.terraform_source = Some(source.clone());
            }
        }

        Ok(file)
    }

    fn evaluate_string(
        &self,
        expr: &Expression,
        context: &Context,
        name: &str,
    ) -> Result<String, LoadError> {
        let value = expr
            .evaluate(context)
            .map_err(|err| self.evaluation_error(name, err))?;

        match value::coerce_string(&value) {
            Ok(Some(s)) => Ok(s),
            Ok(None) => Err(self.evaluation_error(name, "must not be null")),
            Err(err) => Err(self.evaluation_error(name, err)),
        }
    }

    fn evaluation_error(&self, name: impl Into<String>, message: impl ToString) -> LoadError {
        LoadError::Evaluation {
            path: self.path.clone(),
            name: name.into(),
            message: message.to_string(),
        }
    }
}

/// Evaluate `locals` until no more progress is made
///
/// Locals may refer to each other (`local.other`) in any order. Every pass evaluates what it can
/// with the values known so far. Whatever is left when a pass makes no progress is unresolved.
fn evaluate_locals(
    pending: IndexMap<String, Expression>,
) -> (EvaluatedScope, IndexMap<String, String>) {
    let declaration_order: Vec<String> = pending.keys().cloned().collect();
    let mut pending = pending;
    let mut resolved = EvaluatedScope::new();
    let mut errors = IndexMap::new();

    while !pending.is_empty() {
        let context = locals_context(&resolved);
        let before = pending.len();
        errors.clear();

        pending.retain(|name, expr| match expr.evaluate(&context) {
            Ok(value) => {
                resolved.insert(name.clone(), value);
                false
            }
            Err(err) => {
                errors.insert(name.clone(), err.to_string());
                true
            }
        });

        if pending.len() == before {
            break;
        }
    }

    let scope = declaration_order
        .into_iter()
        .filter_map(|name| resolved.swap_remove(&name).map(|value| (name, value)))
        .collect();

    for (name, err) in &errors {
        tracing::trace!(%name, %err, "local not evaluated");
    }

    (scope, errors)
}

fn locals_context(scope: &EvaluatedScope) -> Context<'static> {
    let mut context = Context::new();
    let locals: hcl::value::Map<String, hcl::Value> = scope
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    context.declare_var(hcl::Identifier::unchecked("local"), hcl::Value::Object(locals));
    context
}

fn block_attribute<'a>(block: &'a hcl::Block, key: &str) -> Option<&'a Expression> {
    block
        .body
        .attributes()
        .find(|attribute| attribute.key.as_str() == key)
        .map(|attribute| &attribute.expr)
}

fn json_string(
    file: &ModuleFile,
    object: &serde_json::Map<String, serde_json::Value>,
    key: &str,
    name: &str,
) -> Result<String, LoadError> {
    match object.get(key) {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(file.evaluation_error(name, "expected a string")),
        None => Err(file.evaluation_error(name, format!("missing attribute `{key}`"))),
    }
}

fn module_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_owned(),
        _ => PathBuf::from("."),
    }
}

/// Source of parsed module files
///
/// The resolver loads every file through this trait so it can run against the filesystem as well
/// as against in-memory sources.
pub trait ModuleLoader {
    fn load(&self, path: &Path) -> Result<ModuleFile, LoadError>;
}

/// Loads module files from disk
#[derive(Debug, Default, Clone, Copy)]
pub struct FsLoader;

impl ModuleLoader for FsLoader {
    fn load(&self, path: &Path) -> Result<ModuleFile, LoadError> {
        ModuleFile::load(path)
    }
}

/// Parses module files from an in-memory path to source map
impl ModuleLoader for std::collections::HashMap<PathBuf, String> {
    fn load(&self, path: &Path) -> Result<ModuleFile, LoadError> {
        let source = self.get(path).ok_or_else(|| LoadError::Io {
            path: path.to_owned(),
            source: std::io::ErrorKind::NotFound.into(),
        })?;
        ModuleFile::parse(source, path)
    }
}

#[derive(thiserror::Error, Debug)]
#[error("unable to parse {}: {message}", .path.display())]
pub struct SyntaxError {
    pub path: PathBuf,
    pub message: String,
}

impl SyntaxError {
    fn new(path: &Path, message: impl ToString) -> Self {
        Self {
            path: path.to_owned(),
            message: message.to_string(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("unable to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("unable to evaluate `{name}` in {}: {message}", .path.display())]
    Evaluation {
        path: PathBuf,
        name: String,
        message: String,
    },
}

impl LoadError {
    pub fn path(&self) -> &Path {
        match self {
            LoadError::Io { path, .. } => path,
            LoadError::Syntax(err) => &err.path,
            LoadError::Evaluation { path, .. } => path,
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> ModuleFile {
        ModuleFile::parse(source, "/repo/live/app/terragrunt.hcl").expect("must parse")
    }

    #[test]
    fn no_locals_block() {
        let file = parse(r#"inputs = { a = 1 }"#);
        assert!(file.locals.is_none());
        assert!(file.includes.is_empty());
    }

    #[test]
    fn locals_reference_each_other() {
        let file = parse(
            r#"
            locals {
              atlantis_workflow = "${local.env}-workflow"
              env               = "prod"
              unrelated         = some_function()
            }
            "#,
        );

        let locals = file.locals.expect("locals block exists");
        assert_eq!(
            locals.keys().collect::<Vec<_>>(),
            vec!["atlantis_workflow", "env"]
        );
        assert_eq!(
            locals["atlantis_workflow"],
            hcl::Value::from("prod-workflow")
        );
        assert!(file.unresolved_locals.contains_key("unrelated"));
    }

    #[test]
    fn includes_in_declaration_order() {
        let file = parse(
            r#"
            include "root" {
              path = "../../root.hcl"
            }
            include "env" {
              path = "${get_terragrunt_dir()}/../env.hcl"
            }
            "#,
        );

        assert_eq!(
            file.includes,
            vec![
                IncludeRef {
                    label: Some("root".to_string()),
                    path: PathBuf::from("/repo/root.hcl"),
                },
                IncludeRef {
                    label: Some("env".to_string()),
                    path: PathBuf::from("/repo/live/env.hcl"),
                },
            ]
        );
    }

    #[test]
    fn include_without_path() {
        let err = ModuleFile::parse("include {}", "terragrunt.hcl").expect_err("must fail");
        assert!(matches!(err, LoadError::Evaluation { name, .. } if name == "include.path"));
    }

    #[test]
    fn dependencies_and_terraform_source() {
        let file = parse(
            r#"
            terraform {
              source = "../../modules//app"
            }
            dependency "vpc" {
              config_path = "../vpc"
            }
            dependencies {
              paths = ["..\\db", "../cache"]
            }
            "#,
        );

        assert_eq!(file.dependencies, vec!["../vpc", "../db", "../cache"]);
        assert_eq!(file.terraform_source.as_deref(), Some("../../modules//app"));
    }

    #[test]
    fn syntax_error_names_file() {
        let err = ModuleFile::parse("locals {", "/repo/broken/terragrunt.hcl")
            .expect_err("must fail");
        let LoadError::Syntax(err) = err else {
            panic!("expected a syntax error, got {err:?}");
        };
        assert_eq!(err.path, PathBuf::from("/repo/broken/terragrunt.hcl"));
    }

    #[test]
    fn json_module_file() {
        let file = ModuleFile::parse(
            r#"{
              "locals": { "atlantis_skip": true },
              "include": { "root": { "path": "../root.hcl.json" } },
              "dependency": { "vpc": { "config_path": "../vpc" } }
            }"#,
            "/repo/app/terragrunt.hcl.json",
        )
        .expect("must parse");

        assert_eq!(
            file.locals.expect("locals exist")["atlantis_skip"],
            hcl::Value::Bool(true)
        );
        assert_eq!(file.includes[0].path, PathBuf::from("/repo/root.hcl.json"));
        assert_eq!(file.dependencies, vec!["../vpc"]);
    }

    #[test]
    fn json_syntax_error() {
        let err = ModuleFile::parse("{", "terragrunt.hcl.json").expect_err("must fail");
        assert!(matches!(err, LoadError::Syntax(_)));
    }
}
