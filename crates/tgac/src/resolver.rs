//! include resolution
//!
//! A module file may include any number of parent files and each parent may include further files.
//! [Resolver::resolve] walks this forest depth first:
//!
//! 1. resolve every include, in declaration order
//! 2. fold the results (later includes override earlier ones)
//! 3. fold the module's own `locals` on top
//!
//! Results are memoized per normalized path, so a parent reached through several children is loaded
//! once. The current include path is tracked to detect cycles.
use crate::locals::{self, ExtractError, ResolvedModuleConfig, RECOGNIZED_KEYS};
use crate::module_file::{LoadError, ModuleLoader};
use crate::util::normalize_path;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Everything a module inherits from its include chain, merged with its own declarations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub config: ResolvedModuleConfig,
    /// Transitively included files, parents before children
    pub include_files: Vec<PathBuf>,
    /// Declared dependency paths, inherited ones first
    pub dependencies: Vec<String>,
    /// The closest declared terraform source
    pub terraform_source: Option<String>,
}

impl Resolution {
    /// Fold a resolved parent (reached through `include_path`) into what was inherited so far
    fn inherit(mut self, include_path: PathBuf, parent: Resolution) -> Self {
        self.config = locals::merge(self.config, parent.config);
        self.include_files.extend(parent.include_files);
        self.include_files.push(include_path);
        self.dependencies.extend(parent.dependencies);
        self.terraform_source = parent.terraform_source.or(self.terraform_source);
        self
    }
}

pub struct Resolver<L> {
    loader: L,
    cache: HashMap<PathBuf, Resolution>,
}

impl<L: ModuleLoader> Resolver<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            cache: Default::default(),
        }
    }

    /// Resolve the module file at `path`
    pub fn resolve(&mut self, path: &Path) -> Result<Resolution, ResolveError> {
        let mut include_stack = vec![];
        self.resolve_on_stack(&normalize_path(path), &mut include_stack)
    }

    /// Number of files resolved so far
    pub fn resolved_count(&self) -> usize {
        self.cache.len()
    }

    #[tracing::instrument(level = "debug", skip_all, fields(path = %path.display()))]
    fn resolve_on_stack(
        &mut self,
        path: &Path,
        include_stack: &mut Vec<PathBuf>,
    ) -> Result<Resolution, ResolveError> {
        if let Some(position) = include_stack.iter().position(|visited| visited == path) {
            let mut cycle = include_stack[position..].to_vec();
            cycle.push(path.to_owned());
            return Err(ResolveError::CyclicInclude { cycle });
        }

        if let Some(resolved) = self.cache.get(path) {
            tracing::trace!("memoized");
            return Ok(resolved.clone());
        }

        let file = self.loader.load(path)?;

        if let Some((name, message)) = file
            .unresolved_locals
            .iter()
            .find(|(name, _)| RECOGNIZED_KEYS.contains(&name.as_str()))
        {
            return Err(ResolveError::UnresolvedLocal {
                path: path.to_owned(),
                name: name.clone(),
                message: message.clone(),
            });
        }

        let own = locals::extract(file.locals.as_ref()).map_err(|source| ResolveError::Extract {
            path: path.to_owned(),
            source,
        })?;

        include_stack.push(path.to_owned());
        let mut resolution = Resolution::default();
        for include in &file.includes {
            let parent = self.resolve_on_stack(&include.path, include_stack)?;
            resolution = resolution.inherit(include.path.clone(), parent);
        }
        include_stack.pop();

        resolution.config = locals::merge(resolution.config, own);
        resolution.dependencies.extend(file.dependencies);
        resolution.terraform_source = file.terraform_source.or(resolution.terraform_source);

        tracing::debug!(includes = file.includes.len(), "resolved");
        self.cache.insert(path.to_owned(), resolution.clone());

        Ok(resolution)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("invalid atlantis settings in {}", .path.display())]
    Extract {
        path: PathBuf,
        #[source]
        source: ExtractError,
    },
    #[error("unable to evaluate local `{name}` in {}: {message}", .path.display())]
    UnresolvedLocal {
        path: PathBuf,
        name: String,
        message: String,
    },
    #[error("cyclic include: {}", display_cycle(.cycle))]
    CyclicInclude { cycle: Vec<PathBuf> },
}

fn display_cycle(cycle: &[PathBuf]) -> String {
    cycle
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::module_file::ModuleFile;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    /// In-memory loader that counts how often each file is loaded
    #[derive(Default)]
    struct Files {
        sources: HashMap<PathBuf, String>,
        loads: RefCell<HashMap<PathBuf, usize>>,
    }

    impl Files {
        fn with(mut self, path: &str, source: &str) -> Self {
            self.sources.insert(PathBuf::from(path), source.to_string());
            self
        }
    }

    impl ModuleLoader for &Files {
        fn load(&self, path: &Path) -> Result<ModuleFile, LoadError> {
            *self.loads.borrow_mut().entry(path.to_owned()).or_default() += 1;
            self.sources.load(path)
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn no_includes_is_own_record() {
        let files = Files::default().with(
            "/live/app/terragrunt.hcl",
            r#"
            locals {
              atlantis_workflow = "prod"
              atlantis_autoplan = false
            }
            "#,
        );

        let resolution = Resolver::new(&files)
            .resolve(Path::new("/live/app/terragrunt.hcl"))
            .expect("must resolve");

        insta::assert_debug_snapshot!(resolution.config, @r###"
        ResolvedModuleConfig {
            branch_filter: None,
            delete_source_branch_on_merge: None,
            workflow_name: Some(
                "prod",
            ),
            terraform_version: None,
            autoplan_enabled: Some(
                false,
            ),
            repo_locking_enabled: None,
            skip: None,
            is_project: None,
            plan_requirements: None,
            apply_requirements: None,
            import_requirements: None,
            extra_dependency_paths: [],
        }
        "###);
    }

    #[test]
    fn child_inherits_explicit_empty_requirements() {
        let files = Files::default()
            .with(
                "/live/a/terragrunt.hcl",
                r#"
                locals {
                  atlantis_workflow          = "prod"
                  atlantis_plan_requirements = []
                }
                "#,
            )
            .with(
                "/live/b/terragrunt.hcl",
                r#"
                include {
                  path = "../a/terragrunt.hcl"
                }
                "#,
            );

        let resolution = Resolver::new(&files)
            .resolve(Path::new("/live/b/terragrunt.hcl"))
            .expect("must resolve");

        assert_eq!(resolution.config.workflow_name.as_deref(), Some("prod"));
        assert_eq!(resolution.config.plan_requirements, Some(vec![]));
        assert_eq!(
            resolution.include_files,
            vec![PathBuf::from("/live/a/terragrunt.hcl")]
        );
    }

    #[test]
    fn extra_dependencies_accumulate() {
        let files = Files::default()
            .with(
                "/live/c/terragrunt.hcl",
                r#"
                locals {
                  extra_atlantis_dependencies = ["../shared"]
                }
                "#,
            )
            .with(
                "/live/d/terragrunt.hcl",
                r#"
                include {
                  path = "../c/terragrunt.hcl"
                }
                locals {
                  extra_atlantis_dependencies = ["../other"]
                }
                "#,
            );

        let resolution = Resolver::new(&files)
            .resolve(Path::new("/live/d/terragrunt.hcl"))
            .expect("must resolve");

        assert_eq!(
            resolution.config.extra_dependency_paths,
            strings(&["../shared", "../other"])
        );
    }

    #[test]
    fn later_includes_override_earlier_ones() {
        let files = Files::default()
            .with(
                "/root.hcl",
                r#"
                locals {
                  atlantis_workflow = "root"
                  atlantis_branch   = "main"
                }
                "#,
            )
            .with(
                "/live/env.hcl",
                r#"
                include "root" {
                  path = "../root.hcl"
                }
                locals {
                  atlantis_workflow = "env"
                }
                "#,
            )
            .with(
                "/live/naming.hcl",
                r#"
                locals {
                  atlantis_workflow          = "naming"
                  atlantis_terraform_version = "1.5.7"
                }
                "#,
            )
            .with(
                "/live/app/terragrunt.hcl",
                r#"
                include "naming" {
                  path = "../naming.hcl"
                }
                include "env" {
                  path = "../env.hcl"
                }
                locals {
                  atlantis_repo_locking = false
                }
                "#,
            );

        let resolution = Resolver::new(&files)
            .resolve(Path::new("/live/app/terragrunt.hcl"))
            .expect("must resolve");

        assert_eq!(resolution.config.workflow_name.as_deref(), Some("env"));
        assert_eq!(resolution.config.branch_filter.as_deref(), Some("main"));
        assert_eq!(
            resolution.config.terraform_version.as_deref(),
            Some("1.5.7")
        );
        assert_eq!(resolution.config.repo_locking_enabled, Some(false));
        assert_eq!(
            resolution.include_files,
            vec![
                PathBuf::from("/live/naming.hcl"),
                PathBuf::from("/root.hcl"),
                PathBuf::from("/live/env.hcl"),
            ]
        );
    }

    #[test]
    fn own_declarations_override_includes() {
        let files = Files::default()
            .with("/root.hcl", "locals {\n atlantis_skip = true\n}")
            .with(
                "/app/terragrunt.hcl",
                "include {\n path = \"../root.hcl\"\n}\nlocals {\n atlantis_skip = false\n}",
            );

        let resolution = Resolver::new(&files)
            .resolve(Path::new("/app/terragrunt.hcl"))
            .expect("must resolve");

        assert_eq!(resolution.config.skip, Some(false));
    }

    #[test]
    fn self_include_is_a_cycle() {
        let files = Files::default().with(
            "/app/terragrunt.hcl",
            "include {\n path = \"terragrunt.hcl\"\n}",
        );

        let err = Resolver::new(&files)
            .resolve(Path::new("/app/terragrunt.hcl"))
            .expect_err("must fail");

        let ResolveError::CyclicInclude { cycle } = err else {
            panic!("expected a cycle, got {err:?}");
        };
        assert_eq!(
            cycle,
            vec![
                PathBuf::from("/app/terragrunt.hcl"),
                PathBuf::from("/app/terragrunt.hcl")
            ]
        );
    }

    #[test]
    fn mutual_include_is_a_cycle() {
        let files = Files::default()
            .with("/a.hcl", "include {\n path = \"b.hcl\"\n}")
            .with("/b.hcl", "include {\n path = \"a.hcl\"\n}")
            .with("/app/terragrunt.hcl", "include {\n path = \"../a.hcl\"\n}");

        let err = Resolver::new(&files)
            .resolve(Path::new("/app/terragrunt.hcl"))
            .expect_err("must fail");

        assert_eq!(
            err.to_string(),
            "cyclic include: /a.hcl -> /b.hcl -> /a.hcl"
        );
    }

    #[test]
    fn shared_parent_is_loaded_once() {
        let files = Files::default()
            .with("/root.hcl", "locals {\n atlantis_branch = \"main\"\n}")
            .with("/one/terragrunt.hcl", "include {\n path = \"../root.hcl\"\n}")
            .with("/two/terragrunt.hcl", "include {\n path = \"../root.hcl\"\n}");

        let mut resolver = Resolver::new(&files);
        for module in ["/one/terragrunt.hcl", "/two/terragrunt.hcl"] {
            let resolution = resolver.resolve(Path::new(module)).expect("must resolve");
            assert_eq!(resolution.config.branch_filter.as_deref(), Some("main"));
        }

        assert_eq!(resolver.resolved_count(), 3);
        assert_eq!(files.loads.borrow()[Path::new("/root.hcl")], 1);
    }

    #[test]
    fn missing_parent_names_file() {
        let files = Files::default().with(
            "/app/terragrunt.hcl",
            "include {\n path = \"../missing.hcl\"\n}",
        );

        let err = Resolver::new(&files)
            .resolve(Path::new("/app/terragrunt.hcl"))
            .expect_err("must fail");

        let ResolveError::Load(err) = err else {
            panic!("expected a load error, got {err:?}");
        };
        assert_eq!(err.path(), Path::new("/missing.hcl"));
    }

    #[test]
    fn unresolved_recognized_local_fails() {
        let files = Files::default().with(
            "/app/terragrunt.hcl",
            "locals {\n atlantis_workflow = read_terragrunt_config(\"x\").locals.wf\n unrelated = unknown()\n}",
        );

        let err = Resolver::new(&files)
            .resolve(Path::new("/app/terragrunt.hcl"))
            .expect_err("must fail");

        assert!(
            matches!(err, ResolveError::UnresolvedLocal { ref name, .. } if name == locals::WORKFLOW)
        );
    }

    #[test]
    fn dependencies_and_source_are_inherited() {
        let files = Files::default()
            .with(
                "/root.hcl",
                "terraform {\n source = \"../modules//base\"\n}\ndependency \"vpc\" {\n config_path = \"../vpc\"\n}",
            )
            .with(
                "/app/terragrunt.hcl",
                "include {\n path = \"../root.hcl\"\n}\ndependencies {\n paths = [\"../db\"]\n}",
            );

        let resolution = Resolver::new(&files)
            .resolve(Path::new("/app/terragrunt.hcl"))
            .expect("must resolve");

        assert_eq!(resolution.dependencies, strings(&["../vpc", "../db"]));
        assert_eq!(
            resolution.terraform_source.as_deref(),
            Some("../modules//base")
        );
    }
}
