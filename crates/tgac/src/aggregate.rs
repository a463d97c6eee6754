//! turn resolved modules into atlantis projects
use crate::atlantis::{AtlantisConfig, AutoplanConfig, ProjectEntry};
use crate::module_file::ModuleLoader;
use crate::resolver::{Resolution, ResolveError, Resolver};
use crate::util::{normalize_path, path_str_to_slash, relative_path, to_slash};
use indexmap::IndexSet;
use std::path::{Path, PathBuf};

/// Patterns every project watches in its own directory
pub const DEFAULT_WHEN_MODIFIED: &[&str] = &["*.hcl", "*.tf*"];

/// Settings of a generator run
#[derive(Debug, Clone)]
pub struct Options {
    pub automerge: bool,
    pub parallel_plan: bool,
    pub parallel_apply: bool,
    /// Global `delete_source_branch_on_merge`
    pub delete_source_branch_on_merge: bool,
    /// Autoplan for projects that do not declare `atlantis_autoplan`
    pub autoplan: bool,
    /// Workflow for projects that do not declare `atlantis_workflow`
    pub default_workflow: Option<String>,
    /// Name projects after their directory
    pub create_project_name: bool,
    /// Use the project name as workspace
    pub create_workspace: bool,
    /// Only modules with `atlantis_project = true` become projects
    pub use_project_markers: bool,
    pub on_module_error: OnModuleError,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            automerge: false,
            parallel_plan: false,
            parallel_apply: false,
            delete_source_branch_on_merge: false,
            autoplan: true,
            default_workflow: None,
            create_project_name: false,
            create_workspace: false,
            use_project_markers: false,
            on_module_error: OnModuleError::Abort,
        }
    }
}

/// What to do when a single module fails to resolve
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnModuleError {
    /// Fail the whole run
    #[default]
    Abort,
    /// Leave the module out and keep going
    SkipAndWarn,
}

/// A module directory found by discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredModule {
    pub dir: PathBuf,
    pub config_file: PathBuf,
    /// The directory contains `*.tf` files of its own
    pub has_terraform_files: bool,
    /// Carried to the project unchanged
    pub execution_order_group: Option<i64>,
}

impl DiscoveredModule {
    pub fn new(dir: impl Into<PathBuf>, config_file_name: &str) -> Self {
        let dir = dir.into();
        let config_file = dir.join(config_file_name);
        Self {
            dir,
            config_file,
            has_terraform_files: false,
            execution_order_group: None,
        }
    }
}

/// A declared dependency of a project, for schedulers that order plans and applies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    /// Project directory, relative to the root
    pub dir: String,
    /// Dependency, relative to the project directory
    pub depends_on: String,
}

#[derive(Debug)]
pub struct ModuleFailure {
    pub module: PathBuf,
    pub error: ResolveError,
}

/// Result of [Aggregator::aggregate]
#[derive(Debug)]
pub struct Generated {
    pub config: AtlantisConfig,
    pub dependency_edges: Vec<DependencyEdge>,
    /// Modules left out under [OnModuleError::SkipAndWarn]
    pub failures: Vec<ModuleFailure>,
}

pub struct Aggregator<L> {
    root: PathBuf,
    options: Options,
    resolver: Resolver<L>,
}

impl<L: ModuleLoader> Aggregator<L> {
    pub fn new(root: impl AsRef<Path>, options: Options, loader: L) -> Self {
        Self {
            root: normalize_path(root.as_ref()),
            options,
            resolver: Resolver::new(loader),
        }
    }

    /// Resolve every module and collect the resulting projects, in input order
    pub fn aggregate(&mut self, modules: &[DiscoveredModule]) -> Result<Generated, ResolveError> {
        let mut generated = Generated {
            config: AtlantisConfig {
                automerge: self.options.automerge,
                delete_source_branch_on_merge: self.options.delete_source_branch_on_merge,
                parallel_plan: self.options.parallel_plan,
                parallel_apply: self.options.parallel_apply,
                ..Default::default()
            },
            dependency_edges: vec![],
            failures: vec![],
        };

        for module in modules {
            let resolution = match self.resolver.resolve(&module.config_file) {
                Ok(resolution) => resolution,
                Err(error) => match self.options.on_module_error {
                    OnModuleError::Abort => return Err(error),
                    OnModuleError::SkipAndWarn => {
                        tracing::warn!(module=%module.dir.display(), %error, "module skipped");
                        generated.failures.push(ModuleFailure {
                            module: module.dir.clone(),
                            error,
                        });
                        continue;
                    }
                },
            };

            if resolution.config.is_skipped() {
                tracing::debug!(module=%module.dir.display(), "skipped by atlantis_skip");
                continue;
            }

            if !self.qualifies(module, &resolution) {
                tracing::debug!(module=%module.dir.display(), "not a project");
                continue;
            }

            let project = self.project(module, &resolution);
            generated
                .dependency_edges
                .extend(dependency_edges(&project.dir, &resolution));
            generated.config.projects.push(project);
        }

        tracing::info!(
            projects = generated.config.projects.len(),
            failures = generated.failures.len(),
            "aggregated"
        );

        Ok(generated)
    }

    fn qualifies(&self, module: &DiscoveredModule, resolution: &Resolution) -> bool {
        if resolution.config.is_marked_project() {
            return true;
        }

        if self.options.use_project_markers {
            return false;
        }

        resolution.terraform_source.is_some() || module.has_terraform_files
    }

    fn project(&self, module: &DiscoveredModule, resolution: &Resolution) -> ProjectEntry {
        let config = &resolution.config;
        let module_dir = normalize_path(&module.dir);
        let dir = to_slash(&relative_path(&self.root, &module_dir));

        let name = self
            .options
            .create_project_name
            .then(|| project_name(&dir));
        let workspace = if self.options.create_workspace {
            name.clone().or_else(|| Some(project_name(&dir)))
        } else {
            None
        };

        ProjectEntry {
            name,
            branch: config.branch_filter.clone(),
            workspace,
            execution_order_group: module.execution_order_group,
            delete_source_branch_on_merge: config.delete_source_branch_on_merge,
            repo_locking: config.repo_locking_enabled,
            autoplan: AutoplanConfig {
                when_modified: when_modified(&module_dir, resolution),
                enabled: config.autoplan_enabled.unwrap_or(self.options.autoplan),
            },
            terraform_version: config.terraform_version.clone(),
            plan_requirements: config.plan_requirements.clone(),
            apply_requirements: config.apply_requirements.clone(),
            import_requirements: config.import_requirements.clone(),
            workflow: config
                .workflow_name
                .clone()
                .or_else(|| self.options.default_workflow.clone()),
            dir,
        }
    }
}

/// `live/eu/app` becomes `live_eu_app`, the root directory becomes `root`
fn project_name(dir: &str) -> String {
    if dir == "." {
        return "root".to_string();
    }
    dir.replace('/', "_")
}

/// Patterns that trigger an autoplan, relative to the module directory
fn when_modified(module_dir: &Path, resolution: &Resolution) -> Vec<String> {
    let mut patterns: IndexSet<String> =
        DEFAULT_WHEN_MODIFIED.iter().map(|p| p.to_string()).collect();

    for include_file in &resolution.include_files {
        patterns.insert(to_slash(&relative_path(module_dir, include_file)));
    }

    if let Some(source) = resolution.terraform_source.as_deref() {
        if let Some(local_source) = local_module_dir(module_dir, source) {
            patterns.insert(format!("{local_source}/*.tf*"));
        }
    }

    for dependency in &resolution.dependencies {
        let dependency_dir = relative_to_module(module_dir, dependency);
        patterns.insert(format!("{dependency_dir}/*.hcl"));
        patterns.insert(format!("{dependency_dir}/*.tf*"));
    }

    for extra in &resolution.config.extra_dependency_paths {
        patterns.insert(relative_to_module(module_dir, extra));
    }

    patterns.into_iter().collect()
}

/// Local terraform sources (`./x`, `../x`, optionally with a `//subdir`) as a path relative to the
/// module directory, `None` for remote sources
fn local_module_dir(module_dir: &Path, source: &str) -> Option<String> {
    let source = path_str_to_slash(source);
    let is_local = source.starts_with("./") || source.starts_with("../") || source.starts_with('/');
    if !is_local {
        return None;
    }

    let source = source.replace("//", "/");
    Some(relative_to_module(module_dir, &source))
}

/// Normalize a declared path and express it relative to the module directory
fn relative_to_module(module_dir: &Path, declared: &str) -> String {
    let declared = Path::new(declared);
    let absolute = if declared.is_absolute() {
        declared.to_owned()
    } else {
        module_dir.join(declared)
    };
    to_slash(&relative_path(module_dir, &absolute))
}

fn dependency_edges(dir: &str, resolution: &Resolution) -> Vec<DependencyEdge> {
    resolution
        .dependencies
        .iter()
        .chain(resolution.config.extra_dependency_paths.iter())
        .map(|dependency| DependencyEdge {
            dir: dir.to_string(),
            depends_on: path_str_to_slash(dependency),
        })
        .collect()
}
