//! atlantis settings declared as `locals`
//!
//! A module declares its settings in a `locals` block:
//!
//! ```hcl
//! locals {
//!   atlantis_workflow          = "prod"
//!   atlantis_plan_requirements = []
//!   extra_atlantis_dependencies = ["../shared"]
//! }
//! ```
//!
//! [extract] turns the evaluated block into a [ResolvedModuleConfig] and [merge] folds a child
//! record over a parent record.
use crate::util::path_str_to_slash;
use crate::value::{self, CoercionError, EvaluatedScope};

pub const BRANCH: &str = "atlantis_branch";
pub const DELETE_SOURCE_BRANCH_ON_MERGE: &str = "atlantis_delete_source_branch_on_merge";
pub const WORKFLOW: &str = "atlantis_workflow";
pub const TERRAFORM_VERSION: &str = "atlantis_terraform_version";
pub const AUTOPLAN: &str = "atlantis_autoplan";
pub const REPO_LOCKING: &str = "atlantis_repo_locking";
pub const SKIP: &str = "atlantis_skip";
pub const PROJECT: &str = "atlantis_project";
pub const PLAN_REQUIREMENTS: &str = "atlantis_plan_requirements";
pub const APPLY_REQUIREMENTS: &str = "atlantis_apply_requirements";
pub const IMPORT_REQUIREMENTS: &str = "atlantis_import_requirements";
/// Misspelled name accepted for compatibility with existing module trees
pub const IMPORT_REQUIREMENTS_LEGACY: &str = "atlantis_immport_requirements";
pub const EXTRA_DEPENDENCIES: &str = "extra_atlantis_dependencies";

/// All keys [extract] looks at
pub const RECOGNIZED_KEYS: &[&str] = &[
    BRANCH,
    DELETE_SOURCE_BRANCH_ON_MERGE,
    WORKFLOW,
    TERRAFORM_VERSION,
    AUTOPLAN,
    REPO_LOCKING,
    SKIP,
    PROJECT,
    PLAN_REQUIREMENTS,
    APPLY_REQUIREMENTS,
    IMPORT_REQUIREMENTS,
    IMPORT_REQUIREMENTS_LEGACY,
    EXTRA_DEPENDENCIES,
];

/// Atlantis settings of one module
///
/// `None` means "not declared". It is different from an explicit `false` or an explicit empty
/// list, and only declared values override inherited ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedModuleConfig {
    /// Regex matching the base branch the project applies to
    pub branch_filter: Option<String>,
    pub delete_source_branch_on_merge: Option<bool>,
    pub workflow_name: Option<String>,
    pub terraform_version: Option<String>,
    pub autoplan_enabled: Option<bool>,
    pub repo_locking_enabled: Option<bool>,
    /// The module does not produce a project
    pub skip: Option<bool>,
    /// The module produces a project even if discovery would not pick it
    pub is_project: Option<bool>,
    pub plan_requirements: Option<Vec<String>>,
    pub apply_requirements: Option<Vec<String>>,
    pub import_requirements: Option<Vec<String>>,
    /// Accumulates across the include chain, `/` separated
    pub extra_dependency_paths: Vec<String>,
}

impl ResolvedModuleConfig {
    pub fn is_skipped(&self) -> bool {
        self.skip == Some(true)
    }

    pub fn is_marked_project(&self) -> bool {
        self.is_project == Some(true)
    }
}

/// Extract the recognized keys of an evaluated `locals` block
///
/// A missing block (`None`) yields an all-unset record. Keys that are not recognized are ignored.
pub fn extract(scope: Option<&EvaluatedScope>) -> Result<ResolvedModuleConfig, ExtractError> {
    let mut resolved = ResolvedModuleConfig::default();

    let Some(scope) = scope else {
        return Ok(resolved);
    };

    let string = |key: &'static str| {
        scope
            .get(key)
            .map(value::coerce_string)
            .transpose()
            .map(Option::flatten)
            .map_err(|source| ExtractError::new(key, source))
    };
    let boolean = |key: &'static str| {
        scope
            .get(key)
            .map(value::coerce_bool)
            .transpose()
            .map(Option::flatten)
            .map_err(|source| ExtractError::new(key, source))
    };
    let list = |key: &'static str| {
        scope
            .get(key)
            .map(value::coerce_string_list)
            .transpose()
            .map(Option::flatten)
            .map_err(|source| ExtractError::new(key, source))
    };

    resolved.branch_filter = string(BRANCH)?;
    resolved.delete_source_branch_on_merge = boolean(DELETE_SOURCE_BRANCH_ON_MERGE)?;
    resolved.workflow_name = string(WORKFLOW)?;
    resolved.terraform_version = string(TERRAFORM_VERSION)?;
    resolved.autoplan_enabled = boolean(AUTOPLAN)?;
    resolved.repo_locking_enabled = boolean(REPO_LOCKING)?;
    resolved.skip = boolean(SKIP)?;
    resolved.is_project = boolean(PROJECT)?;
    resolved.plan_requirements = list(PLAN_REQUIREMENTS)?;
    resolved.apply_requirements = list(APPLY_REQUIREMENTS)?;
    resolved.import_requirements = match list(IMPORT_REQUIREMENTS)? {
        Some(requirements) => Some(requirements),
        None => list(IMPORT_REQUIREMENTS_LEGACY)?,
    };
    resolved.extra_dependency_paths = list(EXTRA_DEPENDENCIES)?
        .unwrap_or_default()
        .iter()
        .map(|path| path_str_to_slash(path))
        .collect();

    Ok(resolved)
}

/// Fold `child` over `parent`
///
/// - scalars and requirement lists: the child's value wins when declared
/// - extra dependency paths: the child's entries are appended to the parent's
pub fn merge(parent: ResolvedModuleConfig, child: ResolvedModuleConfig) -> ResolvedModuleConfig {
    let mut extra_dependency_paths = parent.extra_dependency_paths;
    extra_dependency_paths.extend(child.extra_dependency_paths);

    ResolvedModuleConfig {
        branch_filter: child.branch_filter.or(parent.branch_filter),
        delete_source_branch_on_merge: child
            .delete_source_branch_on_merge
            .or(parent.delete_source_branch_on_merge),
        workflow_name: child.workflow_name.or(parent.workflow_name),
        terraform_version: child.terraform_version.or(parent.terraform_version),
        autoplan_enabled: child.autoplan_enabled.or(parent.autoplan_enabled),
        repo_locking_enabled: child.repo_locking_enabled.or(parent.repo_locking_enabled),
        skip: child.skip.or(parent.skip),
        is_project: child.is_project.or(parent.is_project),
        plan_requirements: child.plan_requirements.or(parent.plan_requirements),
        apply_requirements: child.apply_requirements.or(parent.apply_requirements),
        import_requirements: child.import_requirements.or(parent.import_requirements),
        extra_dependency_paths,
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("local `{key}` has an unexpected type")]
pub struct ExtractError {
    pub key: &'static str,
    #[source]
    pub source: CoercionError,
}

impl ExtractError {
    fn new(key: &'static str, source: CoercionError) -> Self {
        Self { key, source }
    }
}
