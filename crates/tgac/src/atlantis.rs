//! atlantis repo configuration (`atlantis.yaml`)
//!
//! Unset values are omitted when serializing. `dir` and `autoplan` are always written.
use serde::{Deserialize, Serialize};

/// Schema version this crate writes
pub const CONFIG_VERSION: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtlantisConfig {
    pub version: u32,
    /// Merge after all projects were applied
    #[serde(default)]
    pub automerge: bool,
    #[serde(default)]
    pub delete_source_branch_on_merge: bool,
    #[serde(default)]
    pub parallel_plan: bool,
    #[serde(default)]
    pub parallel_apply: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<ProjectEntry>,
    /// Hand written workflow definitions
    ///
    /// Never generated, only carried over from a previous output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflows: Option<serde_yaml::Value>,
}

impl Default for AtlantisConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            automerge: false,
            delete_source_branch_on_merge: false,
            parallel_plan: false,
            parallel_apply: false,
            projects: vec![],
            workflows: None,
        }
    }
}

impl AtlantisConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Regex matching the base branch of pull requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Module directory relative to the repository root
    pub dir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_order_group: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_source_branch_on_merge: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_locking: Option<bool>,
    #[serde(default)]
    pub autoplan: AutoplanConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terraform_version: Option<String>,
    // requirement lists are written whenever declared, an empty list included, so atlantis does
    // not fall back to its server side defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_requirements: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_requirements: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_requirements: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoplanConfig {
    /// Patterns relative to the project directory
    #[serde(default)]
    pub when_modified: Vec<String>,
    #[serde(default)]
    pub enabled: bool,
}
