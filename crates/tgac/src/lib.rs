//! # tgac - terragrunt atlantis config
//!
//! Generates an atlantis repo configuration (`atlantis.yaml`) from a tree of terragrunt modules.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `tgac` works internally.
//!
//! ### Module files
//!
//! A module is a directory with a `terragrunt.hcl` file. Atlantis settings are declared as locals:
//!
//! ```hcl
//! include "root" {
//!   path = find_in_parent_folders("root.hcl")
//! }
//!
//! locals {
//!   atlantis_workflow          = "prod"
//!   atlantis_plan_requirements = ["approved"]
//!   extra_atlantis_dependencies = ["../shared/versions.tf"]
//! }
//! ```
//!
//! [module_file::ModuleFile] parses one file and evaluates what we care about: `locals`, `include`
//! paths, `dependency`/`dependencies` paths and the `terraform` source. There is no general purpose
//! evaluation. A few path helpers (`get_terragrunt_dir()`, `find_in_parent_folders()`, `get_env()`)
//! are substituted with their result before evaluating, see [util].
//!
//! ### Extraction
//!
//! [locals::extract] picks the recognized `atlantis_*` keys out of the evaluated locals into a
//! [locals::ResolvedModuleConfig]. Every field is optional: "not declared" must stay distinguishable
//! from "declared as false/empty".
//!
//! ### Resolution
//!
//! [resolver::Resolver] follows `include`s depth first and folds parent and child records with
//! [locals::merge]:
//!
//! | field                        | rule                                   |
//! |------------------------------|----------------------------------------|
//! | scalars                      | child wins when declared               |
//! | plan/apply/import requirements | child list replaces parent list when declared (even `[]`) |
//! | `extra_atlantis_dependencies` | child entries are appended            |
//!
//! Multiple includes are folded in declaration order and the module's own locals are folded last.
//! Every file is resolved once (memoized by path) and include cycles are reported with the full path.
//!
//! ### Aggregation
//!
//! [aggregate::Aggregator] resolves each discovered module ([discovery::discover]), drops skipped
//! modules and modules that are not projects and projects the rest onto
//! [atlantis::ProjectEntry]s.
//!
//! ### Output
//!
//! [prior_output] reads the previous `atlantis.yaml` to carry its hand written `workflows` over. The
//! result is an [atlantis::AtlantisConfig] which gets serialized via [serde].
//!
pub mod aggregate;
pub mod atlantis;
pub mod discovery;
pub mod locals;
pub mod module_file;
pub mod prior_output;
pub mod resolver;
pub mod util;
pub mod value;
mod visit;
