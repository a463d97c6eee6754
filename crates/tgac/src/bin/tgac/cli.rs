//! tgac cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; tgac ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate the atlantis configuration
    ///
    /// Writes to stdout unless --output is given
    #[command(alias = "gen")]
    Generate(GenerateCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct GenerateCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub output: OutputArgs,

    #[clap(flatten)]
    pub project: ProjectArgs,

    /// What to do when a single module cannot be resolved
    #[arg(long = "on-module-error", default_value_t)]
    pub on_module_error: OnModuleError,
}

#[derive(Parser, Debug)]
pub struct InputArgs {
    /// Root of the module tree
    #[clap(short = 'r', long = "root", default_value = ".")]
    pub root: PathBuf,

    /// Name of the module configuration file
    #[clap(long = "file-name", default_value = "terragrunt.hcl")]
    pub file_name: String,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    /// Write to this file instead of stdout
    ///
    /// Workflows of an existing file are preserved.
    #[clap(short = 'o', long = "output")]
    pub output_file: Option<PathBuf>,

    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,

    /// Carry `workflows` over from an existing output file
    #[arg(long = "preserve-workflows", default_value_t = true, action = clap::ArgAction::Set)]
    pub preserve_workflows: bool,
}

#[derive(Parser, Debug)]
pub struct ProjectArgs {
    /// Merge automatically after all projects were applied
    #[clap(long = "automerge")]
    pub automerge: bool,

    /// Enable autoplan for projects that do not declare atlantis_autoplan
    #[arg(long = "autoplan", default_value_t = true, action = clap::ArgAction::Set)]
    pub autoplan: bool,

    /// Plan and apply projects in parallel
    #[clap(long = "parallel")]
    pub parallel: bool,

    /// Delete the source branch on merge (global default)
    #[clap(long = "delete-source-branch-on-merge")]
    pub delete_source_branch_on_merge: bool,

    /// Workflow for projects that do not declare atlantis_workflow
    #[clap(short = 'w', long = "workflow")]
    pub workflow: Option<String>,

    /// Name projects after their directory
    #[clap(long = "create-project-name")]
    pub create_project_name: bool,

    /// Use the project name as workspace
    #[clap(long = "create-workspace")]
    pub create_workspace: bool,

    /// Only create projects for modules with atlantis_project = true
    #[clap(long = "use-project-markers")]
    pub use_project_markers: bool,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Default, Debug)]
pub enum OnModuleError {
    #[default]
    Abort,
    Skip,
}

impl std::fmt::Display for OnModuleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OnModuleError::Abort => f.write_str("abort"),
            OnModuleError::Skip => f.write_str("skip"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// Discovered module directories
    Modules,
    /// Resolved settings of every module
    Resolved,
}
