mod cli;

use tgac::aggregate::{Aggregator, OnModuleError, Options};
use tgac::atlantis::AtlantisConfig;
use tgac::module_file::FsLoader;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("TGAC_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Generate(generate_cli) => generate(generate_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn generate(cli: cli::GenerateCommand) -> anyhow::Result<()> {
    let root = cli.input.root.canonicalize()?;
    let modules = tgac::discovery::discover(&root, &cli.input.file_name)?;
    anyhow::ensure!(
        !modules.is_empty(),
        "No {} files found below {}",
        cli.input.file_name,
        root.display()
    );

    // read before generating, a corrupt previous output must abort the run
    let prior = match (&cli.output.output_file, cli.output.preserve_workflows) {
        (Some(output_file), true) => tgac::prior_output::read_prior_output(output_file)?,
        _ => None,
    };

    let mut aggregator = Aggregator::new(&root, options(&cli), FsLoader);
    let mut generated = aggregator.aggregate(&modules)?;

    for failure in &generated.failures {
        tracing::warn!(module=%failure.module.display(), error=%failure.error, "module left out");
    }

    tgac::prior_output::carry_forward(&mut generated.config, prior);

    output(&cli.output, &generated.config)
}

fn options(cli: &cli::GenerateCommand) -> Options {
    let project = &cli.project;
    Options {
        automerge: project.automerge,
        parallel_plan: project.parallel,
        parallel_apply: project.parallel,
        delete_source_branch_on_merge: project.delete_source_branch_on_merge,
        autoplan: project.autoplan,
        default_workflow: project.workflow.clone(),
        create_project_name: project.create_project_name,
        create_workspace: project.create_workspace,
        use_project_markers: project.use_project_markers,
        on_module_error: match cli.on_module_error {
            cli::OnModuleError::Abort => OnModuleError::Abort,
            cli::OnModuleError::Skip => OnModuleError::SkipAndWarn,
        },
    }
}

fn output(output: &cli::OutputArgs, config: &AtlantisConfig) -> anyhow::Result<()> {
    let rendered = match output.format {
        cli::OutputFormat::Yaml => config.to_yaml()?,
        cli::OutputFormat::Json => config.to_json()?,
    };

    match &output.output_file {
        Some(path) => {
            std::fs::write(path, rendered)?;
            tracing::info!(path=%path.display(), projects = config.projects.len(), "written");
        }
        None => print!("{rendered}"),
    }

    Ok(())
}

/// (tgac-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    use cli::DevSubCommand::*;

    let modules = tgac::discovery::discover(&cli.input.root, &cli.input.file_name)?;

    match cli.command {
        Modules => println!("{modules:#?}"),
        Resolved => {
            let mut resolver = tgac::resolver::Resolver::new(FsLoader);
            for module in &modules {
                let resolution = resolver.resolve(&module.config_file)?;
                println!("{}: {resolution:#?}", module.dir.display());
            }
        }
    }

    Ok(())
}
