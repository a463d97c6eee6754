//! find module directories below a root directory
use crate::aggregate::DiscoveredModule;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directories that never contain modules of their own
const IGNORED_DIRS: &[&str] = &[".terragrunt-cache", ".terraform", ".git"];

/// Every directory below `root` (including `root`) that contains `file_name`
///
/// The result is sorted by directory, so it is stable between runs.
pub fn discover(root: &Path, file_name: &str) -> Result<Vec<DiscoveredModule>, DiscoveryError> {
    let mut modules = vec![];

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && IGNORED_DIRS
                    .iter()
                    .any(|ignored| entry.file_name() == *ignored))
        });

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() || entry.file_name() != file_name {
            continue;
        }

        let Some(dir) = entry.path().parent() else {
            continue;
        };

        let module = DiscoveredModule {
            has_terraform_files: has_terraform_files(dir)?,
            ..DiscoveredModule::new(dir, file_name)
        };
        tracing::debug!(dir=%module.dir.display(), "module found");
        modules.push(module);
    }

    // the walk is depth first, a directory's file is seen after its subdirectories
    modules.sort_by(|a, b| a.dir.cmp(&b.dir));

    tracing::info!(root=%root.display(), modules = modules.len(), "discovery finished");
    Ok(modules)
}

fn has_terraform_files(dir: &Path) -> Result<bool, DiscoveryError> {
    let read_dir = std::fs::read_dir(dir).map_err(|source| DiscoveryError::Io {
        path: dir.to_owned(),
        source,
    })?;

    for dir_entry in read_dir {
        let dir_entry = dir_entry.map_err(|source| DiscoveryError::Io {
            path: dir.to_owned(),
            source,
        })?;
        let is_tf_file = dir_entry.path().extension().is_some_and(|ext| ext == "tf");
        if is_tf_file && dir_entry.path().is_file() {
            return Ok(true);
        }
    }

    Ok(false)
}

#[derive(thiserror::Error, Debug)]
pub enum DiscoveryError {
    #[error("unable to walk module tree")]
    Walk(#[from] walkdir::Error),
    #[error("unable to read directory {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn finds_modules_sorted_and_skips_caches() {
        let root = tempfile::tempdir().expect("temp dir");
        let root = root.path();
        for dir in ["b", "a", "a/nested", "a/.terragrunt-cache/xyz", "c"] {
            fs::create_dir_all(root.join(dir)).expect("create dir");
        }
        for file in [
            "b/terragrunt.hcl",
            "a/terragrunt.hcl",
            "a/main.tf",
            "a/nested/terragrunt.hcl",
            "a/.terragrunt-cache/xyz/terragrunt.hcl",
            "c/root.hcl",
        ] {
            fs::write(root.join(file), "").expect("write file");
        }

        let modules = discover(root, "terragrunt.hcl").expect("must discover");

        assert_eq!(
            modules
                .iter()
                .map(|module| (module.dir.strip_prefix(root).unwrap(), module.has_terraform_files))
                .collect::<Vec<_>>(),
            vec![
                (Path::new("a"), true),
                (Path::new("a/nested"), false),
                (Path::new("b"), false),
            ]
        );
        assert_eq!(
            modules[0].config_file,
            root.join("a").join("terragrunt.hcl")
        );
    }
}
