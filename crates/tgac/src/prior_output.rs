//! carry hand written parts of a previous output into the new one
//!
//! A previous `atlantis.yaml` may contain `workflows` that were written by hand. They are read back
//! before the file is overwritten and passed through untouched.
//!
//! - missing file: not an error, there is simply nothing to carry over
//! - file that does not parse: an error, overwriting it could destroy hand written content
use crate::atlantis::AtlantisConfig;
use std::path::{Path, PathBuf};

/// Read the output of a previous run, `None` if there is none
pub fn read_prior_output(path: &Path) -> Result<Option<AtlantisConfig>, PriorOutputError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path=%path.display(), "no previous output, starting from scratch");
            return Ok(None);
        }
        Err(source) => {
            return Err(PriorOutputError::Io {
                path: path.to_owned(),
                source,
            })
        }
    };

    if contents.trim().is_empty() {
        tracing::info!(path=%path.display(), "previous output is empty, starting from scratch");
        return Ok(None);
    }

    let prior = AtlantisConfig::from_yaml(&contents).map_err(|source| {
        PriorOutputError::CorruptPriorOutput {
            path: path.to_owned(),
            source,
        }
    })?;

    tracing::debug!(path=%path.display(), has_workflows = prior.workflows.is_some(), "read previous output");
    Ok(Some(prior))
}

/// Take over the passthrough `workflows` block of `prior`
///
/// Nothing else of `config` is touched.
pub fn carry_forward(config: &mut AtlantisConfig, prior: Option<AtlantisConfig>) {
    if let Some(workflows) = prior.and_then(|prior| prior.workflows) {
        config.workflows = Some(workflows);
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PriorOutputError {
    #[error("unable to read previous output {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("previous output {} is not valid, refusing to overwrite it", .path.display())]
    CorruptPriorOutput {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
