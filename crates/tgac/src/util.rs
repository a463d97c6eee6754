use crate::visit;
use hcl::Expression;
use std::path::{Component, Path, PathBuf};

const DEFAULT_CONFIG_FILE_NAME: &str = "terragrunt.hcl";

/// Replaces calls to the path helpers every module file may use with their string result
///
/// Supported:
/// - `get_terragrunt_dir()`
/// - `find_in_parent_folders()`, `find_in_parent_folders(name)`, `find_in_parent_folders(name, fallback)`
/// - `get_env(name)`, `get_env(name, default)`
///
/// Anything else (or a call with non-literal arguments) is left untouched. Evaluation will report
/// it as an unknown function later on.
#[derive(derive_new::new)]
pub(crate) struct FunctionRewriter<'a> {
    /// Directory of the file that contains the expression
    module_dir: &'a Path,
}

impl<'a> visit::VisitMut<Expression> for FunctionRewriter<'a> {
    fn visit_mut(&mut self, expr: &mut Expression) {
        let Expression::FuncCall(func_call) = expr else {
            return;
        };

        let Some(args) = literal_args(&func_call.args) else {
            tracing::trace!(func=%func_call.name, "non-literal arguments, not substituted");
            return;
        };

        let substitution = match (func_call.name.as_str(), args.as_slice()) {
            ("get_terragrunt_dir", []) => Some(to_slash(self.module_dir)),
            ("find_in_parent_folders", []) => {
                find_in_parent_folders(self.module_dir, DEFAULT_CONFIG_FILE_NAME)
                    .map(|found| to_slash(&found))
            }
            ("find_in_parent_folders", [name]) => {
                find_in_parent_folders(self.module_dir, name).map(|found| to_slash(&found))
            }
            ("find_in_parent_folders", [name, fallback]) => Some(
                find_in_parent_folders(self.module_dir, name)
                    .map(|found| to_slash(&found))
                    .unwrap_or_else(|| fallback.to_string()),
            ),
            ("get_env", [name]) => std::env::var(name).ok(),
            ("get_env", [name, default]) => {
                Some(std::env::var(name).unwrap_or_else(|_| default.to_string()))
            }
            _ => None,
        };

        match substitution {
            Some(value) => {
                tracing::trace!(func=%func_call.name, %value, "function substituted");
                *expr = Expression::String(value);
            }
            None => {
                tracing::debug!(func=%func_call.name, dir=%self.module_dir.display(), "function call not substituted")
            }
        }
    }
}

fn literal_args(args: &[Expression]) -> Option<Vec<&str>> {
    args.iter()
        .map(|arg| match arg {
            Expression::String(s) => Some(s.as_str()),
            _ => None,
        })
        .collect()
}

/// Search `name` in the parent directories of `start_dir`
///
/// The start directory itself is not searched.
pub(crate) fn find_in_parent_folders(start_dir: &Path, name: &str) -> Option<PathBuf> {
    start_dir
        .ancestors()
        .skip(1)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Render a path with `/` separators regardless of platform
pub fn to_slash(path: &Path) -> String {
    path_str_to_slash(&path.to_string_lossy())
}

/// Turn `\` separators into `/`
pub fn path_str_to_slash(path: &str) -> String {
    path.replace('\\', "/")
}

/// Lexically normalize a path
///
/// Removes `.` components and folds `..` into the preceding component where possible. Does not
/// touch the filesystem, so symlinks are not resolved.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let ends_with_normal = matches!(
                    normalized.components().next_back(),
                    Some(Component::Normal(_))
                );

                if ends_with_normal {
                    normalized.pop();
                } else if !normalized.has_root() {
                    normalized.push("..");
                }
                // `/..` stays `/`
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    if normalized.as_os_str().is_empty() {
        normalized.push(".");
    }

    normalized
}

/// Path of `target` relative to the directory `base`
///
/// Both paths are normalized first. If they do not share a root (one relative, one absolute or
/// different windows prefixes) `target` is returned as is.
pub fn relative_path(base: &Path, target: &Path) -> PathBuf {
    let base = normalize_path(base);
    let target = normalize_path(target);

    if base.has_root() != target.has_root() {
        return target;
    }

    let base_components: Vec<_> = base.components().filter(|c| *c != Component::CurDir).collect();
    let target_components: Vec<_> = target
        .components()
        .filter(|c| *c != Component::CurDir)
        .collect();

    let common = base_components
        .iter()
        .zip(target_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    if common == 0 && base.has_root() {
        return target;
    }

    let mut relative = PathBuf::new();
    for _ in common..base_components.len() {
        relative.push("..");
    }
    for component in &target_components[common..] {
        relative.push(component.as_os_str());
    }

    if relative.as_os_str().is_empty() {
        relative.push(".");
    }

    relative
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::visit::VisitFuncCallsMut;
    use pretty_assertions::assert_eq;

    fn rewrite(dir: &Path, source: &str) -> Expression {
        let mut expr: Expression = source
            .parse::<hcl_edit::expr::Expression>()
            .expect("expression must parse")
            .into();
        expr.visit_func_calls_mut(&mut FunctionRewriter::new(dir));
        expr
    }

    #[test]
    fn normalize() {
        assert_eq!(normalize_path(Path::new("a/./b/../c")), PathBuf::from("a/c"));
        assert_eq!(normalize_path(Path::new("../a/..")), PathBuf::from(".."));
        assert_eq!(normalize_path(Path::new("/../a")), PathBuf::from("/a"));
        assert_eq!(normalize_path(Path::new("a/..")), PathBuf::from("."));
    }

    #[test]
    fn relative() {
        assert_eq!(
            relative_path(Path::new("/repo/live/app"), Path::new("/repo/live/root.hcl")),
            PathBuf::from("../root.hcl")
        );
        assert_eq!(
            relative_path(Path::new("/repo"), Path::new("/repo/live/app")),
            PathBuf::from("live/app")
        );
        assert_eq!(
            relative_path(Path::new("/repo"), Path::new("/repo")),
            PathBuf::from(".")
        );
        assert_eq!(
            relative_path(Path::new("live/app"), Path::new("live/vpc/../db")),
            PathBuf::from("../db")
        );
    }

    #[test]
    fn slashes() {
        assert_eq!(path_str_to_slash(r"..\shared\vpc"), "../shared/vpc");
    }

    #[test]
    fn substitutes_terragrunt_dir() {
        let expr = rewrite(Path::new("/repo/app"), "get_terragrunt_dir()");
        assert_eq!(expr, Expression::String("/repo/app".to_string()));
    }

    #[test]
    fn find_in_parent_folders_fallback() {
        let expr = rewrite(
            Path::new("/this/path/does/not/exist"),
            r#"find_in_parent_folders("missing.hcl", "fallback.hcl")"#,
        );
        assert_eq!(expr, Expression::String("fallback.hcl".to_string()));
    }

    #[test]
    fn unknown_functions_stay() {
        let expr = rewrite(Path::new("/repo"), "read_terragrunt_config(\"x.hcl\")");
        assert!(matches!(expr, Expression::FuncCall(_)));
    }

    #[test]
    fn non_literal_arguments_stay() {
        let expr = rewrite(Path::new("/repo"), "get_env(local.name)");
        assert!(matches!(expr, Expression::FuncCall(_)));
    }
}
