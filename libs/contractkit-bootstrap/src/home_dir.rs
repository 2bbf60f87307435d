use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Errors for resolving the home directory
#[derive(Debug, thiserror::Error)]
pub enum HomeDirError {
    #[error("HOME environment variable is not set")]
    HomeMissing,
    #[error("home_dir must be an absolute path (after ~ expansion): {0}")]
    AbsoluteRequired(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolve the server home directory.
///
/// A configured value may start with `~` and must be absolute after expansion.
/// Without one, `<user home>/<default_subdir>` is used. On Windows the user
/// home is `%USERPROFILE%`, elsewhere `$HOME`.
///
/// If `create` is true, the directory is created if missing.
pub fn resolve_home_dir(
    config_home: Option<String>,
    default_subdir: &str,
    create: bool,
) -> Result<PathBuf, HomeDirError> {
    let path = match config_home {
        Some(raw) => {
            let expanded = if raw == "~" {
                user_home()?
            } else if let Some(rest) = raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\")) {
                user_home()?.join(rest)
            } else {
                PathBuf::from(&raw)
            };
            if !expanded.is_absolute() {
                return Err(HomeDirError::AbsoluteRequired(
                    expanded.to_string_lossy().into(),
                ));
            }
            expanded
        }
        None => user_home()?.join(default_subdir),
    };

    if create {
        fs::create_dir_all(&path)?;
    }
    Ok(path)
}

fn user_home() -> Result<PathBuf, HomeDirError> {
    let var = if cfg!(target_os = "windows") {
        "USERPROFILE"
    } else {
        "HOME"
    };
    env::var(var)
        .map(|home| Path::new(&home).to_path_buf())
        .map_err(|_| HomeDirError::HomeMissing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn absolute_path_is_kept_and_created() {
        let tmp = tempdir().unwrap();
        let abs = tmp.path().join("custom_dir");

        let result =
            resolve_home_dir(Some(abs.to_string_lossy().to_string()), ".billing", true).unwrap();

        assert_eq!(result, abs);
        assert!(result.exists());
    }

    #[test]
    fn relative_path_is_rejected() {
        let err = resolve_home_dir(Some("relative/path".into()), ".billing", false).unwrap_err();
        assert!(matches!(err, HomeDirError::AbsoluteRequired(_)), "{err:?}");
    }
}
