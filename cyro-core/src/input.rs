use std::collections::HashSet;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("no file patterns provided")]
    NoPatterns,
    #[error("no matches for pattern {0:?}")]
    NoMatches(String),
    #[error("invalid glob pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Expands file paths and glob patterns into a sorted, deduplicated list.
///
/// Patterns containing glob metacharacters must match at least one path;
/// literal paths must exist.
pub fn expand_globs(patterns: &[String]) -> Result<Vec<PathBuf>, InputError> {
    if patterns.is_empty() {
        return Err(InputError::NoPatterns);
    }

    let mut files = Vec::new();
    let mut seen = HashSet::new();

    for pattern in patterns {
        if has_glob_meta(pattern) {
            let matches =
                glob::glob(pattern).map_err(|source| InputError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })?;

            let mut matched_any = false;
            for path in matches {
                let path = path.map_err(|e| InputError::Io(e.into_error()))?;
                matched_any = true;
                if seen.insert(path.clone()) {
                    files.push(path);
                }
            }
            if !matched_any {
                return Err(InputError::NoMatches(pattern.clone()));
            }
            continue;
        }

        let path = PathBuf::from(pattern);
        std::fs::metadata(&path)?;
        if seen.insert(path.clone()) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn literal_paths_must_exist() {
        let result = expand_globs(&["/definitely/not/a/real/file.log".to_string()]);
        assert!(matches!(result, Err(InputError::Io(_))));
    }

    #[test]
    fn empty_pattern_list_is_an_error() {
        assert!(matches!(expand_globs(&[]), Err(InputError::NoPatterns)));
    }

    #[test]
    fn globs_expand_sorted_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let b = dir.path().join("b.log");
        let a = dir.path().join("a.log");
        fs::write(&b, "x").unwrap();
        fs::write(&a, "x").unwrap();

        let pattern = dir.path().join("*.log").to_string_lossy().to_string();
        let literal = a.to_string_lossy().to_string();
        let files = expand_globs(&[pattern, literal]).unwrap();

        assert_eq!(files, vec![a, b]);
    }

    #[test]
    fn unmatched_glob_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("*.nope").to_string_lossy().to_string();
        assert!(matches!(
            expand_globs(&[pattern]),
            Err(InputError::NoMatches(_))
        ));
    }
}
