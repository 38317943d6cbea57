//! Light-position (LP) file rewrite
//!
//! An LP file pairs every image of an RTI set with the direction of the
//! light that lit it:
//!
//! ```text
//! 3
//! ../ref/ref-001.tga	-0.015760 0.196076 0.980462
//! ../ref/ref-002.tga	0.301221 0.126630 0.945110
//! ../ref/ref-003.tga	0.545340 0.018640 0.838010
//! ```
//!
//! A reference file measured once for the dome is rewritten for each
//! sequence: the light directions are kept in order and the image names are
//! replaced with the newly captured images.

use crate::error::LightPositionError;
use std::path::{Path, PathBuf};

/// Separator between the image name and the light direction
pub const DEFAULT_SEPARATOR: char = '\t';

/// Rewrite `base` for a new image set and write it to `output`.
///
/// `images` must be in light order and match the count declared on the
/// first line of `base`. Nothing is written unless the whole file could be
/// produced.
///
/// # Errors
/// - `LightPositionError::CountMismatch` if the declared count differs
///   from `images.len()`
/// - `LightPositionError::Truncated` if `base` has fewer light lines than
///   declared
pub async fn rewrite(
    base: &Path,
    images: &[PathBuf],
    output: &Path,
) -> Result<(), LightPositionError> {
    rewrite_with_separator(base, images, output, DEFAULT_SEPARATOR).await
}

/// [`rewrite`] with a custom separator.
pub async fn rewrite_with_separator(
    base: &Path,
    images: &[PathBuf],
    output: &Path,
    separator: char,
) -> Result<(), LightPositionError> {
    let contents = tokio::fs::read_to_string(base)
        .await
        .map_err(|source| LightPositionError::Read {
            path: base.to_path_buf(),
            source,
        })?;

    let rendered = render(base, &contents, images, separator)?;

    tokio::fs::write(output, rendered)
        .await
        .map_err(|source| LightPositionError::Write {
            path: output.to_path_buf(),
            source,
        })
}

fn render(
    base: &Path,
    contents: &str,
    images: &[PathBuf],
    separator: char,
) -> Result<String, LightPositionError> {
    let mut lines = contents.lines();
    let declared: usize = lines
        .next()
        .and_then(|line| line.trim().parse().ok())
        .ok_or_else(|| LightPositionError::MissingCount {
            path: base.to_path_buf(),
        })?;

    if declared != images.len() {
        return Err(LightPositionError::CountMismatch {
            declared,
            supplied: images.len(),
        });
    }

    let mut out = format!("{}\n", images.len());
    for (found, image) in images.iter().enumerate() {
        let line = lines
            .next()
            .ok_or(LightPositionError::Truncated { declared, found })?;
        let direction = line
            .split_once(separator)
            .map(|(_, after)| after)
            .unwrap_or("");
        out.push_str(&format!(
            "{}{}{}\n",
            image.display(),
            separator,
            direction.trim_end()
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const BASE: &str = "2\n../ref/a.tga\t-0.015760 0.196076 0.980462\n../ref/b.tga\t0.301221 0.126630 0.945110\n";

    #[tokio::test]
    async fn test_rewrites_image_names_in_order() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base.lp");
        let output = dir.path().join("lights.lp");
        std::fs::write(&base, BASE).unwrap();

        let images = vec![PathBuf::from("capture0/1.jpg"), PathBuf::from("capture0/2.jpg")];
        rewrite(&base, &images, &output).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "2\ncapture0/1.jpg\t-0.015760 0.196076 0.980462\ncapture0/2.jpg\t0.301221 0.126630 0.945110\n"
        );
    }

    #[tokio::test]
    async fn test_count_mismatch_writes_nothing() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base.lp");
        let output = dir.path().join("lights.lp");
        std::fs::write(&base, BASE).unwrap();

        let images: Vec<PathBuf> = (1..=3).map(|i| PathBuf::from(format!("{}.jpg", i))).collect();
        let err = rewrite(&base, &images, &output).await.unwrap_err();

        assert!(matches!(
            err,
            LightPositionError::CountMismatch {
                declared: 2,
                supplied: 3
            }
        ));
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_truncated_base_writes_nothing() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base.lp");
        let output = dir.path().join("lights.lp");
        std::fs::write(&base, "3\na.tga\t0 0 1\n").unwrap();

        let images: Vec<PathBuf> = (1..=3).map(|i| PathBuf::from(format!("{}.jpg", i))).collect();
        let err = rewrite(&base, &images, &output).await.unwrap_err();

        assert!(matches!(err, LightPositionError::Truncated { declared: 3, found: 1 }));
        assert!(!output.exists());
    }

    #[test]
    fn test_missing_count_line() {
        let err = render(Path::new("x.lp"), "not a number\n", &[], '\t').unwrap_err();
        assert!(matches!(err, LightPositionError::MissingCount { .. }));
    }

    #[tokio::test]
    async fn test_unreadable_base_is_read_error() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("missing.lp");
        let output = dir.path().join("lights.lp");

        let err = rewrite(&base, &[], &output).await.unwrap_err();
        assert!(matches!(err, LightPositionError::Read { ref path, .. } if *path == base));
        assert!(!output.exists());
    }

    #[test]
    fn test_custom_separator_and_crlf() {
        let out = render(
            Path::new("x.lp"),
            "1\r\nold.tga 0.1 0.2 0.3\r\n",
            &[PathBuf::from("new.jpg")],
            ' ',
        )
        .unwrap();
        assert_eq!(out, "1\nnew.jpg 0.1 0.2 0.3\n");
    }
}
