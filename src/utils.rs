use anyhow::{bail, Result};
use std::path::{Component, Path, PathBuf};
use url::Url;

pub fn get_filename_from_url(url_str: &str) -> Result<String> {
    let url = Url::parse(url_str)?;

    if let Some(segments) = url.path_segments() {
        if let Some(filename) = segments.last() {
            if !filename.is_empty() {
                return Ok(filename.to_string());
            }
        }
    }

    // Fallback if no filename found in path
    Ok(format!("download_{}", uuid::Uuid::new_v4()))
}

pub fn sanitize_filename(filename: &str) -> String {
    filename.replace(|c: char| !c.is_alphanumeric() && c != '.' && c != '-' && c != '_', "_")
}

pub fn is_remote_source(source: &str) -> bool {
    Url::parse(source)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Where a single-URL download lands: `dest` itself, or a file named after the
/// URL when `dest` is an existing directory.
pub fn resolve_destination(source: &str, dest: &Path) -> Result<PathBuf> {
    if dest.is_dir() {
        let filename = sanitize_filename(&get_filename_from_url(source)?);
        Ok(dest.join(filename))
    } else {
        Ok(dest.to_path_buf())
    }
}

/// Joins a registry-relative path under `root`, refusing anything that could escape it.
pub fn join_relative(root: &Path, relative: &str) -> Result<PathBuf> {
    let relative = Path::new(relative);
    let mut path = root.to_path_buf();
    let mut pushed = false;
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                path.push(part);
                pushed = true;
            }
            Component::CurDir => {}
            _ => bail!("Refusing unsafe file path {:?}", relative),
        }
    }
    if !pushed {
        bail!("Empty file path in listing");
    }
    Ok(path)
}
