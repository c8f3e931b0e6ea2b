//! Input/output directory layout of a run.

use serde::Serialize;
use std::env;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::utils::io;
use crate::utils::template::TemplateVars;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub reconstruction_dir: PathBuf,
    pub matches_dir: PathBuf,
    pub mvs_dir: PathBuf,
}

impl Layout {
    /// Make both paths absolute and derive the output subfolders.
    /// Fails if the input folder does not exist. Creates nothing.
    pub fn resolve(input_dir: &Path, output_dir: &Path) -> Result<Layout> {
        let input_dir = absolute(input_dir)?;
        let output_dir = absolute(output_dir)?;

        if !input_dir.exists() {
            return Err(Error::input_not_found(input_dir.display().to_string()));
        }

        let reconstruction_dir = output_dir.join("sfm");
        let matches_dir = reconstruction_dir.join("matches");
        let mvs_dir = output_dir.join("mvs");

        Ok(Layout {
            input_dir,
            output_dir,
            reconstruction_dir,
            matches_dir,
            mvs_dir,
        })
    }

    /// Create the output folders that do not exist yet.
    pub fn create_dirs(&self) -> Result<()> {
        for dir in [
            &self.output_dir,
            &self.reconstruction_dir,
            &self.matches_dir,
            &self.mvs_dir,
        ] {
            io::ensure_dir(dir, "create output folder")?;
        }
        Ok(())
    }

    pub fn template_vars(&self, camera_file_params: PathBuf) -> TemplateVars {
        TemplateVars {
            input_dir: self.input_dir.clone(),
            output_dir: self.output_dir.clone(),
            matches_dir: self.matches_dir.clone(),
            reconstruction_dir: self.reconstruction_dir.clone(),
            mvs_dir: self.mvs_dir.clone(),
            camera_file_params,
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(clean(path));
    }

    let cwd = env::current_dir()
        .map_err(|e| Error::internal_io(e.to_string(), Some("read current directory".to_string())))?;
    Ok(clean(&cwd.join(path)))
}

/// Drop `.` and fold `..` lexically. Symlinks are not resolved.
fn clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}
