//! Locating the external toolchains and the camera sensor database.
//!
//! Lookup order for every tool: explicit folder (command line, then
//! mvgmvs.json), then the [`ToolLocator`], then an interactive [`Prompter`].
//! Nothing here touches the process environment.

use serde::Serialize;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::defaults::{expand_path, ToolDirs};
use crate::error::{Error, Result};

pub const CAMERA_SENSOR_DB_FILE: &str = "sensor_width_camera_database.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    OpenMvg,
    Colmap,
    OpenMvs,
}

impl Tool {
    pub fn display_name(&self) -> &'static str {
        match self {
            Tool::OpenMvg => "openMVG",
            Tool::Colmap => "COLMAP",
            Tool::OpenMvs => "openMVS",
        }
    }

    /// Executable whose presence identifies the tool's folder.
    pub fn probe(&self) -> &'static str {
        match self {
            Tool::OpenMvg => "openMVG_main_SfMInit_ImageListing",
            Tool::Colmap => "colmap",
            Tool::OpenMvs => "ReconstructMesh",
        }
    }
}

/// Finds files on some search path.
pub trait ToolLocator {
    /// Folder containing the executable `name`, if any.
    fn locate(&self, name: &str) -> Option<PathBuf>;

    /// Folder containing the file `name` (any file type), if any.
    fn locate_file(&self, name: &str) -> Option<PathBuf>;
}

/// Asks the user for a value when lookup fails.
pub trait Prompter {
    fn ask(&mut self, question: &str) -> Result<String>;
}

/// A prompter that never asks; used when no terminal is attached.
#[derive(Debug, Default)]
pub struct NoPrompt;

impl Prompter for NoPrompt {
    fn ask(&mut self, _question: &str) -> Result<String> {
        Ok(String::new())
    }
}

/// Ordered list of folders searched for executables and data files.
#[derive(Debug, Clone, Default)]
pub struct PathSearch {
    dirs: Vec<PathBuf>,
}

impl PathSearch {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// `PATH`, then this executable's folder, then the current directory,
    /// then any `extra` folders.
    pub fn from_env(extra: &[String]) -> Self {
        let mut dirs = Self::split_path(env::var_os("PATH"));

        if let Some(exe_dir) = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            dirs.push(exe_dir);
        }
        if let Ok(cwd) = env::current_dir() {
            dirs.push(cwd);
        }
        dirs.extend(extra.iter().map(|raw| expand_path(raw)));

        Self { dirs }
    }

    pub fn split_path(path: Option<OsString>) -> Vec<PathBuf> {
        path.map(|p| env::split_paths(&p).collect())
            .unwrap_or_default()
    }
}

impl ToolLocator for PathSearch {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        self.dirs
            .iter()
            .find(|dir| is_executable(&dir.join(executable_name(name))))
            .cloned()
    }

    fn locate_file(&self, name: &str) -> Option<PathBuf> {
        self.dirs.iter().find(|dir| dir.join(name).is_file()).cloned()
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Platform executable file name (`colmap` runs through `colmap.bat` on Windows).
pub fn executable_name(name: &str) -> String {
    if cfg!(windows) {
        if name == "colmap" {
            "colmap.bat".to_string()
        } else {
            format!("{}.exe", name)
        }
    } else {
        name.to_string()
    }
}

/// Resolved tool locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toolchain {
    pub openmvg_bin: PathBuf,
    /// Full path of the COLMAP executable.
    pub colmap: PathBuf,
    pub openmvs_bin: PathBuf,
    pub sensor_db_dir: PathBuf,
}

impl Toolchain {
    pub fn program(&self, tool: Tool, binary: &str) -> PathBuf {
        match tool {
            Tool::OpenMvg => self.openmvg_bin.join(binary),
            Tool::Colmap => self.colmap.clone(),
            Tool::OpenMvs => self.openmvs_bin.join(binary),
        }
    }

    pub fn camera_file_params(&self) -> PathBuf {
        self.sensor_db_dir.join(CAMERA_SENSOR_DB_FILE)
    }

    /// Resolve every tool folder. `dirs` holds explicit folders that bypass lookup.
    pub fn resolve(
        dirs: &ToolDirs,
        locator: &dyn ToolLocator,
        prompter: &mut dyn Prompter,
    ) -> Result<Toolchain> {
        let openmvg_bin =
            resolve_tool(Tool::OpenMvg, dirs.openmvg_bin.as_deref(), locator, prompter)?;
        let colmap_bin =
            resolve_tool(Tool::Colmap, dirs.colmap_bin.as_deref(), locator, prompter)?;
        let openmvs_bin =
            resolve_tool(Tool::OpenMvs, dirs.openmvs_bin.as_deref(), locator, prompter)?;
        let sensor_db_dir = resolve_dir(
            dirs.sensor_db_dir.as_deref(),
            || locator.locate_file(CAMERA_SENSOR_DB_FILE),
            &format!("openMVG camera database ({}) folder?\n", CAMERA_SENSOR_DB_FILE),
            prompter,
        )?
        .ok_or_else(|| Error::tool_not_found("openMVG camera database", CAMERA_SENSOR_DB_FILE))?;

        Ok(Toolchain {
            openmvg_bin,
            colmap: colmap_bin.join(executable_name(Tool::Colmap.probe())),
            openmvs_bin,
            sensor_db_dir,
        })
    }
}

fn resolve_tool(
    tool: Tool,
    explicit: Option<&str>,
    locator: &dyn ToolLocator,
    prompter: &mut dyn Prompter,
) -> Result<PathBuf> {
    resolve_dir(
        explicit,
        || locator.locate(tool.probe()),
        &format!("{} binary folder?\n", tool.display_name()),
        prompter,
    )?
    .ok_or_else(|| Error::tool_not_found(tool.display_name(), tool.probe()))
}

fn resolve_dir(
    explicit: Option<&str>,
    search: impl FnOnce() -> Option<PathBuf>,
    question: &str,
    prompter: &mut dyn Prompter,
) -> Result<Option<PathBuf>> {
    if let Some(raw) = explicit.filter(|s| !s.trim().is_empty()) {
        return Ok(Some(expand_path(raw.trim())));
    }

    if let Some(found) = search() {
        return Ok(Some(found));
    }

    let answer = prompter.ask(question)?;
    let answer = answer.trim();
    if answer.is_empty() {
        Ok(None)
    } else {
        Ok(Some(expand_path(answer)))
    }
}
