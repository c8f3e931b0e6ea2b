//! Placeholder rendering for step argument templates.

use std::path::{Path, PathBuf};

/// Every placeholder a step template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    InputDir,
    OutputDir,
    MatchesDir,
    ReconstructionDir,
    MvsDir,
    CameraFileParams,
}

impl Placeholder {
    pub const ALL: [Placeholder; 6] = [
        Placeholder::InputDir,
        Placeholder::OutputDir,
        Placeholder::MatchesDir,
        Placeholder::ReconstructionDir,
        Placeholder::MvsDir,
        Placeholder::CameraFileParams,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            Placeholder::InputDir => "%input_dir%",
            Placeholder::OutputDir => "%output_dir%",
            Placeholder::MatchesDir => "%matches_dir%",
            Placeholder::ReconstructionDir => "%reconstruction_dir%",
            Placeholder::MvsDir => "%mvs_dir%",
            Placeholder::CameraFileParams => "%camera_file_params%",
        }
    }
}

/// Concrete value for every placeholder.
#[derive(Debug, Clone)]
pub struct TemplateVars {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub matches_dir: PathBuf,
    pub reconstruction_dir: PathBuf,
    pub mvs_dir: PathBuf,
    pub camera_file_params: PathBuf,
}

impl TemplateVars {
    pub fn get(&self, placeholder: Placeholder) -> &Path {
        match placeholder {
            Placeholder::InputDir => &self.input_dir,
            Placeholder::OutputDir => &self.output_dir,
            Placeholder::MatchesDir => &self.matches_dir,
            Placeholder::ReconstructionDir => &self.reconstruction_dir,
            Placeholder::MvsDir => &self.mvs_dir,
            Placeholder::CameraFileParams => &self.camera_file_params,
        }
    }
}

/// Replace every placeholder token in `template`.
pub fn render(template: &str, vars: &TemplateVars) -> String {
    let mut result = template.to_string();

    for placeholder in Placeholder::ALL {
        if result.contains(placeholder.token()) {
            let value = vars.get(placeholder).to_string_lossy();
            result = result.replace(placeholder.token(), &value);
        }
    }

    result
}

#[cfg(test)]
pub fn is_present(template: &str) -> bool {
    Placeholder::ALL
        .iter()
        .any(|placeholder| template.contains(placeholder.token()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> TemplateVars {
        TemplateVars {
            input_dir: PathBuf::from("/data/photos"),
            output_dir: PathBuf::from("/data/out"),
            matches_dir: PathBuf::from("/data/out/sfm/matches"),
            reconstruction_dir: PathBuf::from("/data/out/sfm"),
            mvs_dir: PathBuf::from("/data/out/mvs"),
            camera_file_params: PathBuf::from("/usr/share/sensor_width_camera_database.txt"),
        }
    }

    #[test]
    fn render_replaces_every_token() {
        let rendered = render("%mvs_dir%/scene.mvs:%input_dir%", &vars());
        assert_eq!(rendered, "/data/out/mvs/scene.mvs:/data/photos");
        assert!(!is_present(&rendered));
    }

    #[test]
    fn render_leaves_plain_text_alone() {
        assert_eq!(render("--decimate", &vars()), "--decimate");
        assert_eq!(render("%unknown%", &vars()), "%unknown%");
    }

    #[test]
    fn reconstruction_token_is_not_confused_with_input() {
        assert_eq!(render("%reconstruction_dir%", &vars()), "/data/out/sfm");
    }
}
