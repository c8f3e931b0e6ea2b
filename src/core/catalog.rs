//! The fixed, ordered catalog of reconstruction steps.
//!
//! Each step names the toolchain it belongs to, the binary inside that
//! toolchain, and a typed argument template. Templates are rendered once the
//! directory layout is known; see [`Step::render`].

use serde::Serialize;
use std::path::MAIN_SEPARATOR_STR;

use crate::toolchain::{Tool, Toolchain};
use crate::utils::template::{self, Placeholder, TemplateVars};

pub const STEP_COUNT: usize = 24;

pub const FILTER_MATCHES: usize = 4;
pub const GLOBAL_RECONSTRUCTION: usize = 6;
pub const MODEL_ALIGNER: usize = 15;
pub const REFINE_MESH: usize = 20;
pub const TEXTURE_MESH: usize = 21;

/// One argument of a step template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateArg {
    Lit(&'static str),
    Dir(Placeholder),
    /// A path under a placeholder folder. Nested names are written with `/`.
    File(Placeholder, &'static str),
}

impl TemplateArg {
    /// The argument in `%token%` form.
    pub fn template_str(&self) -> String {
        match self {
            TemplateArg::Lit(s) => s.to_string(),
            TemplateArg::Dir(p) => p.token().to_string(),
            TemplateArg::File(p, name) => {
                let mut path = p.token().to_string();
                for part in name.split('/') {
                    path.push_str(MAIN_SEPARATOR_STR);
                    path.push_str(part);
                }
                path
            }
        }
    }
}

#[derive(Debug)]
pub struct Step {
    pub index: usize,
    pub label: &'static str,
    pub tool: Tool,
    pub binary: &'static str,
    pub template: &'static [TemplateArg],
}

/// A step with its program resolved and every placeholder substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    pub index: usize,
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
}

impl Step {
    pub fn render(&self, toolchain: &Toolchain, vars: &TemplateVars) -> PlannedStep {
        let args = self
            .template
            .iter()
            .map(|arg| template::render(&arg.template_str(), vars))
            .collect();

        PlannedStep {
            index: self.index,
            label: self.label.to_string(),
            program: toolchain
                .program(self.tool, self.binary)
                .to_string_lossy()
                .into_owned(),
            args,
        }
    }
}

pub fn step(index: usize) -> Option<&'static Step> {
    CATALOG.get(index)
}

pub fn steps() -> &'static [Step] {
    &CATALOG
}

/// Render every catalog step.
pub fn render_all(toolchain: &Toolchain, vars: &TemplateVars) -> Vec<PlannedStep> {
    CATALOG
        .iter()
        .map(|step| step.render(toolchain, vars))
        .collect()
}

/// Replace `from` with `to` inside every argument. Absent `from` is a no-op.
pub fn replace_literal(args: &[String], from: &str, to: &str) -> Vec<String> {
    args.iter().map(|arg| arg.replace(from, to)).collect()
}

use Placeholder::{CameraFileParams, InputDir, MatchesDir, MvsDir, ReconstructionDir};
use TemplateArg::{Dir, File, Lit};

static CATALOG: [Step; STEP_COUNT] = [
    Step {
        index: 0,
        label: "Intrinsics analysis",
        tool: Tool::OpenMvg,
        binary: "openMVG_main_SfMInit_ImageListing",
        template: &[
            Lit("-i"),
            Dir(InputDir),
            Lit("-o"),
            Dir(MatchesDir),
            Lit("-d"),
            Dir(CameraFileParams),
        ],
    },
    Step {
        index: 1,
        label: "Compute features",
        tool: Tool::OpenMvg,
        binary: "openMVG_main_ComputeFeatures",
        template: &[
            Lit("-i"),
            File(MatchesDir, "sfm_data.json"),
            Lit("-o"),
            Dir(MatchesDir),
            Lit("-m"),
            Lit("SIFT"),
        ],
    },
    Step {
        index: 2,
        label: "Compute pairs",
        tool: Tool::OpenMvg,
        binary: "openMVG_main_PairGenerator",
        template: &[
            Lit("-i"),
            File(MatchesDir, "sfm_data.json"),
            Lit("-o"),
            File(MatchesDir, "pairs.bin"),
        ],
    },
    Step {
        index: 3,
        label: "Compute matches",
        tool: Tool::OpenMvg,
        binary: "openMVG_main_ComputeMatches",
        template: &[
            Lit("-i"),
            File(MatchesDir, "sfm_data.json"),
            Lit("-p"),
            File(MatchesDir, "pairs.bin"),
            Lit("-o"),
            File(MatchesDir, "matches.putative.bin"),
            Lit("-n"),
            Lit("AUTO"),
        ],
    },
    Step {
        index: 4,
        label: "Filter matches",
        tool: Tool::OpenMvg,
        binary: "openMVG_main_GeometricFilter",
        template: &[
            Lit("-i"),
            File(MatchesDir, "sfm_data.json"),
            Lit("-m"),
            File(MatchesDir, "matches.putative.bin"),
            Lit("-o"),
            File(MatchesDir, "matches.f.bin"),
        ],
    },
    Step {
        index: 5,
        label: "Incremental reconstruction",
        tool: Tool::OpenMvg,
        binary: "openMVG_main_SfM",
        template: &[
            Lit("-i"),
            File(MatchesDir, "sfm_data.json"),
            Lit("-m"),
            Dir(MatchesDir),
            Lit("-o"),
            Dir(ReconstructionDir),
            Lit("-s"),
            Lit("INCREMENTAL"),
        ],
    },
    Step {
        index: 6,
        label: "Global reconstruction",
        tool: Tool::OpenMvg,
        binary: "openMVG_main_SfM",
        template: &[
            Lit("-i"),
            File(MatchesDir, "sfm_data.json"),
            Lit("-m"),
            Dir(MatchesDir),
            Lit("-o"),
            Dir(ReconstructionDir),
            Lit("-s"),
            Lit("GLOBAL"),
            Lit("-M"),
            File(MatchesDir, "matches.e.bin"),
        ],
    },
    Step {
        index: 7,
        label: "Colorize Structure",
        tool: Tool::OpenMvg,
        binary: "openMVG_main_ComputeSfM_DataColor",
        template: &[
            Lit("-i"),
            File(ReconstructionDir, "sfm_data.bin"),
            Lit("-o"),
            File(ReconstructionDir, "colorized.ply"),
        ],
    },
    Step {
        index: 8,
        label: "Structure from Known Poses",
        tool: Tool::OpenMvg,
        binary: "openMVG_main_ComputeStructureFromKnownPoses",
        template: &[
            Lit("-i"),
            File(ReconstructionDir, "sfm_data.bin"),
            Lit("-m"),
            Dir(MatchesDir),
            Lit("-f"),
            File(MatchesDir, "matches.f.bin"),
            Lit("-o"),
            File(ReconstructionDir, "robust.bin"),
        ],
    },
    Step {
        index: 9,
        label: "Colorized robust triangulation",
        tool: Tool::OpenMvg,
        binary: "openMVG_main_ComputeSfM_DataColor",
        template: &[
            Lit("-i"),
            File(ReconstructionDir, "robust.bin"),
            Lit("-o"),
            File(ReconstructionDir, "robust_colorized.ply"),
        ],
    },
    Step {
        index: 10,
        label: "Control Points Registration",
        tool: Tool::OpenMvg,
        binary: "ui_openMVG_control_points_registration",
        template: &[Lit("-i"), File(ReconstructionDir, "sfm_data.bin")],
    },
    Step {
        index: 11,
        label: "Export to openMVS",
        tool: Tool::OpenMvg,
        binary: "openMVG_main_openMVG2openMVS",
        template: &[
            Lit("-i"),
            File(ReconstructionDir, "sfm_data.bin"),
            Lit("-o"),
            File(MvsDir, "scene.mvs"),
            Lit("-d"),
            File(MvsDir, "images"),
        ],
    },
    Step {
        index: 12,
        label: "Feature Extractor",
        tool: Tool::Colmap,
        binary: "colmap",
        template: &[
            Lit("feature_extractor"),
            Lit("--database_path"),
            File(MatchesDir, "database.db"),
            Lit("--image_path"),
            Dir(InputDir),
            Lit("--ImageReader.single_camera=1"),
            Lit("--ImageReader.camera_model=OPENCV"),
        ],
    },
    Step {
        index: 13,
        label: "Exhaustive Matcher",
        tool: Tool::Colmap,
        binary: "colmap",
        template: &[
            Lit("exhaustive_matcher"),
            Lit("--database_path"),
            File(MatchesDir, "database.db"),
        ],
    },
    Step {
        index: 14,
        label: "Mapper",
        tool: Tool::Colmap,
        binary: "colmap",
        template: &[
            Lit("mapper"),
            Lit("--database_path"),
            File(MatchesDir, "database.db"),
            Lit("--image_path"),
            Dir(InputDir),
            Lit("--output_path"),
            Dir(ReconstructionDir),
        ],
    },
    Step {
        index: 15,
        label: "Model Aligner",
        tool: Tool::Colmap,
        binary: "colmap",
        template: &[
            Lit("model_aligner"),
            Lit("--input_path"),
            File(ReconstructionDir, "0"),
            Lit("--database_path"),
            File(MatchesDir, "database.db"),
            Lit("--output_path"),
            File(ReconstructionDir, "0"),
            Lit("--ref_is_gps=1"),
            Lit("--alignment_max_error=2.0"),
            Lit("--alignment_type=enu"),
            Lit("--transform_path"),
            File(ReconstructionDir, "transform.txt"),
        ],
    },
    Step {
        index: 16,
        label: "Image Undistorter",
        tool: Tool::Colmap,
        binary: "colmap",
        template: &[
            Lit("image_undistorter"),
            Lit("--image_path"),
            Dir(InputDir),
            Lit("--input_path"),
            File(ReconstructionDir, "0"),
            Lit("--output_path"),
            File(ReconstructionDir, "dense"),
            Lit("--output_type"),
            Lit("COLMAP"),
        ],
    },
    Step {
        index: 17,
        label: "Export to openMVS",
        tool: Tool::OpenMvs,
        binary: "InterfaceCOLMAP",
        template: &[
            Lit("-i"),
            File(ReconstructionDir, "dense"),
            Lit("-o"),
            Lit("scene.mvs"),
            Lit("--image-folder"),
            File(ReconstructionDir, "dense/images"),
            Lit("-w"),
            Dir(MvsDir),
        ],
    },
    Step {
        index: 18,
        label: "Densify point cloud",
        tool: Tool::OpenMvs,
        binary: "DensifyPointCloud",
        template: &[
            Lit("scene.mvs"),
            Lit("--dense-config-file"),
            Lit("Densify.ini"),
            Lit("--resolution-level"),
            Lit("1"),
            Lit("--number-views"),
            Lit("8"),
            Lit("-w"),
            Dir(MvsDir),
        ],
    },
    Step {
        index: 19,
        label: "Reconstruct the mesh",
        tool: Tool::OpenMvs,
        binary: "ReconstructMesh",
        template: &[
            Lit("scene_dense.mvs"),
            Lit("-p"),
            Lit("scene_dense.ply"),
            Lit("-w"),
            Dir(MvsDir),
        ],
    },
    Step {
        index: 20,
        label: "Refine the mesh",
        tool: Tool::OpenMvs,
        binary: "RefineMesh",
        template: &[
            Lit("scene_dense.mvs"),
            Lit("-m"),
            Lit("scene_dense_mesh.ply"),
            Lit("-o"),
            Lit("scene_dense_mesh_refine.mvs"),
            Lit("--scales"),
            Lit("1"),
            Lit("--gradient-step"),
            Lit("25.05"),
            Lit("-w"),
            Dir(MvsDir),
        ],
    },
    Step {
        index: 21,
        label: "Texture the mesh",
        tool: Tool::OpenMvs,
        binary: "TextureMesh",
        template: &[
            Lit("scene_dense.mvs"),
            Lit("-m"),
            Lit("scene_dense_mesh_refine.ply"),
            Lit("-o"),
            Lit("scene_dense_mesh_refine_texture.mvs"),
            Lit("--decimate"),
            Lit("0.5"),
            Lit("-w"),
            Dir(MvsDir),
        ],
    },
    Step {
        index: 22,
        label: "Estimate disparity-maps",
        tool: Tool::OpenMvs,
        binary: "DensifyPointCloud",
        template: &[
            Lit("scene.mvs"),
            Lit("--dense-config-file"),
            Lit("Densify.ini"),
            Lit("--fusion-mode"),
            Lit("-1"),
            Lit("-w"),
            Dir(MvsDir),
        ],
    },
    Step {
        index: 23,
        label: "Fuse disparity-maps",
        tool: Tool::OpenMvs,
        binary: "DensifyPointCloud",
        template: &[
            Lit("scene.mvs"),
            Lit("--dense-config-file"),
            Lit("Densify.ini"),
            Lit("--fusion-mode"),
            Lit("-2"),
            Lit("-w"),
            Dir(MvsDir),
        ],
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture_vars() -> TemplateVars {
        TemplateVars {
            input_dir: PathBuf::from("/in"),
            output_dir: PathBuf::from("/out"),
            matches_dir: PathBuf::from("/out/sfm/matches"),
            reconstruction_dir: PathBuf::from("/out/sfm"),
            mvs_dir: PathBuf::from("/out/mvs"),
            camera_file_params: PathBuf::from("/db/sensor_width_camera_database.txt"),
        }
    }

    fn fixture_toolchain() -> Toolchain {
        Toolchain {
            openmvg_bin: PathBuf::from("/opt/openMVG"),
            colmap: PathBuf::from("/opt/colmap/colmap"),
            openmvs_bin: PathBuf::from("/opt/openMVS"),
            sensor_db_dir: PathBuf::from("/db"),
        }
    }

    #[test]
    fn indices_match_positions() {
        for (position, step) in steps().iter().enumerate() {
            assert_eq!(step.index, position);
        }
        assert_eq!(steps().len(), STEP_COUNT);
    }

    #[test]
    fn mesh_steps_keep_catalog_numbering() {
        assert_eq!(step(REFINE_MESH).unwrap().label, "Refine the mesh");
        assert_eq!(step(TEXTURE_MESH).unwrap().label, "Texture the mesh");
        assert_eq!(step(22).unwrap().label, "Estimate disparity-maps");
        assert!(step(STEP_COUNT).is_none());
    }

    #[test]
    fn rendering_leaves_no_placeholder() {
        for planned in render_all(&fixture_toolchain(), &fixture_vars()) {
            for arg in &planned.args {
                assert!(!template::is_present(arg), "step {}: {}", planned.index, arg);
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn render_resolves_program_and_paths() {
        let planned = step(0)
            .unwrap()
            .render(&fixture_toolchain(), &fixture_vars());

        assert_eq!(planned.program, "/opt/openMVG/openMVG_main_SfMInit_ImageListing");
        assert_eq!(
            planned.args,
            vec![
                "-i",
                "/in",
                "-o",
                "/out/sfm/matches",
                "-d",
                "/db/sensor_width_camera_database.txt"
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn colmap_steps_use_the_colmap_executable() {
        let planned = step(MODEL_ALIGNER)
            .unwrap()
            .render(&fixture_toolchain(), &fixture_vars());

        assert_eq!(planned.program, "/opt/colmap/colmap");
        assert_eq!(planned.args[0], "model_aligner");
        assert!(planned.args.contains(&"--ref_is_gps=1".to_string()));
        assert_eq!(planned.args.last().unwrap(), "/out/sfm/transform.txt");
    }

    #[test]
    fn nested_file_names_use_the_platform_separator() {
        let planned = step(17)
            .unwrap()
            .render(&fixture_toolchain(), &fixture_vars());

        let folder = planned
            .args
            .iter()
            .position(|a| a == "--image-folder")
            .unwrap();
        let expected = PathBuf::from("/out/sfm").join("dense").join("images");
        assert_eq!(planned.args[folder + 1], expected.to_string_lossy());
    }

    #[test]
    fn replace_literal_is_a_noop_when_absent() {
        let args = vec!["-o".to_string(), "scene.mvs".to_string()];
        assert_eq!(replace_literal(&args, "matches.f.bin", "matches.e.bin"), args);
    }
}
