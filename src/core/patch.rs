//! Cross-step argument patches.
//!
//! A patch rule is a pure function over one step's argument list. Selection
//! rules run once, in [`SELECTION_RULES`] order, after rendering. The
//! alignment fallback runs only when the model aligner fails. Every rule is a
//! silent no-op when the text it targets is absent.

use crate::catalog::{
    self, PlannedStep, FILTER_MATCHES, GLOBAL_RECONSTRUCTION, MODEL_ALIGNER, REFINE_MESH,
    TEXTURE_MESH,
};
use crate::preset::Selection;

pub struct PatchRule {
    pub name: &'static str,
    pub target: usize,
    pub apply: fn(&[String]) -> Vec<String>,
}

/// A patch that depends on which steps were selected together.
pub struct SelectionRule {
    pub rule: PatchRule,
    pub applies: fn(&Selection) -> bool,
}

pub static SELECTION_RULES: &[SelectionRule] = &[
    SelectionRule {
        rule: PatchRule {
            name: "essential-matrix-filter",
            target: FILTER_MATCHES,
            apply: essential_matrix_filter,
        },
        applies: |selection| {
            selection.contains(FILTER_MATCHES) && selection.contains(GLOBAL_RECONSTRUCTION)
        },
    },
    SelectionRule {
        rule: PatchRule {
            name: "texture-unrefined-mesh",
            target: TEXTURE_MESH,
            apply: texture_unrefined_mesh,
        },
        applies: |selection| selection.contains(TEXTURE_MESH) && !selection.contains(REFINE_MESH),
    },
];

/// Applied on failure of the model aligner, never at selection time.
pub static GPS_TO_PLANE_ALIGNMENT: PatchRule = PatchRule {
    name: "gps-to-plane-alignment",
    target: MODEL_ALIGNER,
    apply: gps_to_plane_alignment,
};

pub const GPS_ALIGNMENT_FLAG: &str = "--ref_is_gps=1";

/// Global reconstruction reads essential-matrix matches, so the filter must
/// produce them instead of fundamental-matrix ones.
fn essential_matrix_filter(args: &[String]) -> Vec<String> {
    let mut args = catalog::replace_literal(args, "matches.f.bin", "matches.e.bin");
    let has_model = args.windows(2).any(|pair| pair[0] == "-g" && pair[1] == "e");
    if !has_model {
        args.push("-g".to_string());
        args.push("e".to_string());
    }
    args
}

/// Texture the reconstructed mesh directly when refinement is skipped.
fn texture_unrefined_mesh(args: &[String]) -> Vec<String> {
    let args = catalog::replace_literal(args, "scene_dense_mesh_refine.ply", "scene_dense_mesh.ply");
    catalog::replace_literal(
        &args,
        "scene_dense_mesh_refine_texture.mvs",
        "scene_dense_mesh_texture.mvs",
    )
}

fn gps_to_plane_alignment(args: &[String]) -> Vec<String> {
    let args = catalog::replace_literal(args, GPS_ALIGNMENT_FLAG, "--ref_is_gps=0");
    catalog::replace_literal(&args, "--alignment_type=enu", "--alignment_type=plane")
}

/// Apply every selection rule whose condition holds. Returns the names of the
/// rules applied.
pub fn apply_selection_rules(steps: &mut [PlannedStep], selection: &Selection) -> Vec<&'static str> {
    let mut applied = Vec::new();

    for SelectionRule { rule, applies } in SELECTION_RULES {
        if !applies(selection) {
            continue;
        }
        if let Some(step) = steps.iter_mut().find(|s| s.index == rule.target) {
            step.args = (rule.apply)(&step.args);
            applied.push(rule.name);
        }
    }

    applied
}

/// Whether the alignment fallback is still available for these arguments.
pub fn can_fall_back_to_plane(index: usize, args: &[String]) -> bool {
    index == GPS_TO_PLANE_ALIGNMENT.target && args.iter().any(|a| a == GPS_ALIGNMENT_FLAG)
}
