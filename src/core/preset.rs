//! Named step presets and step selection.

use serde::Serialize;

use crate::catalog::STEP_COUNT;
use crate::error::{Error, Result};

pub const DEFAULT_PRESET: &str = "SEQUENTIAL";

pub static PRESETS: &[(&str, &[usize])] = &[
    ("SEQUENTIAL", &[0, 1, 2, 3, 4, 5, 11, 18, 19, 20, 21]),
    ("GLOBAL", &[0, 1, 2, 3, 4, 6, 11, 18, 19, 20, 21]),
    ("MVG_SEQ", &[0, 1, 2, 3, 4, 5, 7, 8, 9, 11]),
    ("MVG_GLOBAL", &[0, 1, 2, 3, 4, 6, 7, 8, 9, 11]),
    ("COLMAP_MVS", &[12, 13, 14, 15, 16, 17, 18, 19, 20, 21]),
    ("COLMAP", &[12, 13, 14, 15, 16, 17]),
    ("MVS", &[18, 19, 20, 21]),
    ("MVS_SGM", &[22, 23]),
];

pub fn names() -> Vec<String> {
    PRESETS.iter().map(|(name, _)| name.to_string()).collect()
}

pub fn lookup(name: &str) -> Result<&'static [usize]> {
    PRESETS
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, steps)| *steps)
        .ok_or_else(|| Error::preset_not_found(name, names()))
}

/// Steps chosen for a run: sorted ascending, no duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    steps: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preset: Option<String>,
}

impl Selection {
    pub fn steps(&self) -> &[usize] {
        &self.steps
    }

    pub fn preset(&self) -> Option<&str> {
        self.preset.as_deref()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.steps.binary_search(&index).is_ok()
    }
}

/// Pick the steps to run. At most one of `steps` and `preset` may be given;
/// with neither, `default_preset` is used.
pub fn select(
    steps: Option<&[usize]>,
    preset: Option<&str>,
    default_preset: &str,
) -> Result<Selection> {
    let (mut chosen, preset_name) = match (steps, preset) {
        (Some(_), Some(_)) => {
            return Err(Error::validation_invalid_argument(
                "steps",
                "Steps and preset arguments can't be set together.",
                None,
                None,
            ))
        }
        (Some(steps), None) => (steps.to_vec(), None),
        (None, Some(name)) => (lookup(name)?.to_vec(), Some(name.to_string())),
        (None, None) => {
            let steps = lookup(default_preset).map_err(|_| {
                Error::config_invalid_value(
                    "default_preset",
                    Some(default_preset.to_string()),
                    format!("Unknown preset, choose {}", names().join(" or ")),
                )
            })?;
            (steps.to_vec(), Some(default_preset.to_string()))
        }
    };

    if let Some(bad) = chosen.iter().find(|&&index| index >= STEP_COUNT) {
        return Err(Error::validation_invalid_argument(
            "steps",
            format!("Step {} does not exist (valid steps are 0-{})", bad, STEP_COUNT - 1),
            Some(bad.to_string()),
            None,
        ));
    }

    chosen.sort_unstable();
    chosen.dedup();

    Ok(Selection {
        steps: chosen,
        preset: preset_name,
    })
}
