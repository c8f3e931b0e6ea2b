//! Per-step passthrough options.
//!
//! On the command line a step's passthrough is a flat list alternating option
//! name and value, with the leading dashes left off (`--1 p HIGH n 8`). Names
//! become flags and override the step's default options of the same name.

use std::collections::HashSet;

use crate::utils::template::{self, TemplateVars};

/// `p` becomes `-p`, `numThreads` becomes `--numThreads`.
pub fn to_flag(name: &str) -> String {
    if name.chars().count() == 1 {
        format!("-{}", name)
    } else {
        format!("--{}", name)
    }
}

/// Turn raw passthrough tokens into command arguments. Values may use the
/// same placeholders as step templates. A trailing name without a value is
/// kept as a bare flag.
pub fn expand(tokens: &[String], vars: &TemplateVars) -> Vec<String> {
    tokens
        .iter()
        .enumerate()
        .map(|(position, token)| {
            if position % 2 == 0 {
                to_flag(token)
            } else {
                template::render(token, vars)
            }
        })
        .collect()
}

/// Name of an option token, without dashes or an inline `=value`.
/// Negative numbers are values, not options.
fn option_name(token: &str) -> Option<&str> {
    let name = token.trim_start_matches('-');
    if name.len() == token.len() || name.is_empty() {
        return None;
    }
    if name.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    Some(name.split('=').next().unwrap_or(name))
}

/// Default arguments that survive a passthrough override, followed by the
/// passthrough itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    pub defaults: Vec<String>,
    pub passthrough: Vec<String>,
}

impl Merged {
    pub fn args(&self) -> Vec<String> {
        let mut args = self.defaults.clone();
        args.extend(self.passthrough.iter().cloned());
        args
    }
}

/// Drop every default option that `passthrough` also sets, together with its
/// value. `--name=value` defaults are dropped alone.
pub fn merge(defaults: &[String], passthrough: Vec<String>) -> Merged {
    let overridden: HashSet<&str> = passthrough
        .iter()
        .step_by(2)
        .filter_map(|flag| option_name(flag))
        .collect();

    let mut surviving = Vec::with_capacity(defaults.len());
    let mut i = 0;
    while i < defaults.len() {
        let token = &defaults[i];
        match option_name(token) {
            Some(name) if overridden.contains(name) => {
                let takes_value = !token.contains('=')
                    && defaults
                        .get(i + 1)
                        .is_some_and(|next| option_name(next).is_none());
                i += if takes_value { 2 } else { 1 };
            }
            _ => {
                surviving.push(token.clone());
                i += 1;
            }
        }
    }

    Merged {
        defaults: surviving,
        passthrough,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn vars() -> TemplateVars {
        TemplateVars {
            input_dir: PathBuf::from("/in"),
            output_dir: PathBuf::from("/out"),
            matches_dir: PathBuf::from("/out/sfm/matches"),
            reconstruction_dir: PathBuf::from("/out/sfm"),
            mvs_dir: PathBuf::from("/out/mvs"),
            camera_file_params: PathBuf::from("/db/sensor_width_camera_database.txt"),
        }
    }

    #[test]
    fn single_character_names_get_one_dash() {
        assert_eq!(to_flag("p"), "-p");
        assert_eq!(to_flag("numThreads"), "--numThreads");
        assert_eq!(to_flag("ab"), "--ab");
    }

    #[test]
    fn expand_flags_names_and_renders_values() {
        let expanded = expand(&strings(&["p", "HIGH", "o", "%mvs_dir%/x.mvs"]), &vars());
        assert_eq!(expanded, strings(&["-p", "HIGH", "-o", "/out/mvs/x.mvs"]));
    }

    #[test]
    fn expand_keeps_trailing_bare_flag() {
        let expanded = expand(&strings(&["n", "8", "verbose"]), &vars());
        assert_eq!(expanded, strings(&["-n", "8", "--verbose"]));
    }

    #[test]
    fn passthrough_replaces_default_pair() {
        let defaults = strings(&["-i", "/m/sfm_data.json", "-o", "/m", "-m", "SIFT"]);
        let merged = merge(&defaults, strings(&["-i", "/other.json"]));

        assert_eq!(merged.defaults, strings(&["-o", "/m", "-m", "SIFT"]));
        let args = merged.args();
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 1);
        assert_eq!(args[args.len() - 1], "/other.json");
    }

    #[test]
    fn values_never_count_as_overrides() {
        // "-m" appears only as a value here, so the default -m pair stays.
        let defaults = strings(&["-m", "SIFT"]);
        let merged = merge(&defaults, strings(&["-p", "-m"]));
        assert_eq!(merged.defaults, defaults);
    }

    #[test]
    fn inline_value_defaults_are_dropped_alone() {
        let defaults = strings(&[
            "model_aligner",
            "--ref_is_gps=1",
            "--alignment_max_error=2.0",
        ]);
        let merged = merge(&defaults, strings(&["--ref_is_gps", "0"]));
        assert_eq!(
            merged.defaults,
            strings(&["model_aligner", "--alignment_max_error=2.0"])
        );
    }

    #[test]
    fn negative_number_values_are_removed_with_their_flag() {
        let defaults = strings(&["scene.mvs", "--fusion-mode", "-1", "-w", "/out/mvs"]);
        let merged = merge(&defaults, strings(&["--fusion-mode", "-2"]));
        assert_eq!(merged.defaults, strings(&["scene.mvs", "-w", "/out/mvs"]));
        assert_eq!(merged.args()[3..], strings(&["--fusion-mode", "-2"])[..]);
    }

    #[test]
    fn empty_passthrough_keeps_defaults() {
        let defaults = strings(&["-i", "a", "-o", "b"]);
        let merged = merge(&defaults, Vec::new());
        assert_eq!(merged.args(), defaults);
    }
}
