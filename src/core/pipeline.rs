//! Preparing and running a reconstruction pipeline.
//!
//! A run moves through `Idle → ResolvingConfig → Patching → Running(i)` and
//! ends in `Complete` or `Aborted`. The model aligner may pass through
//! `Retrying(i)` once. Steps run strictly one after another.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::{self, PlannedStep};
use crate::defaults::{Defaults, ToolDirs};
use crate::error::{Error, Result, StepCancelledDetails, StepFailedDetails};
use crate::layout::Layout;
use crate::passthrough;
use crate::patch::{self, GPS_TO_PLANE_ALIGNMENT};
use crate::preset::{self, Selection};
use crate::toolchain::{Prompter, ToolLocator, Toolchain};
use crate::utils::command::{CommandLine, ProcessExit, ProcessLauncher};
use crate::utils::template::TemplateVars;

/// Everything the user asked for.
#[derive(Debug, Clone, Default)]
pub struct PipelineRequest {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub steps: Option<Vec<usize>>,
    pub preset: Option<String>,
    /// Raw passthrough tokens keyed by step index.
    pub passthrough: BTreeMap<usize, Vec<String>>,
    /// Explicit tool folders; unset entries fall back to the config file.
    pub tool_dirs: ToolDirs,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    ResolvingConfig,
    Patching,
    Running(usize),
    Retrying(usize),
    Aborted,
    Complete,
}

/// Progress notifications emitted while preparing and running.
#[derive(Debug)]
pub enum RunEvent<'a> {
    State(RunState),
    Planned {
        layout: &'a Layout,
        selection: &'a Selection,
    },
    StepStarted {
        index: usize,
        label: &'a str,
    },
    Command(&'a CommandLine),
    Retrying {
        index: usize,
        rule: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    NotRun,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub index: usize,
    pub label: String,
    pub command: String,
    pub status: StepStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<&'static str>,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub state: RunState,
    pub layout: Layout,
    pub selection: Selection,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<&'static str>,
    pub dry_run: bool,
    pub steps: Vec<StepResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Collaborators a run needs from the outside world.
pub struct RunEnv<'a> {
    pub defaults: &'a Defaults,
    pub locator: &'a dyn ToolLocator,
    pub prompter: &'a mut dyn Prompter,
    pub launcher: &'a mut dyn ProcessLauncher,
}

/// A fully resolved, patched plan, ready to run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub layout: Layout,
    pub toolchain: Toolchain,
    pub selection: Selection,
    pub steps: Vec<PlannedStep>,
    pub patches: Vec<&'static str>,
    vars: TemplateVars,
    passthrough: BTreeMap<usize, Vec<String>>,
    dry_run: bool,
}

/// Resolve configuration and build the patched plan. Nothing is created on
/// disk unless the selection, the input folder and every tool resolve.
pub fn prepare(
    request: &PipelineRequest,
    defaults: &Defaults,
    locator: &dyn ToolLocator,
    prompter: &mut dyn Prompter,
    observer: &mut dyn FnMut(RunEvent<'_>),
) -> Result<Pipeline> {
    observer(RunEvent::State(RunState::ResolvingConfig));

    let selection = preset::select(
        request.steps.as_deref(),
        request.preset.as_deref(),
        &defaults.default_preset,
    )?;
    let layout = Layout::resolve(&request.input_dir, &request.output_dir)?;
    let dirs = request.tool_dirs.clone().or(&defaults.tools);
    let toolchain = Toolchain::resolve(&dirs, locator, prompter)?;

    layout.create_dirs()?;

    observer(RunEvent::State(RunState::Patching));

    let vars = layout.template_vars(toolchain.camera_file_params());
    let mut steps: Vec<PlannedStep> = catalog::render_all(&toolchain, &vars)
        .into_iter()
        .filter(|step| selection.contains(step.index))
        .collect();
    let patches = patch::apply_selection_rules(&mut steps, &selection);
    for name in &patches {
        crate::log_status!("patch", "Applied {}", name);
    }

    for index in request.passthrough.keys() {
        if !selection.contains(*index) {
            crate::log_status!("pipeline", "Passthrough for step {} ignored: step not selected", index);
        }
    }

    Ok(Pipeline {
        layout,
        toolchain,
        selection,
        steps,
        patches,
        vars,
        passthrough: request.passthrough.clone(),
        dry_run: request.dry_run,
    })
}

/// Prepare and run in one go. `arm_cancel` is called once preparation has
/// succeeded, so interactive prompts keep the default Ctrl-C behaviour.
pub fn execute<'c>(
    request: &PipelineRequest,
    env: RunEnv<'_>,
    arm_cancel: impl FnOnce() -> &'c AtomicBool,
    observer: &mut dyn FnMut(RunEvent<'_>),
) -> Result<RunReport> {
    let started_at = Utc::now();
    observer(RunEvent::State(RunState::Idle));

    let pipeline = match prepare(request, env.defaults, env.locator, env.prompter, observer) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            observer(RunEvent::State(RunState::Aborted));
            return Err(err);
        }
    };

    pipeline.run(env.launcher, arm_cancel(), started_at, observer)
}

impl Pipeline {
    /// Final argument list for a step: surviving defaults, then passthrough.
    pub fn merged_args(&self, step: &PlannedStep) -> passthrough::Merged {
        let tokens = self
            .passthrough
            .get(&step.index)
            .map(Vec::as_slice)
            .unwrap_or_default();
        passthrough::merge(&step.args, passthrough::expand(tokens, &self.vars))
    }

    pub fn run(
        &self,
        launcher: &mut dyn ProcessLauncher,
        cancel: &AtomicBool,
        started_at: DateTime<Utc>,
        observer: &mut dyn FnMut(RunEvent<'_>),
    ) -> Result<RunReport> {
        observer(RunEvent::Planned {
            layout: &self.layout,
            selection: &self.selection,
        });

        let mut results: Vec<StepResult> = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            if cancel.load(Ordering::SeqCst) {
                observer(RunEvent::State(RunState::Aborted));
                return Err(self.cancelled(step, &results));
            }

            observer(RunEvent::State(RunState::Running(step.index)));
            observer(RunEvent::StepStarted {
                index: step.index,
                label: &step.label,
            });

            let mut merged = self.merged_args(step);
            let mut command = CommandLine::new(step.program.clone(), merged.args());
            observer(RunEvent::Command(&command));

            if self.dry_run {
                results.push(StepResult {
                    index: step.index,
                    label: step.label.clone(),
                    command: command.display(),
                    status: StepStatus::NotRun,
                    attempts: 0,
                    fallback: None,
                    duration_ms: 0,
                });
                continue;
            }

            let timer = Instant::now();
            let mut attempts = 1;
            let mut fallback = None;
            let mut exit = launcher.launch(&command, cancel);

            if !exit.success
                && !cancel.load(Ordering::SeqCst)
                && patch::can_fall_back_to_plane(step.index, &merged.defaults)
            {
                observer(RunEvent::State(RunState::Retrying(step.index)));
                observer(RunEvent::Retrying {
                    index: step.index,
                    rule: GPS_TO_PLANE_ALIGNMENT.name,
                });

                merged.defaults = (GPS_TO_PLANE_ALIGNMENT.apply)(&merged.defaults);
                command = CommandLine::new(step.program.clone(), merged.args());
                observer(RunEvent::Command(&command));

                attempts += 1;
                fallback = Some(GPS_TO_PLANE_ALIGNMENT.name);
                exit = launcher.launch(&command, cancel);
            }

            if cancel.load(Ordering::SeqCst) {
                observer(RunEvent::State(RunState::Aborted));
                return Err(self.cancelled(step, &results));
            }

            if !exit.success {
                observer(RunEvent::State(RunState::Aborted));
                return Err(self.failed(step, &command, &exit, attempts, &results));
            }

            results.push(StepResult {
                index: step.index,
                label: step.label.clone(),
                command: command.display(),
                status: StepStatus::Success,
                attempts,
                fallback,
                duration_ms: timer.elapsed().as_millis(),
            });
        }

        observer(RunEvent::State(RunState::Complete));

        Ok(RunReport {
            state: RunState::Complete,
            layout: self.layout.clone(),
            selection: self.selection.clone(),
            patches: self.patches.clone(),
            dry_run: self.dry_run,
            steps: results,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn cancelled(&self, step: &PlannedStep, results: &[StepResult]) -> Error {
        Error::step_cancelled(StepCancelledDetails {
            step: step.index,
            label: step.label.clone(),
            completed_steps: completed(results),
        })
    }

    fn failed(
        &self,
        step: &PlannedStep,
        command: &CommandLine,
        exit: &ProcessExit,
        attempts: u32,
        results: &[StepResult],
    ) -> Error {
        let err = Error::step_failed(StepFailedDetails {
            step: step.index,
            label: step.label.clone(),
            command: command.display(),
            exit_code: exit.exit_code,
            attempts,
            completed_steps: completed(results),
        });

        match &exit.error {
            Some(spawn_error) => err.with_hint(spawn_error.clone()),
            None => err,
        }
    }
}

fn completed(results: &[StepResult]) -> Vec<usize> {
    results
        .iter()
        .filter(|r| r.status == StepStatus::Success)
        .map(|r| r.index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::toolchain::{NoPrompt, PathSearch};
    use std::cell::{Cell, RefCell};
    use std::fs;
    use tempfile::TempDir;

    struct FakeLauncher<F: FnMut(&CommandLine) -> ProcessExit> {
        calls: Vec<CommandLine>,
        respond: F,
    }

    impl<F: FnMut(&CommandLine) -> ProcessExit> ProcessLauncher for FakeLauncher<F> {
        fn launch(&mut self, command: &CommandLine, _cancel: &AtomicBool) -> ProcessExit {
            self.calls.push(command.clone());
            (self.respond)(command)
        }
    }

    fn fixture() -> (TempDir, PipelineRequest) {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("images");
        fs::create_dir(&input).unwrap();

        let dir = |name: &str| Some(root.path().join(name).display().to_string());
        let request = PipelineRequest {
            input_dir: input,
            output_dir: root.path().join("out"),
            tool_dirs: ToolDirs {
                openmvg_bin: dir("mvg"),
                colmap_bin: dir("colmap"),
                openmvs_bin: dir("mvs"),
                sensor_db_dir: dir("db"),
            },
            ..Default::default()
        };
        (root, request)
    }

    struct Outcome {
        result: Result<RunReport>,
        calls: Vec<CommandLine>,
        states: Vec<RunState>,
        /// Number of states seen when the cancel flag was armed.
        armed_at: Option<usize>,
    }

    fn run_with(
        request: &PipelineRequest,
        cancel: &AtomicBool,
        respond: impl FnMut(&CommandLine) -> ProcessExit,
    ) -> Outcome {
        let defaults = Defaults::default();
        let locator = PathSearch::new(Vec::new());
        let mut prompter = NoPrompt;
        let mut launcher = FakeLauncher {
            calls: Vec::new(),
            respond,
        };
        let states = RefCell::new(Vec::new());
        let armed_at = Cell::new(None);

        let result = execute(
            request,
            RunEnv {
                defaults: &defaults,
                locator: &locator,
                prompter: &mut prompter,
                launcher: &mut launcher,
            },
            || {
                armed_at.set(Some(states.borrow().len()));
                cancel
            },
            &mut |event| {
                if let RunEvent::State(state) = event {
                    states.borrow_mut().push(state);
                }
            },
        );

        Outcome {
            result,
            calls: launcher.calls,
            states: states.into_inner(),
            armed_at: armed_at.get(),
        }
    }

    fn has_arg(command: &CommandLine, arg: &str) -> bool {
        command.args.iter().any(|a| a == arg)
    }

    #[test]
    fn default_preset_runs_sequential_steps_in_order() {
        let (_root, request) = fixture();
        let cancel = AtomicBool::new(false);

        let outcome = run_with(&request, &cancel, |_| ProcessExit::ok());
        let report = outcome.result.unwrap();

        let indices: Vec<usize> = report.steps.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5, 11, 18, 19, 20, 21]);
        assert_eq!(outcome.calls.len(), 11);
        assert!(outcome.calls[0]
            .program
            .ends_with("openMVG_main_SfMInit_ImageListing"));
        assert_eq!(report.state, RunState::Complete);
        assert_eq!(report.selection.preset(), Some("SEQUENTIAL"));
        assert!(report.patches.is_empty());
        assert!(report.layout.matches_dir.is_dir());
        assert!(report.layout.mvs_dir.is_dir());
    }

    #[test]
    fn states_follow_the_run() {
        let (_root, mut request) = fixture();
        request.steps = Some(vec![2, 1]);
        let cancel = AtomicBool::new(false);

        let outcome = run_with(&request, &cancel, |_| ProcessExit::ok());

        assert!(outcome.result.is_ok());
        assert_eq!(
            outcome.states,
            vec![
                RunState::Idle,
                RunState::ResolvingConfig,
                RunState::Patching,
                RunState::Running(1),
                RunState::Running(2),
                RunState::Complete,
            ]
        );
    }

    #[test]
    fn cancel_flag_is_armed_after_preparation() {
        let (_root, mut request) = fixture();
        request.steps = Some(vec![0]);
        let cancel = AtomicBool::new(false);

        let outcome = run_with(&request, &cancel, |_| ProcessExit::ok());

        assert!(outcome.result.is_ok());
        // Idle, ResolvingConfig and Patching come first.
        assert_eq!(outcome.armed_at, Some(3));
    }

    #[test]
    fn failed_step_aborts_without_running_later_steps() {
        let (_root, mut request) = fixture();
        request.steps = Some(vec![0, 1, 2]);
        let cancel = AtomicBool::new(false);

        let outcome = run_with(&request, &cancel, |command| {
            if command.program.ends_with("openMVG_main_ComputeFeatures") {
                ProcessExit::failed(Some(1))
            } else {
                ProcessExit::ok()
            }
        });

        let err = outcome.result.unwrap_err();
        assert_eq!(err.code, ErrorCode::StepFailed);
        assert_eq!(err.message, "Process failed at step 1");
        assert_eq!(err.details["completedSteps"], serde_json::json!([0]));
        assert_eq!(outcome.calls.len(), 2);
        assert_eq!(outcome.states.last(), Some(&RunState::Aborted));
    }

    #[test]
    fn model_aligner_retries_once_with_plane_alignment() {
        let (_root, mut request) = fixture();
        request.steps = Some(vec![15]);
        let cancel = AtomicBool::new(false);

        let outcome = run_with(&request, &cancel, |command| {
            if has_arg(command, "--ref_is_gps=1") {
                ProcessExit::failed(Some(1))
            } else {
                ProcessExit::ok()
            }
        });

        let report = outcome.result.unwrap();
        assert_eq!(outcome.calls.len(), 2);
        assert!(has_arg(&outcome.calls[1], "--ref_is_gps=0"));
        assert!(has_arg(&outcome.calls[1], "--alignment_type=plane"));
        assert_eq!(report.steps[0].attempts, 2);
        assert_eq!(report.steps[0].fallback, Some("gps-to-plane-alignment"));
        assert!(outcome.states.contains(&RunState::Retrying(15)));
    }

    #[test]
    fn model_aligner_gives_up_after_the_fallback_fails() {
        let (_root, mut request) = fixture();
        request.steps = Some(vec![15, 16]);
        let cancel = AtomicBool::new(false);

        let outcome = run_with(&request, &cancel, |command| {
            if has_arg(command, "model_aligner") {
                ProcessExit::failed(Some(1))
            } else {
                ProcessExit::ok()
            }
        });

        let err = outcome.result.unwrap_err();
        assert_eq!(err.message, "Process failed at step 15");
        assert_eq!(err.details["attempts"], 2);
        assert_eq!(outcome.calls.len(), 2);
    }

    #[test]
    fn no_retry_when_passthrough_disables_gps_alignment() {
        let (_root, mut request) = fixture();
        request.steps = Some(vec![15]);
        request.passthrough.insert(
            15,
            vec!["ref_is_gps".to_string(), "0".to_string()],
        );
        let cancel = AtomicBool::new(false);

        let outcome = run_with(&request, &cancel, |_| ProcessExit::failed(Some(1)));

        assert!(outcome.result.is_err());
        assert_eq!(outcome.calls.len(), 1);
        assert!(!has_arg(&outcome.calls[0], "--ref_is_gps=1"));
    }

    #[test]
    fn cancellation_stops_the_run_after_the_current_step() {
        let (_root, mut request) = fixture();
        request.steps = Some(vec![0, 1, 2]);
        let cancel = AtomicBool::new(false);

        let outcome = run_with(&request, &cancel, |command| {
            if command.program.ends_with("openMVG_main_ComputeFeatures") {
                cancel.store(true, Ordering::SeqCst);
                ProcessExit::failed(None)
            } else {
                ProcessExit::ok()
            }
        });

        let err = outcome.result.unwrap_err();
        assert_eq!(err.code, ErrorCode::StepCancelled);
        assert_eq!(err.details["step"], 1);
        assert_eq!(outcome.calls.len(), 2);
    }

    #[test]
    fn global_reconstruction_patches_the_filter_step() {
        let (_root, mut request) = fixture();
        request.steps = Some(vec![4, 6]);
        let cancel = AtomicBool::new(false);

        let outcome = run_with(&request, &cancel, |_| ProcessExit::ok());
        let report = outcome.result.unwrap();

        assert_eq!(report.patches, vec!["essential-matrix-filter"]);
        let filter = &outcome.calls[0];
        assert!(filter.args.iter().any(|a| a.ends_with("matches.e.bin")));
        assert_eq!(&filter.args[filter.args.len() - 2..], &["-g", "e"]);
    }

    #[test]
    fn texture_without_refine_reads_the_raw_mesh() {
        let (_root, mut request) = fixture();
        request.steps = Some(vec![21]);
        let cancel = AtomicBool::new(false);

        let outcome = run_with(&request, &cancel, |_| ProcessExit::ok());

        assert!(outcome.result.is_ok());
        let texture = &outcome.calls[0];
        assert!(texture.args.iter().any(|a| a.ends_with("scene_dense_mesh.ply")));
        assert!(!texture.args.iter().any(|a| a.contains("mesh_refine")));
    }

    #[test]
    fn passthrough_overrides_defaults_and_renders_placeholders() {
        let (_root, mut request) = fixture();
        request.steps = Some(vec![1]);
        request.passthrough.insert(
            1,
            vec![
                "m".to_string(),
                "AKAZE_FLOAT".to_string(),
                "p".to_string(),
                "HIGH".to_string(),
            ],
        );
        let cancel = AtomicBool::new(false);

        let outcome = run_with(&request, &cancel, |_| ProcessExit::ok());

        assert!(outcome.result.is_ok());
        let args = &outcome.calls[0].args;
        assert!(!args.iter().any(|a| a == "SIFT"));
        assert_eq!(args.iter().filter(|a| *a == "-m").count(), 1);
        assert_eq!(&args[args.len() - 4..], &["-m", "AKAZE_FLOAT", "-p", "HIGH"]);
    }

    #[test]
    fn dry_run_launches_nothing() {
        let (_root, mut request) = fixture();
        request.dry_run = true;
        let cancel = AtomicBool::new(false);

        let outcome = run_with(&request, &cancel, |_| ProcessExit::failed(Some(1)));
        let report = outcome.result.unwrap();

        assert!(outcome.calls.is_empty());
        assert!(report.dry_run);
        assert!(report.steps.iter().all(|s| s.status == StepStatus::NotRun));
    }

    #[test]
    fn missing_input_creates_nothing() {
        let (root, mut request) = fixture();
        request.input_dir = root.path().join("missing");
        let cancel = AtomicBool::new(false);

        let outcome = run_with(&request, &cancel, |_| ProcessExit::ok());

        let err = outcome.result.unwrap_err();
        assert_eq!(err.code, ErrorCode::InputNotFound);
        assert!(!root.path().join("out").exists());
        assert!(outcome.calls.is_empty());
        assert_eq!(outcome.armed_at, None);
    }

    #[test]
    fn steps_and_preset_together_are_rejected() {
        let (root, mut request) = fixture();
        request.steps = Some(vec![0]);
        request.preset = Some("MVS".to_string());
        let cancel = AtomicBool::new(false);

        let outcome = run_with(&request, &cancel, |_| ProcessExit::ok());

        assert_eq!(
            outcome.result.unwrap_err().code,
            ErrorCode::ValidationInvalidArgument
        );
        assert!(!root.path().join("out").exists());
    }
}
