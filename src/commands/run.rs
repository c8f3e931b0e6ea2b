use clap::Args;
use std::collections::BTreeMap;
use std::path::PathBuf;

use mvgmvs::defaults::{self, ToolDirs};
use mvgmvs::interrupt;
use mvgmvs::pipeline::{self, PipelineRequest, RunEnv, RunEvent, RunReport};
use mvgmvs::toolchain::{NoPrompt, PathSearch, Prompter};
use mvgmvs::utils::command::SystemLauncher;

use super::CmdResult;
use crate::tty::{self, TtyPrompter};

const END_MARKER: &str = "# Pipeline end #";

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Folder holding the input pictures
    pub input_dir: PathBuf,

    /// Folder receiving the reconstruction (sfm/, sfm/matches/, mvs/)
    pub output_dir: PathBuf,

    /// Steps to run, by index
    #[arg(long, num_args = 1.., value_name = "N")]
    pub steps: Option<Vec<usize>>,

    /// Named step preset (default: SEQUENTIAL)
    #[arg(long, value_name = "NAME")]
    pub preset: Option<String>,

    /// Print every command without launching anything
    #[arg(long)]
    pub dry_run: bool,

    /// openMVG binary folder
    #[arg(long, value_name = "DIR")]
    pub openmvg_bin: Option<String>,

    /// COLMAP binary folder
    #[arg(long, value_name = "DIR")]
    pub colmap_bin: Option<String>,

    /// openMVS binary folder
    #[arg(long, value_name = "DIR")]
    pub openmvs_bin: Option<String>,

    /// Folder holding sensor_width_camera_database.txt
    #[arg(long, value_name = "DIR")]
    pub sensor_db_dir: Option<String>,
}

impl RunArgs {
    fn into_request(self, passthrough: BTreeMap<usize, Vec<String>>) -> PipelineRequest {
        PipelineRequest {
            input_dir: self.input_dir,
            output_dir: self.output_dir,
            steps: self.steps,
            preset: self.preset,
            passthrough,
            tool_dirs: ToolDirs {
                openmvg_bin: self.openmvg_bin,
                colmap_bin: self.colmap_bin,
                openmvs_bin: self.openmvs_bin,
                sensor_db_dir: self.sensor_db_dir,
            },
            dry_run: self.dry_run,
        }
    }
}

pub fn run(args: RunArgs, passthrough: BTreeMap<usize, Vec<String>>) -> CmdResult<RunReport> {
    let defaults = defaults::load_defaults();
    if let Ok(path) = defaults::config_path() {
        tty::status(&format!("# Config file: {}", path));
    }
    let locator = PathSearch::from_env(&defaults.search_paths);

    let mut interactive = TtyPrompter;
    let mut silent = NoPrompt;
    let prompter: &mut dyn Prompter = if tty::is_stdin_tty() {
        &mut interactive
    } else {
        &mut silent
    };
    let mut launcher = SystemLauncher;

    let request = args.into_request(passthrough);
    let result = pipeline::execute(
        &request,
        RunEnv {
            defaults: &defaults,
            locator: &locator,
            prompter,
            launcher: &mut launcher,
        },
        interrupt::install,
        &mut report_progress,
    );

    eprintln!("{}", END_MARKER);

    result.map(|report| (report, 0))
}

fn report_progress(event: RunEvent<'_>) {
    match event {
        RunEvent::State(state) => {
            mvgmvs::log_status!("pipeline", "{:?}", state);
        }
        RunEvent::Planned { layout, selection } => {
            let steps: Vec<String> = selection.steps().iter().map(|i| i.to_string()).collect();
            eprintln!("# Using input dir:  {}", layout.input_dir.display());
            eprintln!("#       output dir: {}", layout.output_dir.display());
            match selection.preset() {
                Some(name) => eprintln!("# Steps ({}): {}", name, steps.join(" ")),
                None => eprintln!("# Steps: {}", steps.join(" ")),
            }
        }
        RunEvent::StepStarted { index, label } => {
            tty::banner(&format!("#{}. {}", index, label));
        }
        RunEvent::Command(command) => {
            eprintln!("Cmd: {}", command.display());
        }
        RunEvent::Retrying { .. } => {
            eprintln!("# Retry COLMAP model-aligner step using plane alignment instead of GPS");
        }
    }
}
