use clap::{Arg, ArgMatches, Command, CommandFactory, FromArgMatches, Parser};
use std::collections::BTreeMap;

mod commands;
mod output;
mod tty;

use commands::run::{self, RunArgs};
use mvgmvs::catalog::{self, STEP_COUNT};
use mvgmvs::preset::{self, DEFAULT_PRESET};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "mvgmvs")]
#[command(version = VERSION)]
#[command(about = "Photogrammetry reconstruction driver for openMVG, COLMAP and openMVS")]
struct Cli {
    #[command(flatten)]
    run: RunArgs,
}

fn catalog_help() -> String {
    let mut help = String::from("Steps:\n");
    for step in catalog::steps() {
        help.push_str(&format!(
            "  {:>2}. {} ({})\n",
            step.index, step.label, step.binary
        ));
    }

    help.push_str("\nPresets:\n");
    for (name, steps) in preset::PRESETS {
        let steps: Vec<String> = steps.iter().map(|i| i.to_string()).collect();
        let default = if *name == DEFAULT_PRESET { " (default)" } else { "" };
        help.push_str(&format!("  {:<11} {}{}\n", name, steps.join(" "), default));
    }

    help.push_str(
        "\nPassthrough:\n  --N NAME VALUE ... adds options to step N, replacing defaults of the same name.\n  \
         One-letter names become -x, longer ones --name. Example: --1 p HIGH n 8\n",
    );
    help
}

fn build_augmented_command() -> Command {
    let mut cmd = Cli::command().after_help(catalog_help());

    for index in 0..STEP_COUNT {
        let label = catalog::step(index).map(|s| s.label).unwrap_or_default();
        cmd = cmd.arg(
            Arg::new(index.to_string())
                .long(index.to_string())
                .value_name("NAME VALUE")
                .help(format!("Extra options for step {} ({})", index, label))
                .num_args(1..)
                .allow_negative_numbers(true)
                .hide(true),
        );
    }

    cmd
}

fn collect_passthrough(matches: &ArgMatches) -> BTreeMap<usize, Vec<String>> {
    (0..STEP_COUNT)
        .filter_map(|index| {
            let values = matches.get_many::<String>(&index.to_string())?;
            Some((index, values.cloned().collect()))
        })
        .collect()
}

fn main() -> std::process::ExitCode {
    let matches = build_augmented_command().get_matches();

    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(e) => {
            e.exit();
        }
    };

    let passthrough = collect_passthrough(&matches);
    let result = run::run(cli.run, passthrough);

    let (json_result, exit_code) = output::map_cmd_result_to_json(result);
    if let Err(err) = output::print_json_result(json_result) {
        eprintln!("{}", err);
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
