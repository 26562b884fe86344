// Copyright 2025 Chisomo Makombo Sakala
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
use crate::gate::InconsistencyPolicy;
use crate::report::TimesFormat;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about = "Splits GRINDER logs and extracts test case timings")]
pub struct Cli {
  /// TOML settings file with marker patterns and defaults.
  /// Falls back to ./grindlog.toml when present.
  #[arg(long, global = true, env = "GRINDLOG_CONFIG")]
  pub config: Option<PathBuf>,

  #[command(subcommand)]
  pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
  /// Analyze an experiment log and write per-test-case times.
  Experiment(ExperimentArgs),
  /// Analyze a calibration log, optionally counting search matches per emu.
  Calibration(CalibrationArgs),
  /// Copy the lines of selected test cases into separate files.
  Extract(ExtractArgs),
}

#[derive(Debug, Args)]
pub struct ExperimentArgs {
  /// GRINDER experiment log file.
  pub logfile: PathBuf,

  /// The log contains a single GRINDER run; skip the run split.
  #[arg(long)]
  pub single_run: bool,

  /// The log contains a single emulator; skip the emulator split.
  #[arg(long, conflicts_with = "emus")]
  pub single_emu: bool,

  /// Number of test cases per run. Requires --emus unless --single-emu is set.
  #[arg(short, long)]
  pub testcases: Option<u32>,

  /// Number of emulators per run. Requires --testcases.
  #[arg(short, long)]
  pub emus: Option<u32>,

  /// Output file for the times table.
  #[arg(long, default_value = "times.csv")]
  pub times_out: PathBuf,

  /// Output format of the times table [default: from settings, csv]
  #[arg(long, value_enum)]
  pub format: Option<TimesFormat>,

  /// Directory for split log files; defaults to the log file's directory.
  #[arg(long)]
  pub split_dir: Option<PathBuf>,

  /// What to do on consistency issues [default: from settings, prompt]
  #[arg(long, value_enum)]
  pub on_inconsistency: Option<InconsistencyPolicy>,

  /// Delete all split log files after the analysis.
  #[arg(long)]
  pub clean: bool,
}

#[derive(Debug, Args)]
pub struct CalibrationArgs {
  /// GRINDER calibration log file.
  pub logfile: PathBuf,

  /// Regular expression to count matching lines per emulator.
  #[arg(short, long)]
  pub search: Option<String>,

  /// Log which emulators had matches.
  #[arg(long, requires = "search")]
  pub verbose_search: bool,

  /// Output file for the search results.
  #[arg(long, default_value = "matches.csv")]
  pub csvfile: PathBuf,

  /// Directory for split log files; defaults to the log file's directory.
  #[arg(long)]
  pub split_dir: Option<PathBuf>,

  /// What to do on consistency issues [default: from settings, prompt]
  #[arg(long, value_enum)]
  pub on_inconsistency: Option<InconsistencyPolicy>,

  /// Delete all split log files after the analysis.
  #[arg(long)]
  pub clean: bool,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
  /// Log file containing the test cases.
  pub logfile: PathBuf,

  /// IDs of the test cases to extract.
  #[arg(short, long, required = true, num_args = 1..)]
  pub testcases: Vec<u32>,

  /// Directory for the extracted files; defaults to the log file's directory.
  #[arg(long)]
  pub split_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::CommandFactory;

  #[test]
  fn cli_definition_is_valid() {
    Cli::command().debug_assert();
  }

  #[test]
  fn single_emu_conflicts_with_emus() {
    let err = Cli::try_parse_from(["grindlog", "experiment", "x.log", "--single-emu", "-e", "2"])
      .unwrap_err();
    assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
  }

  #[test]
  fn extract_takes_several_ids() {
    let cli = Cli::try_parse_from(["grindlog", "extract", "x.log", "-t", "3", "17"]).unwrap();
    let Commands::Extract(args) = cli.command else {
      panic!("expected extract");
    };
    assert_eq!(args.testcases, vec![3, 17]);
  }
}
