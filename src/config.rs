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
use crate::cli::CalibrationArgs;
use crate::cli::ExperimentArgs;
use crate::cli::ExtractArgs;
use crate::error::ConfigError;
use crate::gate::InconsistencyPolicy;
use crate::marker::ExperimentResult;
use crate::marker::MarkerPatterns;
use crate::report::TimesFormat;
use figment::Figment;
use figment::providers::Env;
use figment::providers::Format;
use figment::providers::Serialized;
use figment::providers::Toml;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;

/// Settings file picked up from the working directory when `--config` is not
/// given.
pub const DEFAULT_SETTINGS_FILE: &str = "grindlog.toml";

/// Prefix of environment variables overriding settings, e.g.
/// `GRINDLOG_ON_INCONSISTENCY=abort` or
/// `GRINDLOG_EXPERIMENT_MARKERS__RUN_START=...`.
pub const ENV_PREFIX: &str = "GRINDLOG_";

/// Layered settings: defaults, then the TOML file, then the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
  pub experiment_markers: MarkerPatterns,
  pub calibration_markers: MarkerPatterns,
  /// Result codes for which the workload duration is reported.
  pub good_results: Vec<String>,
  pub on_inconsistency: InconsistencyPolicy,
  pub times_format: TimesFormat,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      experiment_markers: MarkerPatterns::experiment(),
      calibration_markers: MarkerPatterns::calibration(),
      good_results: vec!["FINISHED".to_string()],
      on_inconsistency: InconsistencyPolicy::default(),
      times_format: TimesFormat::default(),
    }
  }
}

impl Settings {
  pub fn figment(config: Option<&Path>) -> Figment {
    let file = config.unwrap_or(Path::new(DEFAULT_SETTINGS_FILE));
    Figment::from(Serialized::defaults(Settings::default()))
      .merge(Toml::file(file))
      .merge(
        Env::prefixed(ENV_PREFIX)
          .ignore(&["log_file", "config"])
          .split("__"),
      )
  }

  pub fn load(config: Option<&Path>) -> Result<Self, ConfigError> {
    if let Some(path) = config {
      if !path.is_file() {
        return Err(ConfigError::MissingSettingsFile(path.to_path_buf()));
      }
    }
    let settings: Settings = Self::figment(config).extract().map_err(Box::new)?;
    tracing::debug!(?settings, "Settings loaded");
    Ok(settings)
  }

  pub fn good_results(&self) -> Vec<ExperimentResult> {
    self
      .good_results
      .iter()
      .map(|code| ExperimentResult::from_code(code))
      .collect()
  }
}

/// Fully resolved configuration of an experiment log analysis.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
  pub logfile: PathBuf,
  pub single_run: bool,
  pub single_emu: bool,
  /// Emulator and test case counts; `None` scans each run for them.
  pub counts: Option<(u32, u32)>,
  pub times_out: PathBuf,
  pub format: TimesFormat,
  pub split_dir: Option<PathBuf>,
  pub clean: bool,
  pub markers: MarkerPatterns,
  pub good_results: Vec<ExperimentResult>,
  pub policy: InconsistencyPolicy,
}

impl ExperimentConfig {
  pub fn resolve(
    ExperimentArgs {
      logfile,
      single_run,
      single_emu,
      testcases,
      emus,
      times_out,
      format,
      split_dir,
      on_inconsistency,
      clean,
    }: ExperimentArgs,
    settings: &Settings,
  ) -> Result<Self, ConfigError> {
    let counts = match (single_emu, emus, testcases) {
      (true, Some(_), _) => {
        return Err(ConfigError::ConflictingOptions(
          "options '--single-emu' and '--emus' cannot both be specified",
        ));
      }
      (true, None, Some(testcases)) => Some((1, testcases)),
      (_, Some(emus), Some(testcases)) => Some((emus, testcases)),
      (_, None, None) => None,
      _ => {
        return Err(ConfigError::ConflictingOptions(
          "options '--emus' and '--testcases' must both be specified",
        ));
      }
    };

    Ok(Self {
      logfile,
      single_run,
      single_emu,
      counts,
      times_out,
      format: format.unwrap_or(settings.times_format),
      split_dir,
      clean,
      markers: settings.experiment_markers.clone(),
      good_results: settings.good_results(),
      policy: on_inconsistency.unwrap_or(settings.on_inconsistency),
    })
  }

  /// Points out the options that would make the analysis faster.
  pub fn log_hints(&self) {
    if !self.single_run {
      tracing::info!(
        "You may want to use the '--single-run' option if the logfile contains only a single GRINDER run. This skips the splitting into individual log files per run."
      );
    }
    if !self.single_emu {
      tracing::info!(
        "You may want to use the '--single-emu' option if the logfile contains only a single emulator. This skips the splitting into individual log files per emulator."
      );
    }
    if self.counts.is_none() && !self.single_emu {
      tracing::info!(
        "You may want to use the '--emus' and '--testcases' options if you know the exact number of emulators and test cases in the logs. They cannot be used for multi-run logs with differing counts."
      );
    }
    if !self.clean {
      tracing::info!(
        "You may want to use the '--clean' option to delete all created split log files after the analysis."
      );
    }
  }
}

/// Fully resolved configuration of a calibration log analysis.
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
  pub logfile: PathBuf,
  pub search: Option<Regex>,
  pub verbose_search: bool,
  pub csvfile: PathBuf,
  pub split_dir: Option<PathBuf>,
  pub clean: bool,
  pub markers: MarkerPatterns,
  pub policy: InconsistencyPolicy,
}

impl CalibrationConfig {
  pub fn resolve(
    CalibrationArgs {
      logfile,
      search,
      verbose_search,
      csvfile,
      split_dir,
      on_inconsistency,
      clean,
    }: CalibrationArgs,
    settings: &Settings,
  ) -> Result<Self, ConfigError> {
    let search = search
      .map(|pattern| {
        Regex::new(&pattern).map_err(|source| ConfigError::InvalidSearch { pattern, source })
      })
      .transpose()?;

    Ok(Self {
      logfile,
      search,
      verbose_search,
      csvfile,
      split_dir,
      clean,
      markers: settings.calibration_markers.clone(),
      policy: on_inconsistency.unwrap_or(settings.on_inconsistency),
    })
  }
}

/// Configuration of a test case extraction.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
  pub logfile: PathBuf,
  pub testcases: Vec<u32>,
  pub split_dir: Option<PathBuf>,
  pub markers: MarkerPatterns,
}

impl ExtractConfig {
  pub fn resolve(
    ExtractArgs {
      logfile,
      testcases,
      split_dir,
    }: ExtractArgs,
    settings: &Settings,
  ) -> Self {
    Self {
      logfile,
      testcases,
      split_dir,
      markers: settings.experiment_markers.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;
  use crate::cli::Cli;
  use crate::cli::Commands;

  fn experiment_args(args: &[&str]) -> ExperimentArgs {
    let cli = Cli::try_parse_from(
      ["grindlog", "experiment"]
        .iter()
        .chain(args.iter())
        .copied(),
    )
    .unwrap();
    match cli.command {
      Commands::Experiment(args) => args,
      other => panic!("unexpected command {other:?}"),
    }
  }

  #[test]
  fn counts_need_both_options() {
    let settings = Settings::default();
    let config =
      ExperimentConfig::resolve(experiment_args(&["log.log", "-e", "4", "-t", "400"]), &settings)
        .unwrap();
    assert_eq!(config.counts, Some((4, 400)));

    let err = ExperimentConfig::resolve(experiment_args(&["log.log", "-t", "400"]), &settings)
      .unwrap_err();
    assert!(err.to_string().contains("must both be specified"));
  }

  #[test]
  fn single_emu_with_testcases_implies_one_emulator() {
    let config = ExperimentConfig::resolve(
      experiment_args(&["log.log", "--single-emu", "-t", "12"]),
      &Settings::default(),
    )
    .unwrap();
    assert_eq!(config.counts, Some((1, 12)));
  }

  #[test]
  fn defaults_come_from_settings() {
    let settings = Settings {
      on_inconsistency: InconsistencyPolicy::Abort,
      times_format: TimesFormat::Jsonl,
      ..Settings::default()
    };
    let config = ExperimentConfig::resolve(experiment_args(&["log.log"]), &settings).unwrap();
    assert_eq!(config.policy, InconsistencyPolicy::Abort);
    assert_eq!(config.format, TimesFormat::Jsonl);
    assert_eq!(config.good_results, vec![ExperimentResult::Finished]);
    assert_eq!(config.times_out, PathBuf::from("times.csv"));

    let config = ExperimentConfig::resolve(
      experiment_args(&["log.log", "--on-inconsistency", "continue", "--format", "csv"]),
      &settings,
    )
    .unwrap();
    assert_eq!(config.policy, InconsistencyPolicy::Continue);
    assert_eq!(config.format, TimesFormat::Csv);
  }

  #[test]
  fn settings_file_overrides_defaults() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("custom.toml");
    std::fs::write(
      &path,
      r#"
good_results = ["FINISHED", "APPLICATION_HANG_ASSUMED"]
on_inconsistency = "continue"

[experiment_markers]
run_start = "GRINDER client up"
"#,
    )
    .unwrap();

    let settings = Settings::load(Some(&path)).unwrap();
    assert_eq!(settings.on_inconsistency, InconsistencyPolicy::Continue);
    assert_eq!(settings.experiment_markers.run_start, "GRINDER client up");
    // Unset keys keep their defaults.
    assert_eq!(
      settings.experiment_markers.testcase_boundary,
      MarkerPatterns::experiment().testcase_boundary
    );
    assert_eq!(settings.calibration_markers, MarkerPatterns::calibration());
    assert_eq!(
      settings.good_results(),
      vec![
        ExperimentResult::Finished,
        ExperimentResult::ApplicationHangAssumed
      ]
    );
  }

  #[test]
  fn missing_explicit_settings_file_is_an_error() {
    let err = Settings::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::MissingSettingsFile(_)));
  }

  #[test]
  fn invalid_search_expression_is_rejected() {
    let cli = Cli::try_parse_from(["grindlog", "calibration", "calib.log", "-s", "(unclosed"]).unwrap();
    let Commands::Calibration(args) = cli.command else {
      panic!("expected calibration");
    };
    let err = CalibrationConfig::resolve(args, &Settings::default()).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidSearch { .. }));
  }
}
