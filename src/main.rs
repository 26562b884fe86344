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
use Commands::Calibration;
use Commands::Experiment;
use Commands::Extract;
use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use grindlog::analysis::analyze_experiment;
use grindlog::calibration::analyze_calibration;
use grindlog::cli::Cli;
use grindlog::cli::Commands;
use grindlog::config::CalibrationConfig;
use grindlog::config::ExperimentConfig;
use grindlog::config::ExtractConfig;
use grindlog::config::Settings;
use grindlog::extract::extract_testcases;
use grindlog::logging::setup_tracing;
use grindlog::segment::display_path;

#[tokio::main]
async fn main() -> Result<()> {
  let _log_guard = setup_tracing()?;

  let Cli { config, command } = Cli::parse();
  let main_span = tracing::info_span!("grindlog");
  let _enter = main_span.enter();

  let settings = Settings::load(config.as_deref()).context("Failed to load settings")?;

  match command {
    Experiment(args) => {
      let config = ExperimentConfig::resolve(args, &settings)?;
      tracing::info!("Analyzing experiment log [{}]...", display_path(&config.logfile));
      config.log_hints();

      let mut policy = config.policy;
      let summary = analyze_experiment(&config, &mut policy)
        .await
        .with_context(|| format!("Analysis of {} failed", display_path(&config.logfile)))?;

      tracing::info!(
        runs = summary.runs,
        testcases = summary.rows.len(),
        not_measured = summary.not_measured(),
        "Times written to [{}]",
        display_path(&config.times_out)
      );
    }
    Calibration(args) => {
      let config = CalibrationConfig::resolve(args, &settings)?;
      tracing::info!("Analyzing calibration log [{}]...", display_path(&config.logfile));

      let mut policy = config.policy;
      let summary = analyze_calibration(&config, &mut policy)
        .with_context(|| format!("Analysis of {} failed", display_path(&config.logfile)))?;

      tracing::info!(runs = summary.runs, "Calibration analysis complete.");
      if summary.matches.is_some() {
        tracing::info!("Search results written to [{}]", display_path(&config.csvfile));
      }
    }
    Extract(args) => {
      let config = ExtractConfig::resolve(args, &settings);
      let extracted = extract_testcases(&config)
        .with_context(|| format!("Extraction from {} failed", display_path(&config.logfile)))?;
      tracing::info!("Extracted {} of {} test cases.", extracted.len(), config.testcases.len());
    }
  }

  tracing::info!("Fin.");
  Ok(())
}
