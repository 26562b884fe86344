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

//! Experiment log analysis: split into runs, emulators and test cases, then
//! extract the timings of every test case into the times table.

use crate::config::ExperimentConfig;
use crate::consistency::check_emulator_split;
use crate::consistency::check_testcase_assignment;
use crate::error::GrindlogError;
use crate::gate::Gate;
use crate::gate::pass_gate;
use crate::marker::Classifier;
use crate::marker::ExperimentResult;
use crate::report::ResultRow;
use crate::report::clean_files;
use crate::report::write_times;
use crate::segment::SegmentNamer;
use crate::segment::display_path;
use crate::split::Partition;
use crate::split::RunSegment;
use crate::split::prescan_counts;
use crate::split::split_emulators;
use crate::split::split_runs;
use crate::split::split_testcases;
use crate::timing::extract_timing;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;

/// A test case segment waiting for timing extraction.
#[derive(Debug, Clone)]
struct TimingJob {
  run: usize,
  emu: u32,
  testcase: u32,
  path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExperimentSummary {
  pub runs: usize,
  pub rows: Vec<ResultRow>,
  /// Split files created by the analysis; empty after `--clean`.
  pub split_files: Vec<PathBuf>,
}

impl ExperimentSummary {
  /// Test cases for which no phase could be measured.
  pub fn not_measured(&self) -> usize {
    self.rows.iter().filter(|row| row.sysinit_ms < 0).count()
  }
}

pub async fn analyze_experiment(
  config: &ExperimentConfig,
  gate: &mut dyn Gate,
) -> Result<ExperimentSummary, GrindlogError> {
  let classifier = Arc::new(Classifier::new(&config.markers)?);
  let mut split_files = Vec::new();

  let runs = if config.single_run {
    tracing::info!("Treating [{}] as a single run.", display_path(&config.logfile));
    vec![RunSegment {
      index: 0,
      path: config.logfile.clone(),
      emulators: None,
      repetition: None,
    }]
  } else {
    tracing::info!("Splitting [{}] into runs...", display_path(&config.logfile));
    let namer = SegmentNamer::for_file(&config.logfile).in_dir(config.split_dir.as_deref());
    let runs = split_runs(&config.logfile, &classifier, namer)?;
    tracing::info!("Found {} runs.", runs.len());
    split_files.extend(runs.iter().map(|run| run.path.clone()));
    runs
  };

  if runs.is_empty() {
    tracing::warn!("The log contains no GRINDER run. Nothing to analyze.");
  }

  let mut jobs = Vec::new();
  for run in &runs {
    let span = tracing::info_span!("run", index = run.index);
    let _enter = span.enter();
    jobs.extend(split_run(config, &classifier, run, gate, &mut split_files)?);
  }

  let rows = extract_all(jobs, classifier, config.good_results.clone()).await?;
  write_times(&config.times_out, &rows, config.format)?;

  if config.clean {
    clean_files(&split_files)?;
    split_files.clear();
  }

  Ok(ExperimentSummary {
    runs: runs.len(),
    rows,
    split_files,
  })
}

/// Splits one run down to test case segments, gating on consistency issues.
fn split_run(
  config: &ExperimentConfig,
  classifier: &Classifier,
  run: &RunSegment,
  gate: &mut dyn Gate,
  split_files: &mut Vec<PathBuf>,
) -> Result<Vec<TimingJob>, GrindlogError> {
  let split_dir = config.split_dir.as_deref();

  let (channels, partition) = if config.single_emu {
    (BTreeMap::from([(0, run.path.clone())]), None)
  } else {
    let partition = match config.counts {
      Some((emulators, testcases)) => Partition::new(emulators, testcases)?,
      None => prescan_counts(&run.path, classifier)?,
    };
    tracing::info!(
      "Splitting [{}] by {} emulators and {} test cases...",
      display_path(&run.path),
      partition.emulators(),
      partition.testcases()
    );
    let namer = SegmentNamer::for_file(&run.path).in_dir(split_dir);
    let split = split_emulators(&run.path, classifier, partition, &namer)?;
    split_files.extend(split.channels.values().cloned());

    let report = check_emulator_split(partition, &split);
    pass_gate(gate, &format!("the emulator split of run {}", run.index), &report)?;
    (split.channels, Some(partition))
  };

  let mut jobs = Vec::new();
  let mut assignment: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
  for (emu, channel) in &channels {
    let namer = SegmentNamer::for_file(channel).in_dir(split_dir);
    let segments = split_testcases(channel, classifier, namer)?;
    tracing::debug!(emu, testcases = segments.len(), "Split emulator channel");
    assignment.insert(*emu, segments.keys().copied().collect());
    for (testcase, path) in segments {
      split_files.push(path.clone());
      jobs.push(TimingJob {
        run: run.index,
        emu: *emu,
        testcase,
        path,
      });
    }
  }

  if let Some(partition) = partition {
    let report = check_testcase_assignment(
      partition,
      assignment.iter().map(|(emu, ids)| (*emu, ids.as_slice())),
    );
    pass_gate(gate, &format!("the test case split of run {}", run.index), &report)?;
  }

  Ok(jobs)
}

/// Extracts all timings on the blocking pool. The first failure cancels the
/// rest and fails the analysis.
async fn extract_all(
  jobs: Vec<TimingJob>,
  classifier: Arc<Classifier>,
  good_results: Vec<ExperimentResult>,
) -> Result<Vec<ResultRow>, GrindlogError> {
  tracing::info!("Extracting times of {} test cases...", jobs.len());
  let good_results: Arc<[ExperimentResult]> = good_results.into();
  let mut tasks = JoinSet::new();

  for job in jobs {
    let classifier = Arc::clone(&classifier);
    let good_results = Arc::clone(&good_results);
    tasks.spawn_blocking(move || {
      extract_timing(&job.path, &classifier, &good_results)
        .map(|record| ResultRow::new(job.run, job.emu, job.testcase, record))
        .map_err(|source| GrindlogError::Timing {
          run: job.run,
          emulator: job.emu,
          testcase: job.testcase,
          path: job.path,
          source,
        })
    });
  }

  let mut rows = Vec::with_capacity(tasks.len());
  while let Some(joined) = tasks.join_next().await {
    rows.push(joined??);
  }
  rows.sort_by_key(|row| (row.run, row.emu, row.testcase));
  Ok(rows)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::gate::InconsistencyPolicy;
  use crate::marker::MarkerPatterns;
  use crate::report::TimesFormat;
  use std::fs;
  use tempfile::TempDir;
  use tempfile::tempdir;

  fn emu_line(emu: u32, stamp: &str, msg: &str) -> String {
    format!("{stamp} INFO  [pool-{emu}] EmulatedAndroid<{emu}/{}> - {msg}\n", 5554 + 2 * emu)
  }

  fn detect(emu: u32, stamp: &str, result: &str) -> String {
    format!(
      "{stamp} INFO  [det-{emu}] ExternalDetector<{emu}/{}> - Detected experiment end with result: {result}\n",
      5554 + 2 * emu
    )
  }

  fn testcase(emu: u32, id: u32, minute: u32) -> String {
    let stamp = |s: &str| format!("2016-05-12_10:{minute:02}:{s}");
    format!(
      "2016-05-12_10:{minute:02}:00.000000 INFO  [tc] TargetControllerImpl - Test case id: {id}\n{}{}{}",
      emu_line(emu, &stamp("00.000000"), "Starting experiment run"),
      emu_line(emu, &stamp("02.500000"), "Signaling Detector"),
      detect(emu, &stamp("05.750000"), "FINISHED"),
    )
  }

  /// Two emulators and four test cases in one run.
  fn experiment_log() -> String {
    let mut log = String::from("2016-05-12_09:59:00.000000 INFO  [main] Main - Starting the GRINDER client\n");
    log += &emu_line(0, "2016-05-12_09:59:01.000000", "Starting emulated Android");
    log += &emu_line(1, "2016-05-12_09:59:01.000000", "Starting emulated Android");
    log += &testcase(0, 1, 1);
    log += &testcase(1, 3, 1);
    log += &testcase(0, 2, 2);
    log += &testcase(1, 4, 2);
    log
  }

  fn config(temp: &TempDir, log: &str) -> ExperimentConfig {
    let logfile = temp.path().join("grinder.log");
    fs::write(&logfile, log).unwrap();
    ExperimentConfig {
      logfile,
      single_run: false,
      single_emu: false,
      counts: None,
      times_out: temp.path().join("times.csv"),
      format: TimesFormat::Csv,
      split_dir: None,
      clean: false,
      markers: MarkerPatterns::experiment(),
      good_results: vec![ExperimentResult::Finished],
      policy: InconsistencyPolicy::Abort,
    }
  }

  #[tokio::test]
  async fn full_analysis_writes_sorted_rows() {
    let temp = tempdir().unwrap();
    let config = config(&temp, &experiment_log());
    let mut gate = InconsistencyPolicy::Abort;
    let summary = analyze_experiment(&config, &mut gate).await.unwrap();

    assert_eq!(summary.runs, 1);
    assert_eq!(
      fs::read_to_string(&config.times_out).unwrap(),
      "Run,Emu,Testcase,SysInit,Workload\n\
       0,0,1,2500,3250\n\
       0,0,2,2500,3250\n\
       0,1,3,2500,3250\n\
       0,1,4,2500,3250\n"
    );
    assert!(temp.path().join("grinder-0.log").exists());
    assert!(temp.path().join("grinder-0-1.log").exists());
    assert!(temp.path().join("grinder-0-1-4.log").exists());
  }

  #[tokio::test]
  async fn clean_removes_split_files_but_not_the_input() {
    let temp = tempdir().unwrap();
    let mut config = config(&temp, &experiment_log());
    config.clean = true;
    let summary = analyze_experiment(&config, &mut InconsistencyPolicy::Abort)
      .await
      .unwrap();

    assert!(summary.split_files.is_empty());
    assert!(config.logfile.exists());
    assert!(config.times_out.exists());
    let left: Vec<_> = fs::read_dir(temp.path()).unwrap().collect();
    assert_eq!(left.len(), 2);
  }

  #[tokio::test]
  async fn single_run_single_emu_splits_only_testcases() {
    let temp = tempdir().unwrap();
    let split_dir = temp.path().join("split");
    fs::create_dir(&split_dir).unwrap();
    let mut config = config(&temp, &(testcase(0, 1, 1) + &testcase(0, 2, 2)));
    config.single_run = true;
    config.single_emu = true;
    config.split_dir = Some(split_dir.clone());

    let summary = analyze_experiment(&config, &mut InconsistencyPolicy::Abort)
      .await
      .unwrap();
    assert_eq!(summary.rows.len(), 2);
    assert_eq!(summary.rows[1].testcase, 2);
    assert!(split_dir.join("grinder-1.log").exists());
    assert!(split_dir.join("grinder-2.log").exists());
  }

  #[tokio::test]
  async fn log_without_runs_yields_an_empty_table() {
    let temp = tempdir().unwrap();
    let config = config(&temp, "just some noise\n");
    let summary = analyze_experiment(&config, &mut InconsistencyPolicy::Abort)
      .await
      .unwrap();
    assert_eq!(summary.runs, 0);
    assert_eq!(
      fs::read_to_string(&config.times_out).unwrap(),
      "Run,Emu,Testcase,SysInit,Workload\n"
    );
  }

  #[tokio::test]
  async fn wrong_counts_abort_at_the_gate() {
    let temp = tempdir().unwrap();
    let mut config = config(&temp, &experiment_log());
    config.counts = Some((2, 6));
    let err = analyze_experiment(&config, &mut InconsistencyPolicy::Abort)
      .await
      .unwrap_err();
    assert!(matches!(err, GrindlogError::Aborted { .. }), "{err:?}");
    assert!(!config.times_out.exists());
  }

  #[tokio::test]
  async fn missing_end_marker_fails_without_table() {
    let temp = tempdir().unwrap();
    let log = experiment_log().replace("Detected experiment end with result: FINISHED\n", "\n");
    let config = config(&temp, &log);
    let err = analyze_experiment(&config, &mut InconsistencyPolicy::Abort)
      .await
      .unwrap_err();
    assert!(matches!(err, GrindlogError::Timing { run: 0, .. }), "{err:?}");
    assert!(!config.times_out.exists());
  }
}
