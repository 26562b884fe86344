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

//! Calibration log analysis.
//!
//! Calibration campaigns repeat runs with a growing number of parallel
//! emulators and no test cases. Each run is split by emulator and the channels
//! can be searched for a regular expression.

use crate::config::CalibrationConfig;
use crate::consistency::check_emulator_split;
use crate::error::GrindlogError;
use crate::error::ReportError;
use crate::error::SplitError;
use crate::gate::Gate;
use crate::gate::pass_gate;
use crate::marker::Classifier;
use crate::report::MatchCount;
use crate::report::clean_files;
use crate::report::write_matches;
use crate::segment::LineReader;
use crate::segment::SegmentNamer;
use crate::segment::display_path;
use crate::split::EmulatorSplit;
use crate::split::Partition;
use crate::split::split_emulators;
use crate::split::split_runs;
use regex::Regex;
use std::path::Path;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalibrationSummary {
  pub runs: usize,
  /// Present when a search expression was given.
  pub matches: Option<Vec<MatchCount>>,
  pub split_files: Vec<PathBuf>,
}

pub fn analyze_calibration(
  config: &CalibrationConfig,
  gate: &mut dyn Gate,
) -> Result<CalibrationSummary, GrindlogError> {
  let classifier = Classifier::new(&config.markers)?;
  let split_dir = config.split_dir.as_deref();

  tracing::info!("Splitting [{}] into calibration runs...", display_path(&config.logfile));
  let namer = SegmentNamer::for_file(&config.logfile).in_dir(split_dir);
  let runs = split_runs(&config.logfile, &classifier, namer)?;
  tracing::info!("Found {} runs.", runs.len());
  if runs.is_empty() {
    tracing::warn!("The log contains no calibration run. Nothing to analyze.");
  }

  let mut split_files: Vec<PathBuf> = runs.iter().map(|run| run.path.clone()).collect();
  let mut counts = Vec::new();

  for run in &runs {
    let span = tracing::info_span!("run", index = run.index, repetition = run.repetition);
    let _enter = span.enter();

    let emulators = run.emulators.ok_or_else(|| SplitError::MissingParallelism {
      run: run.index,
      path: run.path.clone(),
    })?;
    let partition = Partition::new(emulators, 0)?;
    tracing::info!("Splitting [{}] by {} emulators...", display_path(&run.path), emulators);

    let namer = SegmentNamer::for_file(&run.path).in_dir(split_dir);
    let split = split_emulators(&run.path, &classifier, partition, &namer)?;
    split_files.extend(split.channels.values().cloned());

    let report = check_emulator_split(partition, &split);
    pass_gate(gate, &format!("the emulator split of calibration run {}", run.index), &report)?;

    if let Some(search) = &config.search {
      counts.extend(count_run_matches(search, run.index, partition, &split)?);
    }
  }

  let matches = match &config.search {
    Some(search) => {
      report_matches(search, &counts, config.verbose_search);
      write_matches(&config.csvfile, &counts)?;
      Some(counts)
    }
    None => None,
  };

  if config.clean {
    clean_files(&split_files)?;
    split_files.clear();
  }

  Ok(CalibrationSummary {
    runs: runs.len(),
    matches,
    split_files,
  })
}

/// Counts the lines of `path` matching `search`.
pub fn count_matches(path: &Path, search: &Regex) -> Result<usize, SplitError> {
  let mut reader = LineReader::open(path)?;
  let mut matches = 0;
  while let Some(line) = reader.next_line()? {
    if search.is_match(&line.text()) {
      matches += 1;
    }
  }
  Ok(matches)
}

/// One row per expected emulator; emulators without a channel have no matches.
fn count_run_matches(
  search: &Regex,
  run: usize,
  partition: Partition,
  split: &EmulatorSplit,
) -> Result<Vec<MatchCount>, ReportError> {
  (0..partition.emulators())
    .map(|emu| {
      let matches = match split.channels.get(&emu) {
        Some(path) => count_matches(path, search).map_err(|source| ReportError::Search {
          path: path.clone(),
          source,
        })?,
        None => 0,
      };
      Ok(MatchCount { run, emu, matches })
    })
    .collect()
}

fn report_matches(search: &Regex, counts: &[MatchCount], verbose: bool) {
  let hits: Vec<&MatchCount> = counts.iter().filter(|count| count.matches > 0).collect();
  if verbose {
    for hit in &hits {
      tracing::info!(
        "Run {} emu {}: {} lines match '{}'",
        hit.run,
        hit.emu,
        hit.matches,
        search.as_str()
      );
    }
  }
  tracing::info!(
    "{} of {} emulator channels contain '{}'.",
    hits.len(),
    counts.len(),
    search.as_str()
  );
}
