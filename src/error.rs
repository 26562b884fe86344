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
use crate::consistency::IdKind;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error enum for the grindlog library.
#[derive(Error, Debug)]
pub enum GrindlogError {
  #[error("Log splitting failed")]
  Split(#[from] SplitError),

  #[error("Configuration error")]
  Config(#[from] ConfigError),

  #[error("Writing analysis output failed")]
  Report(#[from] ReportError),

  #[error(
    "Timing extraction failed for test case {testcase}, emu {emulator}, run {run} ({path}). Please check & fix manually!"
  )]
  Timing {
    run: usize,
    emulator: u32,
    testcase: u32,
    path: PathBuf,
    #[source]
    source: TimingError,
  },

  #[error("Aborted after {violations} consistency issue(s) in {stage}")]
  Aborted { stage: String, violations: usize },

  #[error("Failed to read operator confirmation")]
  Confirm(#[source] std::io::Error),

  #[error("Timing extraction task failed")]
  Join(#[from] tokio::task::JoinError),
}

/// Errors raised while splitting a log into run, emulator and test case files.
#[derive(Error, Debug)]
pub enum SplitError {
  #[error("Failed to open log file: {path}")]
  OpenInput {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Failed to read line {line} of {path}")]
  Read {
    path: PathBuf,
    line: usize,
    #[source]
    source: std::io::Error,
  },

  #[error("Failed to create split log file: {path}")]
  CreateSegment {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Failed to write split log file: {path}")]
  WriteSegment {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(
    "{kind} IDs in {path} have gaps: expected {expected}, but got {actual}. Log appears to be incomplete, this is not supported"
  )]
  IdGap {
    path: PathBuf,
    kind: IdKind,
    expected: u32,
    actual: u32,
  },

  #[error("Invalid partition: {testcases} test case(s) cannot be distributed over {emulators} emu(s)")]
  InvalidCounts { emulators: u32, testcases: u32 },

  #[error("Run {run} ({path}) does not state its number of parallel emus")]
  MissingParallelism { run: usize, path: PathBuf },
}

/// Errors raised by the per-test-case timing state machine.
#[derive(Error, Debug)]
pub enum TimingError {
  #[error("Failed to read test case log")]
  Read(#[from] SplitError),

  #[error("Did not find experiment start and/or end ({init_start:?} -> {exp_detect:?})")]
  MissingMarkers {
    init_start: Option<String>,
    exp_detect: Option<String>,
  },

  #[error("Malformed timestamp '{stamp}' on line {line}")]
  MalformedTimestamp {
    line: usize,
    stamp: String,
    #[source]
    source: chrono::ParseError,
  },

  #[error("Duration between lines {from} and {to} is out of range")]
  DurationOverflow { from: usize, to: usize },
}

/// Errors related to settings and command line resolution (src/config.rs).
#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Failed to load settings: {0}")]
  Load(#[from] Box<figment::Error>),

  #[error("Settings file not found: {0}")]
  MissingSettingsFile(PathBuf),

  #[error("Invalid '{name}' marker pattern: {pattern}")]
  InvalidPattern {
    name: &'static str,
    pattern: String,
    #[source]
    source: regex::Error,
  },

  #[error("Invalid search expression: {pattern}")]
  InvalidSearch {
    pattern: String,
    #[source]
    source: regex::Error,
  },

  #[error("{0}")]
  ConflictingOptions(&'static str),
}

/// Errors related to writing tables and cleaning up split files (src/report.rs).
#[derive(Error, Debug)]
pub enum ReportError {
  #[error("Failed to create output file: {path}")]
  Create {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Failed to write output file: {path}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Failed to serialize result row")]
  Serialize(#[from] serde_json::Error),

  #[error("Failed to remove {count} split log file(s)")]
  Clean {
    count: usize,
    #[source]
    source: fs_extra::error::Error,
  },

  #[error("Failed to count search matches in {path}")]
  Search {
    path: PathBuf,
    #[source]
    source: SplitError,
  },
}
