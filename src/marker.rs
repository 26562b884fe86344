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

//! Recognition of GRINDER log markers.
//!
//! A [`MarkerPatterns`] value holds the textual regular expressions for one
//! kind of log (experiment or calibration). It is compiled once into a
//! [`Classifier`], which every splitting and extraction pass then shares.
//!
//! Patterns with a numeric ID use capture group 1 for it. The run start
//! pattern may name the groups `emus` and `repetition`; the timed event
//! patterns capture the timestamp in group 1 and, for the experiment end, the
//! result code in group 2.

use crate::error::ConfigError;
use chrono::NaiveDateTime;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;

/// Format of the wall clock stamps that prefix every GRINDER log line.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H:%M:%S%.f";

/// Textual marker patterns for one log flavour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerPatterns {
  pub run_start: String,
  #[serde(default)]
  pub run_end: Option<String>,
  #[serde(default)]
  pub end_of_all_runs: Option<String>,
  #[serde(default)]
  pub emulator_start: Option<String>,
  #[serde(default)]
  pub emulator_tags: Vec<String>,
  #[serde(default)]
  pub testcase_boundary: Option<String>,
  #[serde(default)]
  pub experiment_start: Option<String>,
  #[serde(default)]
  pub workload_start: Option<String>,
  #[serde(default)]
  pub experiment_end: Option<String>,
}

impl MarkerPatterns {
  /// Markers of a regular fault injection log. Runs are delimited by a
  /// repeating start marker only.
  pub fn experiment() -> Self {
    Self {
      run_start: "Starting the GRINDER client".to_string(),
      run_end: None,
      end_of_all_runs: None,
      emulator_start: Some(r"EmulatedAndroid<(\d+)/(\d+)> - Starting emulated Android".to_string()),
      emulator_tags: vec![r"<(\d+)/(\d+)> - ".to_string()],
      testcase_boundary: Some(r"TargetControllerImpl - Test case id: (\d+)".to_string()),
      experiment_start: Some(
        r"^(\S+_\S+) [A-Z]+ .+EmulatedAndroid<.+> - Starting experiment run".to_string(),
      ),
      workload_start: Some(
        r"^(\S+_\S+) [A-Z]+ .+EmulatedAndroid<.+> - Signaling Detector".to_string(),
      ),
      experiment_end: Some(
        r"^(\S+_\S+) [A-Z]+ .+ExternalDetector<.+> - Detected experiment end with result: ([A-Z_]+)"
          .to_string(),
      ),
    }
  }

  /// Markers of a calibration log, where runs are bracketed by explicit start
  /// and end markers and the whole campaign ends with a final marker.
  pub fn calibration() -> Self {
    Self {
      run_start: concat!(
        r"EmulatedAndroidCalib - Starting calibration run: ",
        r"(?P<emus>\d+) parallel emus, repetition (?P<repetition>\d+)"
      )
      .to_string(),
      run_end: Some(r"EmulatedAndroidCalib - Finished calibration run\.".to_string()),
      end_of_all_runs: Some(r"EmulatedAndroidCalib - Finished all calibration runs\.".to_string()),
      emulator_start: None,
      emulator_tags: vec![
        r"<(\d+)/(\d{4})> - ".to_string(),
        r"CalibrationRun<(\d+)> - ".to_string(),
      ],
      testcase_boundary: None,
      experiment_start: None,
      workload_start: None,
      experiment_end: None,
    }
  }
}

/// Outcome classification reported by the external experiment detector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExperimentResult {
  ExperimentFailure,
  None,
  Finished,
  SystemHangDetected,
  SystemHangAssumed,
  SystemCrashDetected,
  ApplicationHangDetected,
  ApplicationHangAssumed,
  ApplicationFaultDetected,
  SysinitHangAssumed,
  SystemOopsDetected,
  /// A code this version does not know about, kept verbatim.
  Other(String),
}

impl ExperimentResult {
  pub fn from_code(code: &str) -> Self {
    match code {
      "EXPERIMENT_FAILURE" => Self::ExperimentFailure,
      "NONE" => Self::None,
      "FINISHED" => Self::Finished,
      "SYSTEM_HANG_DETECTED" => Self::SystemHangDetected,
      "SYSTEM_HANG_ASSUMED" => Self::SystemHangAssumed,
      "SYSTEM_CRASH_DETECTED" => Self::SystemCrashDetected,
      "APPLICATION_HANG_DETECTED" => Self::ApplicationHangDetected,
      "APPLICATION_HANG_ASSUMED" => Self::ApplicationHangAssumed,
      "APPLICATION_FAULT_DETECTED" => Self::ApplicationFaultDetected,
      "SYSINIT_HANG_ASSUMED" => Self::SysinitHangAssumed,
      "SYSTEM_OOPS_DETECTED" => Self::SystemOopsDetected,
      other => Self::Other(other.to_string()),
    }
  }

  pub fn code(&self) -> &str {
    match self {
      Self::ExperimentFailure => "EXPERIMENT_FAILURE",
      Self::None => "NONE",
      Self::Finished => "FINISHED",
      Self::SystemHangDetected => "SYSTEM_HANG_DETECTED",
      Self::SystemHangAssumed => "SYSTEM_HANG_ASSUMED",
      Self::SystemCrashDetected => "SYSTEM_CRASH_DETECTED",
      Self::ApplicationHangDetected => "APPLICATION_HANG_DETECTED",
      Self::ApplicationHangAssumed => "APPLICATION_HANG_ASSUMED",
      Self::ApplicationFaultDetected => "APPLICATION_FAULT_DETECTED",
      Self::SysinitHangAssumed => "SYSINIT_HANG_ASSUMED",
      Self::SystemOopsDetected => "SYSTEM_OOPS_DETECTED",
      Self::Other(code) => code,
    }
  }
}

impl fmt::Display for ExperimentResult {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.code())
  }
}

/// Numbers captured from a run start line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStart {
  pub emulators: Option<u32>,
  pub repetition: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
  ExperimentStart,
  WorkloadStart,
  ExperimentEnd(ExperimentResult),
}

/// A timing marker together with its not yet parsed timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedEvent<'a> {
  pub kind: EventKind,
  pub stamp: &'a str,
}

impl TimedEvent<'_> {
  pub fn timestamp(&self) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(self.stamp, TIMESTAMP_FORMAT)
  }
}

/// The single classification of a line, picked by priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker<'a> {
  RunStart(RunStart),
  RunEnd,
  EndOfAllRuns,
  TestcaseBoundary(u32),
  EmulatorStart(u32),
  TimedEvent(TimedEvent<'a>),
  EmulatorTag(u32),
  Unclassified,
}

/// Compiled marker patterns.
#[derive(Debug, Clone)]
pub struct Classifier {
  run_start: Regex,
  run_end: Option<Regex>,
  end_of_all_runs: Option<Regex>,
  emulator_start: Option<Regex>,
  emulator_tags: Vec<Regex>,
  testcase_boundary: Option<Regex>,
  experiment_start: Option<Regex>,
  workload_start: Option<Regex>,
  experiment_end: Option<Regex>,
}

fn compile(name: &'static str, pattern: &str) -> Result<Regex, ConfigError> {
  Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
    name,
    pattern: pattern.to_string(),
    source,
  })
}

fn compile_opt(name: &'static str, pattern: Option<&String>) -> Result<Option<Regex>, ConfigError> {
  pattern.map(|p| compile(name, p)).transpose()
}

/// Parses capture group 1 as an ID. Out of range numbers count as no match.
fn capture_id(re: &Regex, line: &str) -> Option<u32> {
  re.captures(line)?.get(1)?.as_str().parse().ok()
}

fn named_u32(caps: &regex::Captures<'_>, name: &str) -> Option<u32> {
  caps.name(name)?.as_str().parse().ok()
}

fn matches(re: Option<&Regex>, line: &str) -> bool {
  re.is_some_and(|re| re.is_match(line))
}

impl Classifier {
  pub fn new(patterns: &MarkerPatterns) -> Result<Self, ConfigError> {
    Ok(Self {
      run_start: compile("run_start", &patterns.run_start)?,
      run_end: compile_opt("run_end", patterns.run_end.as_ref())?,
      end_of_all_runs: compile_opt("end_of_all_runs", patterns.end_of_all_runs.as_ref())?,
      emulator_start: compile_opt("emulator_start", patterns.emulator_start.as_ref())?,
      emulator_tags: patterns
        .emulator_tags
        .iter()
        .map(|p| compile("emulator_tags", p))
        .collect::<Result<_, _>>()?,
      testcase_boundary: compile_opt("testcase_boundary", patterns.testcase_boundary.as_ref())?,
      experiment_start: compile_opt("experiment_start", patterns.experiment_start.as_ref())?,
      workload_start: compile_opt("workload_start", patterns.workload_start.as_ref())?,
      experiment_end: compile_opt("experiment_end", patterns.experiment_end.as_ref())?,
    })
  }

  /// Whether runs are closed by an explicit end marker.
  pub fn has_run_end(&self) -> bool {
    self.run_end.is_some()
  }

  pub fn run_start(&self, line: &str) -> Option<RunStart> {
    let caps = self.run_start.captures(line)?;
    Some(RunStart {
      emulators: named_u32(&caps, "emus"),
      repetition: named_u32(&caps, "repetition"),
    })
  }

  pub fn is_run_end(&self, line: &str) -> bool {
    matches(self.run_end.as_ref(), line)
  }

  pub fn is_end_of_all_runs(&self, line: &str) -> bool {
    matches(self.end_of_all_runs.as_ref(), line)
  }

  pub fn emulator_start_id(&self, line: &str) -> Option<u32> {
    capture_id(self.emulator_start.as_ref()?, line)
  }

  /// ID of the emulator whose tag the line carries, trying each tag pattern in
  /// order.
  pub fn emulator_id(&self, line: &str) -> Option<u32> {
    self
      .emulator_tags
      .iter()
      .find_map(|re| capture_id(re, line))
  }

  pub fn testcase_id(&self, line: &str) -> Option<u32> {
    capture_id(self.testcase_boundary.as_ref()?, line)
  }

  pub fn timed_event<'a>(&self, line: &'a str) -> Option<TimedEvent<'a>> {
    if let Some(stamp) = self.stamp(self.experiment_start.as_ref(), line) {
      return Some(TimedEvent {
        kind: EventKind::ExperimentStart,
        stamp,
      });
    }
    if let Some(stamp) = self.stamp(self.workload_start.as_ref(), line) {
      return Some(TimedEvent {
        kind: EventKind::WorkloadStart,
        stamp,
      });
    }
    let caps = self.experiment_end.as_ref()?.captures(line)?;
    let stamp = caps.get(1)?.as_str();
    let result = caps
      .get(2)
      .map_or(ExperimentResult::None, |m| ExperimentResult::from_code(m.as_str()));
    Some(TimedEvent {
      kind: EventKind::ExperimentEnd(result),
      stamp,
    })
  }

  fn stamp<'a>(&self, re: Option<&Regex>, line: &'a str) -> Option<&'a str> {
    Some(re?.captures(line)?.get(1)?.as_str())
  }

  /// Classifies a line. Structural markers win over test case boundaries,
  /// which win over emulator starts, timed events and plain emulator tags.
  pub fn classify<'a>(&self, line: &'a str) -> Marker<'a> {
    if self.is_end_of_all_runs(line) {
      return Marker::EndOfAllRuns;
    }
    if self.is_run_end(line) {
      return Marker::RunEnd;
    }
    if let Some(start) = self.run_start(line) {
      return Marker::RunStart(start);
    }
    if let Some(id) = self.testcase_id(line) {
      return Marker::TestcaseBoundary(id);
    }
    if let Some(id) = self.emulator_start_id(line) {
      return Marker::EmulatorStart(id);
    }
    if let Some(event) = self.timed_event(line) {
      return Marker::TimedEvent(event);
    }
    match self.emulator_id(line) {
      Some(id) => Marker::EmulatorTag(id),
      None => Marker::Unclassified,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn experiment() -> Classifier {
    Classifier::new(&MarkerPatterns::experiment()).unwrap()
  }

  fn calibration() -> Classifier {
    Classifier::new(&MarkerPatterns::calibration()).unwrap()
  }

  #[test]
  fn classifies_experiment_lines() {
    let c = experiment();
    assert_eq!(
      c.classify("2016-05-12_10:00:00.000000 INFO  [main] GrinderClient - Starting the GRINDER client"),
      Marker::RunStart(RunStart::default())
    );
    assert_eq!(
      c.classify("2016-05-12_10:00:01.000000 INFO  [main] TargetControllerImpl - Test case id: 17"),
      Marker::TestcaseBoundary(17)
    );
    assert_eq!(
      c.classify("2016-05-12_10:00:02.000000 INFO  [pool-1] EmulatedAndroid<3/5560> - Starting emulated Android"),
      Marker::EmulatorStart(3)
    );
    assert_eq!(
      c.classify("2016-05-12_10:00:03.000000 DEBUG [pool-1] Emulator<2/5558> - adb ready"),
      Marker::EmulatorTag(2)
    );
    assert_eq!(c.classify("=== GRINDER banner ==="), Marker::Unclassified);
  }

  #[test]
  fn timed_events_carry_their_stamp_and_result() {
    let c = experiment();
    let line = "2016-05-12_10:00:05.750000 INFO  [det] ExternalDetector<0/5554> - Detected experiment end with result: APPLICATION_HANG_DETECTED";
    let Marker::TimedEvent(event) = c.classify(line) else {
      panic!("expected a timed event");
    };
    assert_eq!(
      event.kind,
      EventKind::ExperimentEnd(ExperimentResult::ApplicationHangDetected)
    );
    assert_eq!(event.stamp, "2016-05-12_10:00:05.750000");
    assert!(event.timestamp().is_ok());

    let start = c
      .timed_event("2016-05-12_10:00:00.000000 INFO  [pool-1] EmulatedAndroid<0/5554> - Starting experiment run")
      .unwrap();
    assert_eq!(start.kind, EventKind::ExperimentStart);
  }

  #[test]
  fn timed_event_lines_still_expose_their_emulator_tag() {
    let c = experiment();
    let line = "2016-05-12_10:00:02.500000 INFO  [pool-1] EmulatedAndroid<1/5556> - Signaling Detector";
    assert!(matches!(c.classify(line), Marker::TimedEvent(_)));
    assert_eq!(c.emulator_id(line), Some(1));
  }

  #[test]
  fn calibration_run_markers() {
    let c = calibration();
    assert!(c.has_run_end());
    assert_eq!(
      c.classify("INFO EmulatedAndroidCalib - Starting calibration run: 4 parallel emus, repetition 2"),
      Marker::RunStart(RunStart {
        emulators: Some(4),
        repetition: Some(2)
      })
    );
    assert_eq!(
      c.classify("DEBUG EmulatedAndroidCalib - Finished calibration run."),
      Marker::RunEnd
    );
    assert_eq!(
      c.classify("INFO EmulatedAndroidCalib - Finished all calibration runs."),
      Marker::EndOfAllRuns
    );
    assert_eq!(
      c.classify("INFO CalibrationRun<3> - Doing single calibration run."),
      Marker::EmulatorTag(3)
    );
    // Calibration tags require a four digit port.
    assert_eq!(c.emulator_id("Emulator<1/55> - boot"), None);
    assert_eq!(c.emulator_id("Emulator<1/5556> - boot"), Some(1));
  }

  #[test]
  fn unknown_result_codes_are_kept() {
    assert_eq!(
      ExperimentResult::from_code("SOMETHING_NEW").code(),
      "SOMETHING_NEW"
    );
    assert_eq!(ExperimentResult::from_code("FINISHED"), ExperimentResult::Finished);
  }

  #[test]
  fn oversized_ids_are_not_markers() {
    let c = experiment();
    assert_eq!(
      c.testcase_id("TargetControllerImpl - Test case id: 99999999999"),
      None
    );
  }

  #[test]
  fn invalid_patterns_are_reported_by_name() {
    let mut patterns = MarkerPatterns::experiment();
    patterns.testcase_boundary = Some("Test case id: (\\d+".to_string());
    let err = Classifier::new(&patterns).unwrap_err();
    assert!(matches!(
      err,
      ConfigError::InvalidPattern {
        name: "testcase_boundary",
        ..
      }
    ));
  }
}
