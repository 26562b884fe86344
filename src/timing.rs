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

//! Experiment time extraction for a single test case log.
//!
//! A test case passes through system initialisation (from "Starting experiment
//! run" to "Signaling Detector") and the workload (from there to the detector
//! reporting the experiment end). Both phases are measured in milliseconds.

use crate::error::TimingError;
use crate::marker::Classifier;
use crate::marker::EventKind;
use crate::marker::ExperimentResult;
use crate::segment::LineReader;
use crate::segment::LogLine;
use chrono::NaiveDateTime;
use std::ops::ControlFlow;
use std::path::Path;

/// Durations of one test case; `-1` marks a phase that was not measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingRecord {
  pub sysinit_ms: i64,
  pub workload_ms: i64,
}

impl TimingRecord {
  /// The system never reached the workload, e.g. it crashed during init.
  pub const NOT_MEASURED: Self = Self {
    sysinit_ms: -1,
    workload_ms: -1,
  };
}

#[derive(Debug)]
struct Stamp {
  line: usize,
  text: String,
  at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtractState {
  BeforeStart,
  Started,
  WorkloadStarted,
  Done,
}

pub struct TimingExtractor<'c> {
  classifier: &'c Classifier,
  good_results: &'c [ExperimentResult],
  state: ExtractState,
  init_start: Option<Stamp>,
  wl_start: Option<Stamp>,
  exp_detect: Option<(Stamp, ExperimentResult)>,
}

impl<'c> TimingExtractor<'c> {
  /// `good_results` are the outcomes for which the workload duration is
  /// meaningful.
  pub fn new(classifier: &'c Classifier, good_results: &'c [ExperimentResult]) -> Self {
    Self {
      classifier,
      good_results,
      state: ExtractState::BeforeStart,
      init_start: None,
      wl_start: None,
      exp_detect: None,
    }
  }

  pub fn push(&mut self, line: &LogLine<'_>) -> Result<ControlFlow<()>, TimingError> {
    if self.state == ExtractState::Done {
      return Ok(ControlFlow::Break(()));
    }
    let text = line.text();
    let Some(event) = self.classifier.timed_event(&text) else {
      return Ok(ControlFlow::Continue(()));
    };
    let stamp = || -> Result<Stamp, TimingError> {
      let at = event
        .timestamp()
        .map_err(|source| TimingError::MalformedTimestamp {
          line: line.number,
          stamp: event.stamp.to_string(),
          source,
        })?;
      Ok(Stamp {
        line: line.number,
        text: event.stamp.to_string(),
        at,
      })
    };

    self.state = match (self.state, &event.kind) {
      (ExtractState::BeforeStart, EventKind::ExperimentStart) => {
        self.init_start = Some(stamp()?);
        ExtractState::Started
      }
      (ExtractState::Started, EventKind::WorkloadStart) => {
        self.wl_start = Some(stamp()?);
        ExtractState::WorkloadStarted
      }
      (ExtractState::Started | ExtractState::WorkloadStarted, EventKind::ExperimentEnd(result)) => {
        self.exp_detect = Some((stamp()?, result.clone()));
        ExtractState::Done
      }
      (state, _) => state,
    };

    Ok(match self.state {
      ExtractState::Done => ControlFlow::Break(()),
      _ => ControlFlow::Continue(()),
    })
  }

  pub fn finish(self) -> Result<TimingRecord, TimingError> {
    let (init_start, (exp_detect, result)) = match (self.init_start, self.exp_detect) {
      (Some(init), Some(detect)) => (init, detect),
      (init, detect) => {
        return Err(TimingError::MissingMarkers {
          init_start: init.map(|s| s.text),
          exp_detect: detect.map(|(s, _)| s.text),
        });
      }
    };
    let Some(wl_start) = self.wl_start else {
      return Ok(TimingRecord::NOT_MEASURED);
    };

    let sysinit_ms = millis_between(&init_start, &wl_start)?;
    let workload_ms = if self.good_results.contains(&result) {
      millis_between(&wl_start, &exp_detect)?
    } else {
      -1
    };
    Ok(TimingRecord {
      sysinit_ms,
      workload_ms,
    })
  }
}

/// Whole milliseconds between two stamps, ties rounded to even.
fn millis_between(from: &Stamp, to: &Stamp) -> Result<i64, TimingError> {
  let micros = (to.at - from.at)
    .num_microseconds()
    .ok_or(TimingError::DurationOverflow {
      from: from.line,
      to: to.line,
    })?;
  Ok((micros as f64 / 1000.0).round_ties_even() as i64)
}

/// Extracts the timings of the test case log at `path`.
pub fn extract_timing(
  path: &Path,
  classifier: &Classifier,
  good_results: &[ExperimentResult],
) -> Result<TimingRecord, TimingError> {
  let mut reader = LineReader::open(path)?;
  let mut extractor = TimingExtractor::new(classifier, good_results);
  while let Some(line) = reader.next_line()? {
    if extractor.push(&line)?.is_break() {
      break;
    }
  }
  extractor.finish()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::marker::MarkerPatterns;

  const START: &str =
    "2016-05-12_10:00:00.000000 INFO  [pool-1] EmulatedAndroid<0/5554> - Starting experiment run";
  const WORKLOAD: &str =
    "2016-05-12_10:00:02.500000 INFO  [pool-1] EmulatedAndroid<0/5554> - Signaling Detector";

  fn detect(stamp: &str, result: &str) -> String {
    format!(
      "{stamp} INFO  [det] ExternalDetector<0/5554> - Detected experiment end with result: {result}"
    )
  }

  fn run(lines: &[&str]) -> Result<TimingRecord, TimingError> {
    let classifier = Classifier::new(&MarkerPatterns::experiment()).unwrap();
    let good = [ExperimentResult::Finished];
    let mut extractor = TimingExtractor::new(&classifier, &good);
    for (i, text) in lines.iter().enumerate() {
      let raw = format!("{text}\n");
      let line = LogLine {
        number: i + 1,
        raw: raw.as_bytes(),
      };
      if extractor.push(&line)?.is_break() {
        break;
      }
    }
    extractor.finish()
  }

  #[test]
  fn finished_experiment_yields_both_durations() {
    let end = detect("2016-05-12_10:00:05.750000", "FINISHED");
    let record = run(&["TargetControllerImpl - Test case id: 1", START, WORKLOAD, end.as_str()]).unwrap();
    assert_eq!(
      record,
      TimingRecord {
        sysinit_ms: 2500,
        workload_ms: 3250
      }
    );
  }

  #[test]
  fn crash_before_workload_is_not_measured() {
    let end = detect("2016-05-12_10:00:04.000000", "SYSTEM_CRASH_DETECTED");
    assert_eq!(run(&[START, end.as_str()]).unwrap(), TimingRecord::NOT_MEASURED);
  }

  #[test]
  fn non_finishing_result_suppresses_workload_duration() {
    let end = detect("2016-05-12_10:00:09.000000", "APPLICATION_HANG_DETECTED");
    assert_eq!(
      run(&[START, WORKLOAD, end.as_str()]).unwrap(),
      TimingRecord {
        sysinit_ms: 2500,
        workload_ms: -1
      }
    );
  }

  #[test]
  fn missing_end_marker_is_an_error() {
    let err = run(&[START, WORKLOAD]).unwrap_err();
    assert!(matches!(
      err,
      TimingError::MissingMarkers {
        init_start: Some(_),
        exp_detect: None
      }
    ));
  }

  #[test]
  fn detection_before_start_does_not_count() {
    let early = detect("2016-05-12_09:59:00.000000", "FINISHED");
    let err = run(&[early.as_str(), WORKLOAD]).unwrap_err();
    assert!(matches!(
      err,
      TimingError::MissingMarkers {
        init_start: None,
        exp_detect: None
      }
    ));
  }

  #[test]
  fn only_the_first_detection_is_used() {
    let first = detect("2016-05-12_10:00:03.000000", "FINISHED");
    let later = detect("2016-05-12_10:00:04.000000", "SYSTEM_HANG_DETECTED");
    assert_eq!(
      run(&[START, WORKLOAD, first.as_str(), later.as_str()]).unwrap(),
      TimingRecord {
        sysinit_ms: 2500,
        workload_ms: 500
      }
    );
  }

  #[test]
  fn sub_millisecond_durations_are_rounded() {
    let workload = "2016-05-12_10:00:00.001400 INFO  [p] EmulatedAndroid<0/5554> - Signaling Detector";
    let end = detect("2016-05-12_10:00:00.003100", "FINISHED");
    assert_eq!(
      run(&[START, workload, end.as_str()]).unwrap(),
      TimingRecord {
        sysinit_ms: 1,
        workload_ms: 2
      }
    );
  }

  #[test]
  fn malformed_timestamp_reports_the_line() {
    let bad = "2016-13-99_10:00:00.000000 INFO  [p] EmulatedAndroid<0/5554> - Starting experiment run";
    let err = run(&["noise", bad]).unwrap_err();
    assert!(matches!(err, TimingError::MalformedTimestamp { line: 2, .. }));
  }
}
