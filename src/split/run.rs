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
use crate::error::SplitError;
use crate::marker::Classifier;
use crate::marker::Marker;
use crate::marker::RunStart;
use crate::segment::LineReader;
use crate::segment::LogLine;
use crate::segment::SegmentNamer;
use crate::segment::SegmentSink;
use std::ops::ControlFlow;
use std::path::Path;
use std::path::PathBuf;

/// One campaign run cut out of a multi-run log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSegment {
  /// 0-based position of the run in the log.
  pub index: usize,
  pub path: PathBuf,
  /// Parallel emulators announced by the run start line, if any.
  pub emulators: Option<u32>,
  pub repetition: Option<u32>,
}

struct OpenRun {
  segment: RunSegment,
  sink: SegmentSink,
}

enum RunState {
  Idle,
  InRun(OpenRun),
  BetweenRuns(OpenRun),
  Done,
}

/// State machine cutting a log into run segments.
///
/// With a run end marker configured, runs are bracketed: a start marker only
/// opens a new run after the previous one ended, and the end of all runs stops
/// the scan. Without one, every start marker begins a new run.
pub struct RunSplitter<'c> {
  classifier: &'c Classifier,
  namer: SegmentNamer,
  state: RunState,
  runs: Vec<RunSegment>,
}

impl<'c> RunSplitter<'c> {
  pub fn new(classifier: &'c Classifier, namer: SegmentNamer) -> Self {
    Self {
      classifier,
      namer,
      state: RunState::Idle,
      runs: Vec::new(),
    }
  }

  fn open(&self, start: RunStart, line: &LogLine<'_>) -> Result<OpenRun, SplitError> {
    let index = self.runs.len();
    let path = self.namer.name(index);
    tracing::debug!(run = index, line = line.number, path = %path.display(), "Opening run segment");
    let mut sink = SegmentSink::create(path.clone())?;
    sink.write_line(line)?;
    Ok(OpenRun {
      segment: RunSegment {
        index,
        path,
        emulators: start.emulators,
        repetition: start.repetition,
      },
      sink,
    })
  }

  fn close(&mut self, run: OpenRun) -> Result<(), SplitError> {
    run.sink.finish()?;
    self.runs.push(run.segment);
    Ok(())
  }

  pub fn push(&mut self, line: &LogLine<'_>) -> Result<ControlFlow<()>, SplitError> {
    let text = line.text();
    let marker = self.classifier.classify(&text);
    let state = std::mem::replace(&mut self.state, RunState::Done);

    self.state = match (state, marker) {
      (RunState::Idle, Marker::RunStart(start)) => RunState::InRun(self.open(start, line)?),
      (RunState::Idle, _) => RunState::Idle,
      (RunState::InRun(mut run), Marker::RunEnd) => {
        run.sink.write_line(line)?;
        RunState::BetweenRuns(run)
      }
      (RunState::InRun(run), Marker::RunStart(start)) if !self.classifier.has_run_end() => {
        self.close(run)?;
        RunState::InRun(self.open(start, line)?)
      }
      (RunState::InRun(mut run), _) => {
        run.sink.write_line(line)?;
        RunState::InRun(run)
      }
      (RunState::BetweenRuns(run), Marker::RunStart(start)) => {
        self.close(run)?;
        RunState::InRun(self.open(start, line)?)
      }
      (RunState::BetweenRuns(run), Marker::EndOfAllRuns) => {
        self.close(run)?;
        tracing::debug!(line = line.number, "Reached end of all runs");
        RunState::Done
      }
      (RunState::BetweenRuns(mut run), _) => {
        run.sink.write_line(line)?;
        RunState::BetweenRuns(run)
      }
      (RunState::Done, _) => RunState::Done,
    };

    Ok(match self.state {
      RunState::Done => ControlFlow::Break(()),
      _ => ControlFlow::Continue(()),
    })
  }

  /// Closes the open run, if any, and returns all runs in log order.
  pub fn finish(mut self) -> Result<Vec<RunSegment>, SplitError> {
    match std::mem::replace(&mut self.state, RunState::Done) {
      RunState::InRun(run) | RunState::BetweenRuns(run) => self.close(run)?,
      RunState::Idle | RunState::Done => {}
    }
    Ok(self.runs)
  }
}

/// Splits `logfile` into one file per run. A log without any run start yields
/// no runs.
pub fn split_runs(
  logfile: &Path,
  classifier: &Classifier,
  namer: SegmentNamer,
) -> Result<Vec<RunSegment>, SplitError> {
  let mut reader = LineReader::open(logfile)?;
  let mut splitter = RunSplitter::new(classifier, namer);
  while let Some(line) = reader.next_line()? {
    if splitter.push(&line)?.is_break() {
      break;
    }
  }
  splitter.finish()
}
