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
use crate::segment::LineReader;
use crate::segment::LogLine;
use crate::segment::SegmentNamer;
use crate::segment::SegmentSink;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;

enum TestcaseState {
  Seeking,
  /// `sink` is `None` for test cases excluded by the filter.
  InTestcase { sink: Option<SegmentSink> },
}

/// State machine cutting an emulator channel into test case segments.
///
/// Segments are back to back: each boundary closes the current segment and
/// opens the next. Lines before the first boundary belong to no test case.
pub struct TestcaseSplitter<'c> {
  classifier: &'c Classifier,
  namer: SegmentNamer,
  filter: Option<BTreeSet<u32>>,
  state: TestcaseState,
  segments: BTreeMap<u32, PathBuf>,
}

impl<'c> TestcaseSplitter<'c> {
  pub fn new(classifier: &'c Classifier, namer: SegmentNamer) -> Self {
    Self {
      classifier,
      namer,
      filter: None,
      state: TestcaseState::Seeking,
      segments: BTreeMap::new(),
    }
  }

  /// Only writes segments for the given test case IDs.
  pub fn with_filter(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
    self.filter = Some(ids.into_iter().collect());
    self
  }

  fn open(&mut self, id: u32) -> Result<Option<SegmentSink>, SplitError> {
    if self.filter.as_ref().is_some_and(|ids| !ids.contains(&id)) {
      return Ok(None);
    }
    let sink = match self.segments.get(&id) {
      Some(path) => {
        tracing::warn!(testcase = id, "Test case appears again in the same channel, appending");
        SegmentSink::append(path.clone())?
      }
      None => {
        let path = self.namer.name(id);
        self.segments.insert(id, path.clone());
        SegmentSink::create(path)?
      }
    };
    Ok(Some(sink))
  }

  pub fn push(&mut self, line: &LogLine<'_>) -> Result<(), SplitError> {
    let text = line.text();
    let boundary = self.classifier.testcase_id(&text);
    let state = std::mem::replace(&mut self.state, TestcaseState::Seeking);

    self.state = match (state, boundary) {
      (TestcaseState::Seeking, None) => TestcaseState::Seeking,
      (TestcaseState::Seeking, Some(id)) => TestcaseState::InTestcase {
        sink: self.begin(id, line)?,
      },
      (TestcaseState::InTestcase { sink }, Some(id)) => {
        if let Some(sink) = sink {
          sink.finish()?;
        }
        TestcaseState::InTestcase {
          sink: self.begin(id, line)?,
        }
      }
      (TestcaseState::InTestcase { mut sink }, None) => {
        if let Some(sink) = sink.as_mut() {
          sink.write_line(line)?;
        }
        TestcaseState::InTestcase { sink }
      }
    };
    Ok(())
  }

  fn begin(&mut self, id: u32, line: &LogLine<'_>) -> Result<Option<SegmentSink>, SplitError> {
    let mut sink = self.open(id)?;
    if let Some(sink) = sink.as_mut() {
      sink.write_line(line)?;
    }
    Ok(sink)
  }

  /// Closes the open segment and returns test case ID → segment file.
  pub fn finish(mut self) -> Result<BTreeMap<u32, PathBuf>, SplitError> {
    if let TestcaseState::InTestcase { sink: Some(sink) } =
      std::mem::replace(&mut self.state, TestcaseState::Seeking)
    {
      sink.finish()?;
    }
    Ok(self.segments)
  }
}

/// Splits one emulator channel into one file per test case.
pub fn split_testcases(
  channel: &Path,
  classifier: &Classifier,
  namer: SegmentNamer,
) -> Result<BTreeMap<u32, PathBuf>, SplitError> {
  let mut reader = LineReader::open(channel)?;
  let mut splitter = TestcaseSplitter::new(classifier, namer);
  while let Some(line) = reader.next_line()? {
    splitter.push(&line)?;
  }
  splitter.finish()
}
