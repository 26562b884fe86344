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
use crate::consistency::RangeCheck;
use crate::consistency::check_range;
use crate::error::SplitError;
use crate::marker::Classifier;
use crate::segment::LineReader;
use crate::segment::SegmentNamer;
use crate::segment::SegmentSink;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::btree_map::Entry;
use std::ops::RangeInclusive;
use std::path::Path;
use std::path::PathBuf;

/// Distribution of test cases over emulators used by the experiment setup.
///
/// Every emulator gets `testcases / emulators` consecutive test cases, except
/// the last one, which also takes the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
  emulators: u32,
  testcases: u32,
}

impl Partition {
  /// A partition without test cases is valid and routes by emulator tag only.
  pub fn new(emulators: u32, testcases: u32) -> Result<Self, SplitError> {
    if emulators == 0 || (testcases > 0 && testcases < emulators) {
      return Err(SplitError::InvalidCounts {
        emulators,
        testcases,
      });
    }
    Ok(Self {
      emulators,
      testcases,
    })
  }

  pub fn emulators(&self) -> u32 {
    self.emulators
  }

  pub fn testcases(&self) -> u32 {
    self.testcases
  }

  fn step(&self) -> u32 {
    self.testcases / self.emulators
  }

  /// Emulator that ran test case `testcase`, or `None` for ID 0 or when the
  /// partition has no test cases.
  pub fn emulator_for(&self, testcase: u32) -> Option<u32> {
    let step = self.step();
    if testcase == 0 || step == 0 {
      return None;
    }
    Some(((testcase - 1) / step).min(self.emulators - 1))
  }

  /// Test case IDs assigned to `emulator`.
  pub fn assigned(&self, emulator: u32) -> RangeInclusive<u32> {
    let step = self.step();
    let first = emulator * step + 1;
    let last = if emulator + 1 == self.emulators {
      self.testcases
    } else {
      (emulator + 1) * step
    };
    first..=last
  }
}

/// Result of splitting one run by emulator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmulatorSplit {
  /// Channel file per emulator that received at least one line.
  pub channels: BTreeMap<u32, PathBuf>,
  /// Emulator IDs seen in emulator tags.
  pub seen_emulators: BTreeSet<u32>,
  /// How often each test case boundary occurred in the run.
  pub testcase_occurrences: BTreeMap<u32, usize>,
}

/// Counts emulators and test cases of a run by scanning emulator start and
/// test case boundary markers. Gaps in either ID range are fatal.
pub fn prescan_counts(run: &Path, classifier: &Classifier) -> Result<Partition, SplitError> {
  tracing::info!("Analyzing emulator and test case counts...");
  let mut emulators = BTreeSet::new();
  let mut testcases = BTreeSet::new();

  let mut reader = LineReader::open(run)?;
  while let Some(line) = reader.next_line()? {
    let text = line.text();
    if let Some(id) = classifier.testcase_id(&text) {
      if !testcases.insert(id) {
        tracing::warn!(testcase = id, line = line.number, "Duplicate test case ID");
      }
      continue;
    }
    if let Some(id) = classifier.emulator_start_id(&text) {
      emulators.insert(id);
    }
  }

  tracing::info!(
    "Found {} emus and {} test cases.",
    emulators.len(),
    testcases.len()
  );

  for (kind, ids) in [(IdKind::Emulator, &emulators), (IdKind::Testcase, &testcases)] {
    if let RangeCheck::Gap { expected, actual } = check_range(ids.iter().copied(), kind.base()) {
      return Err(SplitError::IdGap {
        path: run.to_path_buf(),
        kind,
        expected,
        actual,
      });
    }
  }
  if let (Some(emu), Some(tc)) = (emulators.last(), testcases.last()) {
    tracing::info!("Max IDs: emu: {}  test case: {}", emu, tc);
  }

  // Dense ranges starting at 0 and 1 make the set sizes fit in u32.
  Partition::new(emulators.len() as u32, testcases.len() as u32)
}

/// Routes every line of a run to the emulator that produced it.
///
/// Lines carrying an emulator tag go to that emulator. Test case boundaries
/// without a tag go to the emulator the partition assigns them to. Everything
/// else is dropped. Channel files are created on their first line.
pub fn split_emulators(
  run: &Path,
  classifier: &Classifier,
  partition: Partition,
  namer: &SegmentNamer,
) -> Result<EmulatorSplit, SplitError> {
  let mut sinks: BTreeMap<u32, SegmentSink> = BTreeMap::new();
  let mut split = EmulatorSplit::default();
  let mut dropped = 0usize;

  let mut reader = LineReader::open(run)?;
  while let Some(line) = reader.next_line()? {
    let text = line.text();
    let target = if let Some(emu) = classifier.emulator_id(&text) {
      split.seen_emulators.insert(emu);
      Some(emu)
    } else if let Some(tc) = classifier.testcase_id(&text) {
      *split.testcase_occurrences.entry(tc).or_default() += 1;
      partition.emulator_for(tc)
    } else {
      None
    };

    let Some(emu) = target else {
      dropped += 1;
      continue;
    };
    let sink = match sinks.entry(emu) {
      Entry::Occupied(entry) => entry.into_mut(),
      Entry::Vacant(entry) => {
        let path = namer.name(emu);
        tracing::debug!(emu, path = %path.display(), "Opening emulator channel");
        entry.insert(SegmentSink::create(path)?)
      }
    };
    sink.write_line(&line)?;
  }

  for (emu, sink) in sinks {
    split.channels.insert(emu, sink.finish()?);
  }
  tracing::debug!(dropped, "Lines without emulator attribution dropped");

  Ok(split)
}
