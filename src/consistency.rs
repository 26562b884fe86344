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

//! Structural validation of a recovered run → emulator → test case split.
//!
//! Nothing here is fatal. Checks return a [`ConsistencyReport`] and the caller
//! decides whether to continue.

use crate::split::EmulatorSplit;
use crate::split::Partition;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
  Emulator,
  Testcase,
}

impl IdKind {
  /// First valid ID: emulators count from 0, test cases from 1.
  pub fn base(self) -> u32 {
    match self {
      Self::Emulator => 0,
      Self::Testcase => 1,
    }
  }
}

impl fmt::Display for IdKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Emulator => f.write_str("Emulator"),
      Self::Testcase => f.write_str("Test case"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeCheck {
  Ok,
  Gap { expected: u32, actual: u32 },
}

/// Checks that sorted `ids` are exactly `base, base + 1, ...`, reporting the
/// first mismatch.
pub fn check_range(ids: impl IntoIterator<Item = u32>, base: u32) -> RangeCheck {
  let mut expected = base;
  for actual in ids {
    if actual != expected {
      return RangeCheck::Gap { expected, actual };
    }
    expected += 1;
  }
  RangeCheck::Ok
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
  RangeGap {
    kind: IdKind,
    expected: u32,
    actual: u32,
  },
  CountMismatch {
    kind: IdKind,
    expected: usize,
    actual: usize,
  },
  /// Emulators seen in tags differ from the channels that were written.
  ChannelMismatch { seen: Vec<u32>, collected: Vec<u32> },
  DuplicateIds { kind: IdKind, ids: Vec<u32> },
  CrossAssigned { testcase: u32, emulators: Vec<u32> },
  Misassigned {
    testcase: u32,
    expected: u32,
    actual: u32,
  },
}

fn join(ids: &[u32]) -> String {
  ids
    .iter()
    .map(u32::to_string)
    .collect::<Vec<_>>()
    .join(", ")
}

impl fmt::Display for Violation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::RangeGap {
        kind,
        expected,
        actual,
      } => write!(
        f,
        "{kind} IDs: inconsistency in number range. Expected {expected}, but got {actual}."
      ),
      Self::CountMismatch {
        kind,
        expected,
        actual,
      } => write!(f, "{kind}s: expected to see {expected}, but saw {actual}."),
      Self::ChannelMismatch { seen, collected } => write!(
        f,
        "Saw {} emus ({}), but collected {} ({}).",
        seen.len(),
        join(seen),
        collected.len(),
        join(collected)
      ),
      Self::DuplicateIds { kind, ids } => {
        write!(f, "Saw {kind} IDs more than once: {}", join(ids))
      }
      Self::CrossAssigned {
        testcase,
        emulators,
      } => write!(
        f,
        "Test case {testcase} appears in more than one emu: {}",
        join(emulators)
      ),
      Self::Misassigned {
        testcase,
        expected,
        actual,
      } => write!(
        f,
        "Test case {testcase} belongs to emu {expected}, but was found in emu {actual}."
      ),
    }
  }
}

/// Ordered list of everything found wrong with a split.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
  violations: Vec<Violation>,
}

impl ConsistencyReport {
  pub fn is_ok(&self) -> bool {
    self.violations.is_empty()
  }

  pub fn violations(&self) -> &[Violation] {
    &self.violations
  }

  pub fn push(&mut self, violation: Violation) {
    self.violations.push(violation);
  }

  fn check_range(&mut self, kind: IdKind, ids: impl IntoIterator<Item = u32>) {
    if let RangeCheck::Gap { expected, actual } = check_range(ids, kind.base()) {
      self.push(Violation::RangeGap {
        kind,
        expected,
        actual,
      });
    }
  }

  fn check_count(&mut self, kind: IdKind, expected: usize, actual: usize) {
    if expected != actual {
      self.push(Violation::CountMismatch {
        kind,
        expected,
        actual,
      });
    }
  }
}

impl fmt::Display for ConsistencyReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_ok() {
      return f.write_str("Found no consistency issues.");
    }
    for (i, violation) in self.violations.iter().enumerate() {
      if i > 0 {
        writeln!(f)?;
      }
      write!(f, "ERROR: {violation}")?;
    }
    Ok(())
  }
}

/// Validates the emulators and test cases observed while splitting one run.
pub fn check_emulator_split(partition: Partition, split: &EmulatorSplit) -> ConsistencyReport {
  let mut report = ConsistencyReport::default();

  report.check_count(
    IdKind::Emulator,
    partition.emulators() as usize,
    split.seen_emulators.len(),
  );
  if !split.seen_emulators.iter().eq(split.channels.keys()) {
    report.push(Violation::ChannelMismatch {
      seen: split.seen_emulators.iter().copied().collect(),
      collected: split.channels.keys().copied().collect(),
    });
  }
  report.check_count(
    IdKind::Testcase,
    partition.testcases() as usize,
    split.testcase_occurrences.len(),
  );
  report.check_range(IdKind::Emulator, split.seen_emulators.iter().copied());
  report.check_range(IdKind::Testcase, split.testcase_occurrences.keys().copied());

  let doubles: Vec<u32> = split
    .testcase_occurrences
    .iter()
    .filter(|(_, count)| **count > 1)
    .map(|(id, _)| *id)
    .collect();
  if !doubles.is_empty() {
    report.push(Violation::DuplicateIds {
      kind: IdKind::Testcase,
      ids: doubles,
    });
  }

  report
}

/// Validates that every test case of a run landed in exactly one channel and
/// that the channel is the one the partition assigns it to.
///
/// `channels` maps emulator ID to the test case IDs split out of its channel.
pub fn check_testcase_assignment<'a, I>(partition: Partition, channels: I) -> ConsistencyReport
where
  I: IntoIterator<Item = (u32, &'a [u32])>,
{
  let mut report = ConsistencyReport::default();
  let mut owners: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
  for (emu, testcases) in channels {
    for tc in testcases {
      owners.entry(*tc).or_default().push(emu);
    }
  }

  for (testcase, emulators) in &owners {
    if emulators.len() > 1 {
      report.push(Violation::CrossAssigned {
        testcase: *testcase,
        emulators: emulators.clone(),
      });
      continue;
    }
    if let (Some(expected), Some(actual)) = (partition.emulator_for(*testcase), emulators.first()) {
      if expected != *actual {
        report.push(Violation::Misassigned {
          testcase: *testcase,
          expected,
          actual: *actual,
        });
      }
    }
  }

  report
}
