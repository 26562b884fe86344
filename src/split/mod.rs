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

//! Streaming splitters for the run → emulator → test case hierarchy.
//!
//! Every splitter reads its input once, front to back, and keeps at most one
//! open [`SegmentSink`](crate::segment::SegmentSink) per active segment.

pub mod emulator;
pub mod run;
pub mod testcase;

pub use emulator::EmulatorSplit;
pub use emulator::Partition;
pub use emulator::prescan_counts;
pub use emulator::split_emulators;
pub use run::RunSegment;
pub use run::split_runs;
pub use testcase::TestcaseSplitter;
pub use testcase::split_testcases;
