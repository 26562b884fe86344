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

//! # Grindlog
//!
//! `grindlog` recovers the structure of GRINDER fault injection logs. A log
//! interleaves the output of several campaign runs, each driving several
//! emulators through a range of test cases. The crate splits such a log into
//! run, emulator and test case files, validates the split and extracts the
//! system initialisation and workload durations of every test case.
//!
//! This crate contains the main library logic for the `grindlog` CLI, but its
//! core modules (`marker`, `split`, `consistency`, `timing`) could be used
//! independently.
//!
//! ## Core Modules
//!
//! * [`marker`]: Marker patterns and the compiled line `Classifier`.
//! * [`segment`]: Byte-exact line reading and buffered split file sinks.
//! * [`split`]: Run, emulator and test case splitting state machines.
//! * [`consistency`]: Pure checks producing a `ConsistencyReport`.
//! * [`gate`]: Operator decision on consistency issues.
//! * [`timing`]: Per test case timing state machine.
//! * [`report`]: Times and search match tables, split file cleanup.
//! * [`analysis`], [`calibration`], [`extract`]: The `grindlog` subcommands.
//! * [`cli`]: Defines the `clap`-based command-line interface.
//! * [`config`]: Layered settings and resolved subcommand configurations.
//! * [`error`]: Defines the custom error types for the library.
//! * [`logging`]: Provides the `setup_tracing` utility.

pub mod analysis;
pub mod calibration;
pub mod cli;
pub mod config;
pub mod consistency;
pub mod error;
pub mod extract;
pub mod gate;
pub mod logging;
pub mod marker;
pub mod report;
pub mod segment;
pub mod split;
pub mod timing;
