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
use crate::error::ReportError;
use crate::timing::TimingRecord;
use serde::Deserialize;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

/// One test case of the times table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
  pub run: usize,
  pub emu: u32,
  pub testcase: u32,
  pub sysinit_ms: i64,
  pub workload_ms: i64,
}

impl ResultRow {
  pub fn new(run: usize, emu: u32, testcase: u32, record: TimingRecord) -> Self {
    Self {
      run,
      emu,
      testcase,
      sysinit_ms: record.sysinit_ms,
      workload_ms: record.workload_ms,
    }
  }
}

/// Number of lines of one emulator channel matching a search expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCount {
  pub run: usize,
  pub emu: u32,
  pub matches: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TimesFormat {
  #[default]
  Csv,
  /// One JSON object per line.
  Jsonl,
}

pub const TIMES_HEADER: &str = "Run,Emu,Testcase,SysInit,Workload";
pub const MATCHES_HEADER: &str = "Run,Emu,Matches";

/// Serializes rows in the given format. Rows are written in the order given.
pub fn write_times_to<W: Write>(
  out: &mut W,
  rows: &[ResultRow],
  format: TimesFormat,
) -> Result<(), std::io::Error> {
  match format {
    TimesFormat::Csv => {
      writeln!(out, "{TIMES_HEADER}")?;
      for row in rows {
        writeln!(
          out,
          "{},{},{},{},{}",
          row.run, row.emu, row.testcase, row.sysinit_ms, row.workload_ms
        )?;
      }
    }
    TimesFormat::Jsonl => {
      for row in rows {
        serde_json::to_writer(&mut *out, row)?;
        writeln!(out)?;
      }
    }
  }
  Ok(())
}

pub fn write_matches_to<W: Write>(out: &mut W, counts: &[MatchCount]) -> Result<(), std::io::Error> {
  writeln!(out, "{MATCHES_HEADER}")?;
  for count in counts {
    writeln!(out, "{},{},{}", count.run, count.emu, count.matches)?;
  }
  Ok(())
}

fn write_file(
  path: &Path,
  body: impl FnOnce(&mut BufWriter<File>) -> Result<(), std::io::Error>,
) -> Result<(), ReportError> {
  let file = File::create(path).map_err(|source| ReportError::Create {
    path: path.to_path_buf(),
    source,
  })?;
  let mut out = BufWriter::new(file);
  body(&mut out)
    .and_then(|()| out.flush())
    .map_err(|source| ReportError::Write {
      path: path.to_path_buf(),
      source,
    })
}

pub fn write_times(path: &Path, rows: &[ResultRow], format: TimesFormat) -> Result<(), ReportError> {
  tracing::info!("Writing test case times to [{}]...", path.display());
  write_file(path, |out| write_times_to(out, rows, format))?;
  tracing::info!(rows = rows.len(), "Finished writing times.");
  Ok(())
}

pub fn write_matches(path: &Path, counts: &[MatchCount]) -> Result<(), ReportError> {
  tracing::info!("Writing search results to [{}]...", path.display());
  write_file(path, |out| write_matches_to(out, counts))
}

/// Removes split files created during an analysis.
pub fn clean_files(files: &[PathBuf]) -> Result<(), ReportError> {
  tracing::info!("Cleaning {} files...", files.len());
  fs_extra::remove_items(files).map_err(|source| ReportError::Clean {
    count: files.len(),
    source,
  })
}
