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

//! Line input, segment output and split file naming shared by all splitters.

use crate::error::SplitError;
use std::borrow::Cow;
use std::ffi::OsString;
use std::fmt::Display;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

/// One raw input line, including its terminator, and its 1-based number.
#[derive(Debug, Clone, Copy)]
pub struct LogLine<'a> {
  pub number: usize,
  pub raw: &'a [u8],
}

impl LogLine<'_> {
  /// Lossy UTF-8 view used for classification.
  pub fn text(&self) -> Cow<'_, str> {
    String::from_utf8_lossy(self.raw)
  }
}

/// Sequential, byte-exact line reader.
pub struct LineReader<R> {
  inner: R,
  path: PathBuf,
  number: usize,
  buf: Vec<u8>,
}

impl LineReader<BufReader<File>> {
  pub fn open(path: &Path) -> Result<Self, SplitError> {
    let file = File::open(path).map_err(|source| SplitError::OpenInput {
      path: path.to_path_buf(),
      source,
    })?;
    Ok(Self::new(BufReader::new(file), path))
  }
}

impl<R: BufRead> LineReader<R> {
  pub fn new(inner: R, path: &Path) -> Self {
    Self {
      inner,
      path: path.to_path_buf(),
      number: 0,
      buf: Vec::new(),
    }
  }

  pub fn next_line(&mut self) -> Result<Option<LogLine<'_>>, SplitError> {
    self.buf.clear();
    let read = self
      .inner
      .read_until(b'\n', &mut self.buf)
      .map_err(|source| SplitError::Read {
        path: self.path.clone(),
        line: self.number + 1,
        source,
      })?;
    if read == 0 {
      return Ok(None);
    }
    self.number += 1;
    Ok(Some(LogLine {
      number: self.number,
      raw: &self.buf,
    }))
  }
}

/// An open, buffered, append-only output file for one segment.
///
/// Dropping a sink closes it, so an error that unwinds a splitter still
/// releases the in-flight handle.
#[derive(Debug)]
pub struct SegmentSink {
  path: PathBuf,
  writer: BufWriter<File>,
}

impl SegmentSink {
  pub fn create(path: PathBuf) -> Result<Self, SplitError> {
    Self::open(path, OpenOptions::new().write(true).create(true).truncate(true))
  }

  /// Reopens an existing segment to continue it.
  pub fn append(path: PathBuf) -> Result<Self, SplitError> {
    Self::open(path, OpenOptions::new().append(true).create(true))
  }

  fn open(path: PathBuf, options: &OpenOptions) -> Result<Self, SplitError> {
    match options.open(&path) {
      Ok(file) => Ok(Self {
        writer: BufWriter::new(file),
        path,
      }),
      Err(source) => Err(SplitError::CreateSegment { path, source }),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn write_line(&mut self, line: &LogLine<'_>) -> Result<(), SplitError> {
    self
      .writer
      .write_all(line.raw)
      .map_err(|source| SplitError::WriteSegment {
        path: self.path.clone(),
        source,
      })
  }

  /// Flushes and closes the segment, returning its path.
  pub fn finish(mut self) -> Result<PathBuf, SplitError> {
    match self.writer.flush() {
      Ok(()) => Ok(self.path),
      Err(source) => Err(SplitError::WriteSegment {
        path: self.path,
        source,
      }),
    }
  }
}

/// Derives split file names from a parent file: `{base}{sep}{ins}{ext}`.
#[derive(Debug, Clone)]
pub struct SegmentNamer {
  dir: PathBuf,
  stem: OsString,
  ext: Option<OsString>,
  separator: char,
}

impl SegmentNamer {
  /// Names segments next to `parent`, separated by `-`.
  pub fn for_file(parent: &Path) -> Self {
    Self {
      dir: parent.parent().map(Path::to_path_buf).unwrap_or_default(),
      stem: parent.file_stem().map(OsString::from).unwrap_or_default(),
      ext: parent.extension().map(OsString::from),
      separator: '-',
    }
  }

  /// Places segments in `dir` instead of next to the parent file.
  pub fn in_dir(mut self, dir: Option<&Path>) -> Self {
    if let Some(dir) = dir {
      self.dir = dir.to_path_buf();
    }
    self
  }

  pub fn with_separator(mut self, separator: char) -> Self {
    self.separator = separator;
    self
  }

  pub fn name(&self, ins: impl Display) -> PathBuf {
    let mut file_name = self.stem.clone();
    file_name.push(format!("{}{}", self.separator, ins));
    if let Some(ext) = &self.ext {
      file_name.push(".");
      file_name.push(ext);
    }
    self.dir.join(file_name)
  }
}

/// Renders a path relative to the working directory when that is shorter.
pub fn display_path(path: &Path) -> String {
  std::env::current_dir()
    .ok()
    .and_then(|cwd| pathdiff::diff_paths(path, cwd))
    .filter(|rel| !rel.starts_with(".."))
    .unwrap_or_else(|| path.to_path_buf())
    .display()
    .to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;
  use tempfile::tempdir;

  #[test]
  fn names_follow_parent_file() {
    let namer = SegmentNamer::for_file(Path::new("/logs/log1.log"));
    assert_eq!(namer.name(0), PathBuf::from("/logs/log1-0.log"));

    let nested = SegmentNamer::for_file(&namer.name(3));
    assert_eq!(nested.name(12), PathBuf::from("/logs/log1-3-12.log"));
  }

  #[test]
  fn names_without_extension_and_custom_dir() {
    let namer = SegmentNamer::for_file(Path::new("/logs/grinder"))
      .in_dir(Some(Path::new("/tmp/split")))
      .with_separator('_');
    assert_eq!(namer.name(7), PathBuf::from("/tmp/split/grinder_7"));
  }

  #[test]
  fn reader_keeps_line_terminators_and_numbers() {
    let input = Cursor::new(b"first\nsecond\r\nlast".to_vec());
    let mut reader = LineReader::new(input, Path::new("mem"));

    let line = reader.next_line().unwrap().unwrap();
    assert_eq!((line.number, line.raw), (1, &b"first\n"[..]));
    let line = reader.next_line().unwrap().unwrap();
    assert_eq!((line.number, line.raw), (2, &b"second\r\n"[..]));
    let line = reader.next_line().unwrap().unwrap();
    assert_eq!((line.number, line.raw), (3, &b"last"[..]));
    assert!(reader.next_line().unwrap().is_none());
  }

  #[test]
  fn invalid_utf8_is_classified_lossily_but_copied_exactly() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("out.log");
    let raw = b"EmulatedAndroid<0/5554> \xff\n";
    let line = LogLine { number: 1, raw };
    assert!(line.text().contains("EmulatedAndroid<0/5554>"));

    let mut sink = SegmentSink::create(path.clone()).unwrap();
    sink.write_line(&line).unwrap();
    sink.finish().unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), raw.to_vec());
  }

  #[test]
  fn append_continues_an_existing_segment() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("seg.log");

    let mut sink = SegmentSink::create(path.clone()).unwrap();
    sink.write_line(&LogLine { number: 1, raw: b"a\n" }).unwrap();
    sink.finish().unwrap();

    let mut sink = SegmentSink::append(path.clone()).unwrap();
    sink.write_line(&LogLine { number: 2, raw: b"b\n" }).unwrap();
    sink.finish().unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\n");
  }
}
