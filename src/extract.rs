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
use crate::config::ExtractConfig;
use crate::error::GrindlogError;
use crate::marker::Classifier;
use crate::segment::LineReader;
use crate::segment::SegmentNamer;
use crate::segment::display_path;
use crate::split::TestcaseSplitter;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Copies the lines of the selected test cases into `{base}_{id}{ext}`.
///
/// Returns the files written per test case ID. IDs that never occur are
/// reported and skipped.
pub fn extract_testcases(config: &ExtractConfig) -> Result<BTreeMap<u32, PathBuf>, GrindlogError> {
  let classifier = Classifier::new(&config.markers)?;
  let namer = SegmentNamer::for_file(&config.logfile)
    .in_dir(config.split_dir.as_deref())
    .with_separator('_');

  tracing::info!(
    "Extracting {} test cases from [{}]...",
    config.testcases.len(),
    display_path(&config.logfile)
  );
  let mut reader = LineReader::open(&config.logfile)?;
  let mut splitter =
    TestcaseSplitter::new(&classifier, namer).with_filter(config.testcases.iter().copied());
  while let Some(line) = reader.next_line()? {
    splitter.push(&line)?;
  }
  let extracted = splitter.finish()?;

  for id in &config.testcases {
    match extracted.get(id) {
      Some(path) => tracing::info!("Test case {id} written to [{}]", display_path(path)),
      None => tracing::warn!("Test case {id} not found in the log."),
    }
  }
  Ok(extracted)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::marker::MarkerPatterns;
  use std::fs;
  use tempfile::tempdir;

  #[test]
  fn selected_testcases_are_extracted() {
    let temp = tempdir().unwrap();
    let logfile = temp.path().join("grinder.log");
    fs::write(
      &logfile,
      "boot\n\
       TargetControllerImpl - Test case id: 1\none\n\
       TargetControllerImpl - Test case id: 2\ntwo\n\
       TargetControllerImpl - Test case id: 3\nthree\n",
    )
    .unwrap();

    let extracted = extract_testcases(&ExtractConfig {
      logfile,
      testcases: vec![2, 9],
      split_dir: None,
      markers: MarkerPatterns::experiment(),
    })
    .unwrap();

    assert_eq!(extracted.len(), 1);
    let path = temp.path().join("grinder_2.log");
    assert_eq!(extracted[&2], path);
    assert_eq!(
      fs::read_to_string(path).unwrap(),
      "TargetControllerImpl - Test case id: 2\ntwo\n"
    );
    assert!(!temp.path().join("grinder_1.log").exists());
  }
}
