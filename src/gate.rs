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
use crate::consistency::ConsistencyReport;
use crate::error::GrindlogError;
use serde::Deserialize;
use serde::Serialize;
use std::io::BufRead;
use std::io::Write;

/// Decides whether an analysis continues after consistency issues.
pub trait Gate {
  /// Called only for reports with at least one violation.
  fn confirm(&mut self, stage: &str, report: &ConsistencyReport) -> std::io::Result<bool>;
}

/// What to do when a split turns out inconsistent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InconsistencyPolicy {
  /// Ask on the terminal; anything but `y` aborts.
  #[default]
  Prompt,
  Abort,
  Continue,
}

impl Gate for InconsistencyPolicy {
  fn confirm(&mut self, stage: &str, report: &ConsistencyReport) -> std::io::Result<bool> {
    match self {
      Self::Abort => Ok(false),
      Self::Continue => {
        tracing::warn!(stage, "Continuing despite consistency issues");
        Ok(true)
      }
      Self::Prompt => {
        let stdin = std::io::stdin();
        let mut stderr = std::io::stderr();
        PromptGate::new(stdin.lock(), &mut stderr).confirm(stage, report)
      }
    }
  }
}

/// Asks an operator on `output` and reads the answer from `input`.
pub struct PromptGate<R, W> {
  input: R,
  output: W,
}

impl<R: BufRead, W: Write> PromptGate<R, W> {
  pub fn new(input: R, output: W) -> Self {
    Self { input, output }
  }
}

impl<R: BufRead, W: Write> Gate for PromptGate<R, W> {
  fn confirm(&mut self, stage: &str, report: &ConsistencyReport) -> std::io::Result<bool> {
    writeln!(
      self.output,
      "ERROR: Found consistency issues in {stage}! Please check manually!\n{report}"
    )?;
    write!(self.output, "Continue anyway? [y/N] ")?;
    self.output.flush()?;

    let mut answer = String::new();
    self.input.read_line(&mut answer)?;
    Ok(answer.trim_end_matches(['\r', '\n']) == "y")
  }
}

/// Lets a clean report through and asks `gate` about everything else.
pub fn pass_gate(
  gate: &mut dyn Gate,
  stage: &str,
  report: &ConsistencyReport,
) -> Result<(), GrindlogError> {
  if report.is_ok() {
    tracing::info!("Checked {stage}: {report}");
    return Ok(());
  }
  let violations = report.violations().len();
  tracing::warn!(violations, "Found consistency issues in {stage}");
  if gate.confirm(stage, report).map_err(GrindlogError::Confirm)? {
    Ok(())
  } else {
    Err(GrindlogError::Aborted {
      stage: stage.to_string(),
      violations,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::consistency::IdKind;
  use crate::consistency::Violation;

  fn report() -> ConsistencyReport {
    let mut report = ConsistencyReport::default();
    report.push(Violation::RangeGap {
      kind: IdKind::Emulator,
      expected: 2,
      actual: 3,
    });
    report
  }

  fn ask(answer: &str) -> (bool, String) {
    let mut out = Vec::new();
    let confirmed = PromptGate::new(answer.as_bytes(), &mut out)
      .confirm("run 0", &report())
      .unwrap();
    (confirmed, String::from_utf8(out).unwrap())
  }

  #[test]
  fn only_y_continues() {
    let (yes, shown) = ask("y\n");
    assert!(yes);
    assert!(shown.contains("Expected 2, but got 3."));
    assert!(shown.ends_with("Continue anyway? [y/N] "));

    assert!(!ask("yes\n").0);
    assert!(!ask("\n").0);
    // No input at all means abort.
    assert!(!ask("").0);
  }

  #[test]
  fn fixed_policies_do_not_prompt() {
    assert!(!InconsistencyPolicy::Abort.confirm("x", &report()).unwrap());
    assert!(InconsistencyPolicy::Continue.confirm("x", &report()).unwrap());
  }

  #[test]
  fn abort_policy_turns_issues_into_an_error() {
    let mut gate = InconsistencyPolicy::Abort;
    assert!(pass_gate(&mut gate, "run 0", &ConsistencyReport::default()).is_ok());
    let err = pass_gate(&mut gate, "run 0", &report()).unwrap_err();
    assert!(matches!(err, GrindlogError::Aborted { violations: 1, .. }));
  }
}
