//! Pass/fail extraction from `go test -v` style output.
//!
//! Two tiers: per-case markers when the harness emits them, otherwise the
//! whole-run `PASS` line as a binary signal. Case failure markers are
//! counted in both tiers.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Counts derived from sandbox output. `total` is `None` when no per-case
/// markers were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TestSummary {
    pub total: Option<u32>,
    pub passed: u32,
    pub failed: u32,
}

impl TestSummary {
    /// Summary used when there is no output to inspect.
    pub const fn unknown() -> Self {
        Self {
            total: None,
            passed: 0,
            failed: 0,
        }
    }
}

fn case_started() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"=== RUN\s+.*case_").expect("valid case start pattern"))
}

fn case_failed() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"--- FAIL:\s+.*case_").expect("valid case failure pattern"))
}

/// Summarize the combined sandbox output.
pub fn summarize(text: &str) -> TestSummary {
    let (mut total, mut failed) = (0u32, 0u32);
    let mut whole_run_pass = false;

    for line in text.lines() {
        if case_started().is_match(line) {
            total += 1;
        } else if case_failed().is_match(line) {
            failed += 1;
        } else if line.trim_end() == "PASS" {
            whole_run_pass = true;
        }
    }

    if total > 0 {
        TestSummary {
            total: Some(total),
            passed: total.saturating_sub(failed),
            failed,
        }
    } else {
        TestSummary {
            total: None,
            passed: u32::from(whole_run_pass),
            failed,
        }
    }
}

/// Join stdout and stderr the way the summarizer expects.
pub fn combine(stdout: &str, stderr: &str) -> String {
    format!("{stdout}\n{stderr}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_cases_and_failures() {
        let out = "\
=== RUN   TestSaveAndMiss
=== RUN   TestSaveAndMiss/case_0
=== RUN   TestSaveAndMiss/case_1
    saveandmiss_test.go:47: SaveAndMiss(\"zzz\",1) = \"z\"; want \"zzz\"
=== RUN   TestSaveAndMiss/case_2
--- FAIL: TestSaveAndMiss (0.00s)
    --- PASS: TestSaveAndMiss/case_0 (0.00s)
    --- FAIL: TestSaveAndMiss/case_1 (0.00s)
    --- PASS: TestSaveAndMiss/case_2 (0.00s)
FAIL
";
        assert_eq!(
            summarize(out),
            TestSummary {
                total: Some(3),
                passed: 2,
                failed: 1
            }
        );
    }

    #[test]
    fn lone_pass_is_binary_success() {
        assert_eq!(
            summarize("ok  \ttester/tests\t0.004s\nPASS\n"),
            TestSummary {
                total: None,
                passed: 1,
                failed: 0
            }
        );
    }

    #[test]
    fn failures_without_starts_are_still_counted() {
        let text = combine("FAIL\n", "--- FAIL: TestX/case_3 (0.00s)\n");
        assert_eq!(
            summarize(&text),
            TestSummary {
                total: None,
                passed: 0,
                failed: 1
            }
        );
    }

    #[test]
    fn pass_line_tolerates_carriage_return() {
        assert_eq!(summarize("ok\r\nPASS\r\n").passed, 1);
    }

    #[test]
    fn empty_output_is_unknown() {
        assert_eq!(summarize(""), TestSummary::unknown());
    }

    #[test]
    fn pass_must_be_a_whole_line() {
        assert_eq!(summarize("--- PASS: TestX (0.00s)\nPASSED\n").passed, 0);
    }

    #[test]
    fn markers_split_across_streams() {
        let text = combine(
            "=== RUN   TestX/case_0\n=== RUN   TestX/case_1\n",
            "    --- FAIL: TestX/case_1 (0.00s)\n",
        );
        assert_eq!(
            summarize(&text),
            TestSummary {
                total: Some(2),
                passed: 1,
                failed: 1
            }
        );
    }

    #[test]
    fn more_failures_than_starts_saturates() {
        let text = "=== RUN   TestX/case_0\n--- FAIL: TestX/case_0\n--- FAIL: TestX/case_0\n";
        assert_eq!(summarize(text).passed, 0);
    }

    #[test]
    fn unknown_total_serializes_as_null() {
        let json = serde_json::to_string(&TestSummary::unknown()).unwrap();
        assert_eq!(json, r#"{"total":null,"passed":0,"failed":0}"#);
    }
}
