//! Append-only execution logs and the end-of-batch summary.
//!
//! Two independent JSONL streams: full intent+result records for replay, and
//! decoupled timing/motion records for statistical scoring. Each log call
//! appends exactly one line and never rewrites earlier ones.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use marionette_core::{FailureReason, MarionetteError, Timestamp};

use crate::intent::{ActionIntent, ActionResult};

// =============================================================================
// Execution trace
// =============================================================================

/// Sampled timing and motion values accumulated while one intent runs.
///
/// Built alongside the intent, which stays immutable; keys are stable strings
/// like `reaction_ms` or `attention_drift_dx`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub intent_id: String,
    pub decision_id: String,
    #[serde(default)]
    pub timing: BTreeMap<String, f64>,
    #[serde(default)]
    pub motion: BTreeMap<String, f64>,
    /// Names of cosmetic side-steps taken before dispatch, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub side_steps: Vec<String>,
}

impl ExecutionTrace {
    pub fn new(intent_id: &str, decision_id: &str) -> Self {
        Self {
            intent_id: intent_id.to_string(),
            decision_id: decision_id.to_string(),
            ..Self::default()
        }
    }

    pub fn record_timing(&mut self, key: &str, ms: f64) {
        self.timing.insert(key.to_string(), ms);
    }

    pub fn record_motion(&mut self, key: &str, value: f64) {
        self.motion.insert(key.to_string(), value);
    }

    pub fn record_side_step(&mut self, name: &str) {
        self.side_steps.push(name.to_string());
    }
}

// =============================================================================
// Loggers
// =============================================================================

fn append_line(path: &Path, line: &str) -> Result<(), MarionetteError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Appends one `{timestamp, intent, result}` record per executed intent.
#[derive(Debug)]
pub struct ActionLogger {
    path: PathBuf,
}

impl ActionLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn log(&self, intent: &ActionIntent, result: &ActionResult) -> Result<(), MarionetteError> {
        let record = serde_json::json!({
            "timestamp": Timestamp::now().to_rfc3339(),
            "intent": intent,
            "result": result,
        });
        append_line(&self.path, &record.to_string())
    }
}

/// Appends one [`ExecutionTrace`] record per executed intent, keyed by
/// intent and decision id.
#[derive(Debug)]
pub struct ContextLogger {
    path: PathBuf,
}

impl ContextLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn log(&self, trace: &ExecutionTrace) -> Result<(), MarionetteError> {
        append_line(&self.path, &serde_json::to_string(trace)?)
    }
}

// =============================================================================
// Summary
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub intent_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
}

/// End-of-batch record, written once whether the batch completed or aborted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub timestamp: String,
    pub count: usize,
    pub results: Vec<SummaryEntry>,
}

impl ExecutionSummary {
    pub fn from_results(results: &[ActionResult]) -> Self {
        Self {
            timestamp: Timestamp::now().to_rfc3339(),
            count: results.len(),
            results: results
                .iter()
                .map(|r| SummaryEntry {
                    intent_id: r.intent_id.clone(),
                    success: r.success,
                    failure_reason: r.failure_reason,
                })
                .collect(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), MarionetteError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marionette_core::ActionType;

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }

    // ---- execution trace ----

    #[test]
    fn test_trace_accumulation() {
        let mut trace = ExecutionTrace::new("a1", "dec-1");
        trace.record_timing("reaction_ms", 187.5);
        trace.record_motion("attention_drift_dx", -0.4);
        trace.record_side_step("edge_pause");
        assert_eq!(trace.timing["reaction_ms"], 187.5);
        assert_eq!(trace.motion["attention_drift_dx"], -0.4);
        assert_eq!(trace.side_steps, vec!["edge_pause"]);
    }

    #[test]
    fn test_trace_json_round_trip() {
        let mut trace = ExecutionTrace::new("a1", "dec-1");
        trace.record_timing("spacing_ms", 220.0);
        let json = serde_json::to_string(&trace).unwrap();
        let rt: ExecutionTrace = serde_json::from_str(&json).unwrap();
        assert_eq!(trace, rt);
    }

    // ---- loggers ----

    #[test]
    fn test_action_logger_appends_one_line_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("actions.jsonl");
        let logger = ActionLogger::new(&path);

        let intent = ActionIntent::at_point("a1", ActionType::Click, 10, 10);
        let result = ActionResult::success("a1");
        logger.log(&intent, &result).unwrap();
        logger.log(&intent, &result).unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        let record: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(record["intent"]["intent_id"], "a1");
        assert_eq!(record["result"]["success"], true);
        assert!(record["timestamp"].as_str().unwrap().len() >= 20);
    }

    #[test]
    fn test_action_logger_never_rewrites_prior_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actions.jsonl");
        let logger = ActionLogger::new(&path);

        let intent = ActionIntent::at_point("a1", ActionType::Click, 10, 10);
        logger.log(&intent, &ActionResult::success("a1")).unwrap();
        let first = read_lines(&path)[0].clone();
        logger
            .log(
                &intent,
                &ActionResult::failure("a1", FailureReason::Occluded),
            )
            .unwrap();
        assert_eq!(read_lines(&path)[0], first);
    }

    #[test]
    fn test_context_logger_writes_trace_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("context.jsonl");
        let logger = ContextLogger::new(&path);

        let mut trace = ExecutionTrace::new("a1", "dec-9");
        trace.record_timing("reaction_ms", 140.0);
        logger.log(&trace).unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 1);
        let record: ExecutionTrace = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(record.decision_id, "dec-9");
        assert_eq!(record.timing["reaction_ms"], 140.0);
    }

    // ---- summary ----

    #[test]
    fn test_summary_from_results() {
        let results = vec![
            ActionResult::success("a1"),
            ActionResult::failure("a2", FailureReason::PolicyBlock),
        ];
        let summary = ExecutionSummary::from_results(&results);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.results[1].failure_reason, Some(FailureReason::PolicyBlock));
    }

    #[test]
    fn test_summary_write_and_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("summary.json");
        let summary = ExecutionSummary::from_results(&[ActionResult::success("a1")]);
        summary.write(&path).unwrap();

        let parsed: ExecutionSummary =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, summary);
    }

    #[test]
    fn test_summary_of_empty_batch() {
        let summary = ExecutionSummary::from_results(&[]);
        assert_eq!(summary.count, 0);
        assert!(summary.results.is_empty());
    }
}
