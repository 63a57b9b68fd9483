use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use codeclass_api::error::ApiError;
use codeclass_api::models::hint::HintLevel;
use codeclass_api::models::progress::TaskProgress;
use codeclass_api::models::submission::{Submission, Verdict};
use codeclass_api::models::task::{Task, TestCase};
use codeclass_api::services::ai_client::{HintModel, HintModelError, HintModelOutput};
use codeclass_api::services::hint_service::{
    build_prompt_snapshot, generate_checked, hint_gate, sanitize_no_code, CODE_BLOCK_MARKER,
    CODE_LINE_MARKER,
};

/// Counts calls and replies with a canned hint.
struct RecordingModel {
    calls: AtomicUsize,
}

impl RecordingModel {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl HintModel for RecordingModel {
    async fn generate(
        &self,
        _level: HintLevel,
        _prompt_snapshot: &str,
    ) -> Result<HintModelOutput, HintModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(HintModelOutput {
            text: "Check how your loop handles the last element.".to_string(),
            no_code_confirmed: true,
            model: "stub".to_string(),
            tokens_in: Some(100),
            tokens_out: Some(20),
        })
    }
}

fn progress_with_failures(failed: u32) -> TaskProgress {
    let mut progress = TaskProgress::new("p1", "ss1", "t1");
    let now = Utc::now();
    for _ in 0..failed {
        progress.claim_attempt(now, "h");
        progress.apply_verdict(Verdict::WrongAnswer, now);
    }
    progress
}

fn sample_task() -> Task {
    Task {
        id: "t1".to_string(),
        session_id: "s1".to_string(),
        position: 1,
        title: "Sum of two numbers".to_string(),
        statement: "Read two integers and print their sum.".to_string(),
        constraints: "0 <= a, b <= 1000".to_string(),
        test_cases: vec![
            TestCase {
                ordinal: 1,
                stdin: "1 2".to_string(),
                expected_stdout: "3".to_string(),
                is_visible: true,
            },
            TestCase {
                ordinal: 2,
                stdin: "5 5".to_string(),
                expected_stdout: "10".to_string(),
                is_visible: true,
            },
            TestCase {
                ordinal: 3,
                stdin: "7 1".to_string(),
                expected_stdout: "8".to_string(),
                is_visible: true,
            },
            TestCase {
                ordinal: 4,
                stdin: "999 1".to_string(),
                expected_stdout: "1000".to_string(),
                is_visible: false,
            },
        ],
        created_at: Utc::now(),
    }
}

fn submission(attempt_no: u32, verdict: Verdict, code: &str, stderr: &str) -> Submission {
    Submission {
        id: format!("sub-{}", attempt_no),
        progress_id: "p1".to_string(),
        attempt_no,
        code: code.to_string(),
        verdict,
        stdout: String::new(),
        stderr: stderr.to_string(),
        passed_tests: 0,
        total_tests: 4,
        submitted_at: Utc::now(),
    }
}

#[test]
fn fenced_blocks_are_removed_entirely() {
    let text = "The issue is the loop bound.\n```python\nfor i in range(n):\n    print(i)\n```\nTry rethinking the last index.";
    let sanitized = sanitize_no_code(text);

    assert!(sanitized.contains(CODE_BLOCK_MARKER));
    assert!(!sanitized.contains("```"));
    assert!(!sanitized.contains("range(n)"));
    assert!(sanitized.contains("Try rethinking the last index."));
}

#[test]
fn code_like_lines_are_replaced_with_the_marker() {
    let text = "Your condition is inverted.\nif x > 0:\nimport math\nprint(result)\nfor item in data:\nThink about edge cases.";
    let sanitized = sanitize_no_code(text);

    let lines: Vec<&str> = sanitized.lines().collect();
    assert_eq!(lines[0], "Your condition is inverted.");
    assert_eq!(lines[1], CODE_LINE_MARKER);
    assert_eq!(lines[2], CODE_LINE_MARKER);
    assert_eq!(lines[3], CODE_LINE_MARKER);
    assert_eq!(lines[4], CODE_LINE_MARKER);
    assert_eq!(lines[5], "Think about edge cases.");
}

#[test]
fn code_bearing_text_round_trips_to_markers_only() {
    let samples = [
        "def solve():\n    return 42",
        "from collections import Counter",
        "while True:\n    pass",
        "class Solution:",
        "elif n == 0:",
    ];

    for sample in samples {
        let sanitized = sanitize_no_code(sample);
        for line in sanitized.lines() {
            assert!(
                line == CODE_LINE_MARKER || line == CODE_BLOCK_MARKER || line.trim() == "pass" || line.trim() == "return 42",
                "unexpected surviving line: {:?}",
                line
            );
            // The statement keywords themselves must be gone.
            assert!(!line.starts_with("def "));
            assert!(!line.starts_with("from "));
            assert!(!line.starts_with("while "));
            assert!(!line.starts_with("class "));
            assert!(!line.starts_with("elif "));
        }
    }
}

#[test]
fn plain_prose_is_untouched() {
    let text = "The sum overflows for large inputs.\nConsider what happens at the boundary.";
    assert_eq!(sanitize_no_code(text), text);
}

#[test]
fn gate_blocks_levels_until_their_thresholds() {
    let progress = progress_with_failures(4);
    assert!(matches!(
        hint_gate(&progress, HintLevel::One),
        Err(ApiError::HintNotYetAvailable)
    ));

    let progress = progress_with_failures(5);
    assert!(hint_gate(&progress, HintLevel::One).is_ok());
    assert!(matches!(
        hint_gate(&progress, HintLevel::Two),
        Err(ApiError::HintNotYetAvailable)
    ));

    let progress = progress_with_failures(8);
    assert!(hint_gate(&progress, HintLevel::Two).is_ok());
}

#[tokio::test]
async fn locked_level_never_reaches_the_model() {
    let model = RecordingModel::new();
    let progress = progress_with_failures(3);

    let err = generate_checked(&model, &progress, HintLevel::One, "snapshot")
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::HintNotYetAvailable));
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unlocked_level_calls_the_model_once() {
    let model = RecordingModel::new();
    let progress = progress_with_failures(5);

    let output = generate_checked(&model, &progress, HintLevel::One, "snapshot")
        .await
        .unwrap();

    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    assert!(!output.text.is_empty());
}

#[test]
fn snapshot_carries_task_context_and_attempt_history() {
    let task = sample_task();
    let last = submission(5, Verdict::WrongAnswer, "print(a - b)", "AssertionError");
    let recent = vec![
        submission(3, Verdict::RuntimeError, "x", "NameError: a"),
        submission(4, Verdict::WrongAnswer, "y", ""),
        last.clone(),
    ];

    let snapshot = build_prompt_snapshot(HintLevel::One, &task, Some(&last), &recent);

    assert!(snapshot.contains("LEVEL=1"));
    assert!(snapshot.contains("Read two integers and print their sum."));
    assert!(snapshot.contains("0 <= a, b <= 1000"));
    // Only the first two visible examples are included.
    assert!(snapshot.contains("Example 1:"));
    assert!(snapshot.contains("Example 2:"));
    assert!(!snapshot.contains("7 1"));
    // Hidden cases never leak into the prompt.
    assert!(!snapshot.contains("999 1"));
    assert!(snapshot.contains("verdict=wrong_answer"));
    assert!(snapshot.contains("print(a - b)"));
    assert!(snapshot.contains("attempt=3"));
    assert!(snapshot.contains("attempt=4"));
}

#[test]
fn snapshot_truncates_long_stderr_in_the_brief() {
    let task = sample_task();
    let long_stderr = "E".repeat(500);
    let recent = vec![submission(1, Verdict::RuntimeError, "x", &long_stderr)];

    let snapshot = build_prompt_snapshot(HintLevel::Two, &task, None, &recent);

    assert!(snapshot.contains("LEVEL=2"));
    assert!(snapshot.contains(&"E".repeat(200)));
    assert!(!snapshot.contains(&"E".repeat(201)));
}
