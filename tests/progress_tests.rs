use chrono::{Duration, Utc};
use codeclass_api::models::hint::HintLevel;
use codeclass_api::models::progress::{ProgressStatus, SubmitRejection, TaskProgress};
use codeclass_api::models::submission::Verdict;
use codeclass_api::services::submission_service::content_hash;

const COOLDOWN: i64 = 15;

fn new_progress() -> TaskProgress {
    TaskProgress::new("p1", "ss1", "t1")
}

fn cooldown() -> Duration {
    Duration::seconds(COOLDOWN)
}

/// Runs one full gate-check + claim + grade cycle the way the orchestrator
/// does, advancing the clock past the cooldown first.
fn graded_attempt(progress: &mut TaskProgress, code: &str, verdict: Verdict) -> u32 {
    let now = progress
        .last_submit_at
        .map(|t| t + cooldown())
        .unwrap_or_else(Utc::now);
    let hash = content_hash(code);
    progress
        .check_submit_gates(now, &hash, cooldown())
        .expect("gates should pass");
    let attempt_no = progress.claim_attempt(now, &hash);
    progress.apply_verdict(verdict, now);
    attempt_no
}

#[test]
fn open_is_idempotent_and_moves_to_in_progress() {
    let mut progress = new_progress();
    let now = Utc::now();

    assert!(progress.mark_opened(now));
    assert_eq!(progress.status, ProgressStatus::InProgress);
    let first_opened = progress.opened_at;

    let later = now + Duration::minutes(5);
    assert!(!progress.mark_opened(later));
    assert_eq!(progress.opened_at, first_opened);
}

#[test]
fn attempt_numbers_are_contiguous_and_counters_stay_consistent() {
    let mut progress = new_progress();

    for expected_no in 1..=6u32 {
        let code = format!("print({})", expected_no);
        let attempt_no = graded_attempt(&mut progress, &code, Verdict::WrongAnswer);
        assert_eq!(attempt_no, expected_no);
        assert_eq!(progress.attempts_total, expected_no);
        assert!(progress.attempts_failed <= progress.attempts_total);
    }

    assert_eq!(progress.attempts_failed, 6);
}

#[test]
fn duplicate_code_is_rejected_without_counting() {
    let mut progress = new_progress();
    let hash = content_hash("print(1)");
    let now = Utc::now();

    progress.check_submit_gates(now, &hash, cooldown()).unwrap();
    progress.claim_attempt(now, &hash);
    progress.apply_verdict(Verdict::WrongAnswer, now);
    assert_eq!(progress.attempts_total, 1);

    // Same code after the cooldown: still refused, nothing counted.
    let later = now + cooldown() + Duration::seconds(1);
    assert_eq!(
        progress.check_submit_gates(later, &hash, cooldown()),
        Err(SubmitRejection::NoCodeChange)
    );
    assert_eq!(progress.attempts_total, 1);
    assert_eq!(progress.attempts_failed, 1);

    // Changed code passes the gate.
    let other = content_hash("print(2)");
    assert!(progress.check_submit_gates(later, &other, cooldown()).is_ok());
}

#[test]
fn rapid_resubmit_is_rejected_with_remaining_wait() {
    let mut progress = new_progress();
    let now = Utc::now();
    let hash = content_hash("print(1)");

    progress.check_submit_gates(now, &hash, cooldown()).unwrap();
    progress.claim_attempt(now, &hash);
    progress.apply_verdict(Verdict::WrongAnswer, now);

    let soon = now + Duration::seconds(5);
    let other = content_hash("print(2)");
    match progress.check_submit_gates(soon, &other, cooldown()) {
        Err(SubmitRejection::TooFrequent { wait_seconds }) => {
            assert!(wait_seconds > 0 && wait_seconds <= COOLDOWN);
        }
        other => panic!("expected TooFrequent, got {:?}", other),
    }
    assert_eq!(progress.attempts_total, 1);

    // After the cooldown the changed code goes through.
    let later = now + cooldown();
    assert!(progress.check_submit_gates(later, &other, cooldown()).is_ok());
}

#[test]
fn hint_level_1_unlocks_at_exactly_five_failures() {
    let mut progress = new_progress();

    for n in 1..=4u32 {
        graded_attempt(&mut progress, &format!("v{}", n), Verdict::WrongAnswer);
        assert!(
            !progress.hint_unlocked(HintLevel::One),
            "level 1 must stay locked after {} failures",
            n
        );
    }

    graded_attempt(&mut progress, "v5", Verdict::WrongAnswer);
    assert!(progress.hint_unlocked(HintLevel::One));
    assert!(!progress.hint_unlocked(HintLevel::Two));
}

#[test]
fn hint_level_2_unlocks_at_exactly_eight_failures() {
    let mut progress = new_progress();

    for n in 1..=7u32 {
        graded_attempt(&mut progress, &format!("v{}", n), Verdict::WrongAnswer);
        assert!(!progress.hint_unlocked(HintLevel::Two));
    }

    graded_attempt(&mut progress, "v8", Verdict::WrongAnswer);
    assert!(progress.hint_unlocked(HintLevel::Two));
}

#[test]
fn unlock_stamps_are_write_once() {
    let mut progress = new_progress();

    for n in 1..=5u32 {
        graded_attempt(&mut progress, &format!("v{}", n), Verdict::WrongAnswer);
    }
    let stamp = progress.hint1_unlocked_at;
    assert!(stamp.is_some());

    graded_attempt(&mut progress, "v6", Verdict::TimeLimit);
    assert_eq!(progress.hint1_unlocked_at, stamp);
}

#[test]
fn accepted_solves_and_locks_the_task() {
    let mut progress = new_progress();

    graded_attempt(&mut progress, "bad", Verdict::WrongAnswer);
    graded_attempt(&mut progress, "good", Verdict::Accepted);

    assert_eq!(progress.status, ProgressStatus::Solved);
    assert!(progress.solved_at.is_some());
    assert!(progress.locked_after_solve);
    assert!(progress.is_locked());
    assert_eq!(progress.attempts_failed, 1);

    // Any further submit answers with the locked signal.
    let later = Utc::now() + Duration::minutes(10);
    assert_eq!(
        progress.check_submit_gates(later, &content_hash("more"), cooldown()),
        Err(SubmitRejection::Locked)
    );
}

#[test]
fn failed_verdicts_all_count_toward_thresholds() {
    let mut progress = new_progress();

    graded_attempt(&mut progress, "a", Verdict::WrongAnswer);
    graded_attempt(&mut progress, "b", Verdict::TimeLimit);
    graded_attempt(&mut progress, "c", Verdict::CompilationError);
    graded_attempt(&mut progress, "d", Verdict::RuntimeError);

    assert_eq!(progress.attempts_failed, 4);
    assert_eq!(progress.attempts_total, 4);
    assert!(!progress.hint_unlocked(HintLevel::One));

    graded_attempt(&mut progress, "e", Verdict::RuntimeError);
    assert!(progress.hint_unlocked(HintLevel::One));
}

#[test]
fn content_hash_is_stable_and_distinguishes_code() {
    assert_eq!(content_hash("print(1)"), content_hash("print(1)"));
    assert_ne!(content_hash("print(1)"), content_hash("print(2)"));
}
