use codeclass_api::models::submission::Verdict;
use codeclass_api::services::judge_client::{CaseResult, CaseStatus};
use codeclass_api::services::submission_service::interpret_results;

fn case(status: CaseStatus, stdout: &str, stderr: &str) -> CaseResult {
    CaseResult {
        token: String::new(),
        status,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        compile_output: String::new(),
        message: String::new(),
    }
}

#[test]
fn all_accepted_yields_accepted_with_full_pass_count() {
    let results = vec![
        case(CaseStatus::Accepted, "3", ""),
        case(CaseStatus::Accepted, "10", ""),
    ];

    let outcome = interpret_results(&results);

    assert_eq!(outcome.verdict, Verdict::Accepted);
    assert_eq!(outcome.passed, 2);
    assert_eq!(outcome.total, 2);
    // Surfaced output is the last case processed.
    assert_eq!(outcome.stdout, "10");
}

#[test]
fn scan_stops_at_first_failing_case() {
    // Second case would be accepted but is never reached.
    let results = vec![
        case(CaseStatus::WrongAnswer, "4", ""),
        case(CaseStatus::Accepted, "10", ""),
    ];

    let outcome = interpret_results(&results);

    assert_eq!(outcome.verdict, Verdict::WrongAnswer);
    assert_eq!(outcome.passed, 0);
    assert_eq!(outcome.stdout, "4");
}

#[test]
fn passes_before_the_failure_are_counted() {
    let results = vec![
        case(CaseStatus::Accepted, "3", ""),
        case(CaseStatus::TimeLimit, "", "timed out"),
        case(CaseStatus::Accepted, "10", ""),
    ];

    let outcome = interpret_results(&results);

    assert_eq!(outcome.verdict, Verdict::TimeLimit);
    assert_eq!(outcome.passed, 1);
    assert_eq!(outcome.stderr, "timed out");
}

#[test]
fn compile_error_maps_to_compilation_error() {
    let outcome = interpret_results(&[case(CaseStatus::CompileError, "", "")]);
    assert_eq!(outcome.verdict, Verdict::CompilationError);
}

#[test]
fn runtime_error_family_maps_to_runtime_error() {
    let outcome = interpret_results(&[case(CaseStatus::RuntimeError, "", "segfault")]);
    assert_eq!(outcome.verdict, Verdict::RuntimeError);
    assert_eq!(outcome.stderr, "segfault");
}

#[test]
fn cases_still_pending_at_deadline_grade_as_runtime_error() {
    let results = vec![
        case(CaseStatus::Accepted, "3", ""),
        case(CaseStatus::Processing, "", ""),
    ];

    let outcome = interpret_results(&results);

    assert_eq!(outcome.verdict, Verdict::RuntimeError);
    assert_eq!(outcome.passed, 1);
}

#[test]
fn stderr_falls_back_to_compile_output_then_message() {
    let mut with_compile_output = case(CaseStatus::CompileError, "", "");
    with_compile_output.compile_output = "syntax error on line 1".to_string();
    let outcome = interpret_results(&[with_compile_output]);
    assert_eq!(outcome.stderr, "syntax error on line 1");

    let mut with_message = case(CaseStatus::RuntimeError, "", "");
    with_message.message = "exec format error".to_string();
    let outcome = interpret_results(&[with_message]);
    assert_eq!(outcome.stderr, "exec format error");
}

#[test]
fn empty_result_list_is_not_accepted() {
    let outcome = interpret_results(&[]);
    assert_eq!(outcome.verdict, Verdict::RuntimeError);
    assert_eq!(outcome.passed, 0);
    assert_eq!(outcome.total, 0);
}
