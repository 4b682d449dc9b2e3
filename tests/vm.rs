//! End-to-end matcher scenarios.
//!
//! Programs here are hand-assembled with raw `Instruction`/`Program`
//! values rather than `ProgramBuilder` — building the `Vec` directly and
//! computing offsets by hand is simpler than a builder for a handful of
//! fixed instructions.

use pegvm::instruction::{CaptureKind, Instruction, Program};
use pegvm::limits::Limits;
use pegvm::value::{MatchTimeFn, MatchTimeOutcome, Value};
use pegvm::vm::{match_program, MatchOutcome};
use pegvm::{CharSet, MatchError};

fn digit_set() -> CharSet {
    CharSet::from_ranges(&[(b'0', b'9')])
}

/// `[set]+` compiled the standard LPeg way: one mandatory match, then a
/// choice/partial-commit loop for the rest.
fn one_or_more(byte: Option<u8>, set: Option<CharSet>) -> Program {
    let first = match (byte, &set) {
        (Some(c), _) => Instruction::Char(c),
        (None, Some(s)) => Instruction::Set(*s),
        _ => unreachable!(),
    };
    let again = first.clone();
    Program::new(vec![
        first,
        Instruction::Choice { offset: 3 },
        again,
        Instruction::PartialCommit { offset: -1 },
        Instruction::End,
    ])
}

fn a_plus_program() -> Program {
    one_or_more(Some(b'a'), None)
}

fn digit_plus_program() -> Program {
    one_or_more(None, Some(digit_set()))
}

/// `E <- E '+' 'n' / 'n'`, left-recursive.
///
/// pc0  Call  E_START  k=1   (the call that seeds the recursion)
/// pc1  End
/// pc2  Choice -> pc7            (E_START)
/// pc3  Call   E_START  k=1      (the self-call LPeg marks as left-recursive)
/// pc4  Char '+'
/// pc5  Char 'n'
/// pc6  Commit -> pc8
/// pc7  Char 'n'                 (ALT2)
/// pc8  Ret                      (END_E)
fn left_recursive_sum_program() -> Program {
    Program::new(vec![
        Instruction::Call { offset: 2, k: 1 }, // pc0 -> pc2
        Instruction::End,                      // pc1
        Instruction::Choice { offset: 5 },     // pc2 -> pc7
        Instruction::Call { offset: -1, k: 1 }, // pc3 -> pc2
        Instruction::Char(b'+'),               // pc4
        Instruction::Char(b'n'),               // pc5
        Instruction::Commit { offset: 2 },     // pc6 -> pc8
        Instruction::Char(b'n'),               // pc7
        Instruction::Ret,                      // pc8
    ])
}

/// `{ "(" runtime(fn) ")" }`: an open paren, an anonymous group bracketing a
/// match-time capture, a close paren.
fn runtime_capture_program() -> Program {
    Program::new(vec![
        Instruction::Char(b'('),                                    // pc0
        Instruction::OpenCapture { kind: CaptureKind::Group, idx: 0 }, // pc1
        Instruction::CloseRunTime { idx: 0 },                        // pc2
        Instruction::Char(b')'),                                    // pc3
        Instruction::End,                                            // pc4
    ])
}

struct Always(MatchTimeOutcomeKind);

enum MatchTimeOutcomeKind {
    Reject,
    AcceptOneValue(i64),
}

impl MatchTimeFn for Always {
    fn call(&mut self, _subject: &[u8], _pos: usize, _args: &[Value]) -> MatchTimeOutcome {
        match self.0 {
            MatchTimeOutcomeKind::Reject => MatchTimeOutcome::Fail,
            MatchTimeOutcomeKind::AcceptOneValue(n) => {
                MatchTimeOutcome::Accept { new_pos: None, results: vec![Value::Int(n)] }
            }
        }
    }
}

#[test]
fn a_plus_matches_run_of_as() {
    let program = a_plus_program();
    let outcome = match_program(&program, b"aaa", 0, 3, Vec::new(), &mut [], Limits::default()).unwrap();
    match outcome {
        MatchOutcome::Match { end, captures, .. } => {
            assert_eq!(end, 3);
            assert!(captures.is_empty());
        }
        MatchOutcome::NoMatch => panic!("expected a match"),
    }
}

#[test]
fn a_plus_requires_at_least_one_a() {
    let program = a_plus_program();
    let outcome = match_program(&program, b"bbb", 0, 3, Vec::new(), &mut [], Limits::default()).unwrap();
    assert!(matches!(outcome, MatchOutcome::NoMatch));
}

#[test]
fn digit_plus_matches_leading_digits_only() {
    let program = digit_plus_program();
    let outcome = match_program(&program, b"42x", 0, 3, Vec::new(), &mut [], Limits::default()).unwrap();
    match outcome {
        MatchOutcome::Match { end, .. } => assert_eq!(end, 2),
        MatchOutcome::NoMatch => panic!("expected a match"),
    }
}

#[test]
fn digit_plus_rejects_non_digit_start() {
    let program = digit_plus_program();
    let outcome = match_program(&program, b"x", 0, 1, Vec::new(), &mut [], Limits::default()).unwrap();
    assert!(matches!(outcome, MatchOutcome::NoMatch));
}

#[test]
fn left_recursive_grammar_matches_full_chain() {
    let program = left_recursive_sum_program();
    let outcome = match_program(&program, b"n+n+n", 0, 5, Vec::new(), &mut [], Limits::default()).unwrap();
    match outcome {
        MatchOutcome::Match { end, .. } => assert_eq!(end, 5),
        MatchOutcome::NoMatch => panic!("expected the left-recursive grammar to consume the whole chain"),
    }
}

#[test]
fn left_recursive_grammar_falls_back_to_best_iteration() {
    let program = left_recursive_sum_program();
    // The trailing "+x" can't extend the chain; the best prior iteration
    // (consuming "n+n") wins instead of the whole match failing.
    let outcome = match_program(&program, b"n+n+x", 0, 5, Vec::new(), &mut [], Limits::default()).unwrap();
    match outcome {
        MatchOutcome::Match { end, .. } => assert_eq!(end, 3),
        MatchOutcome::NoMatch => panic!("expected the grammar to fall back to its best iteration"),
    }
}

#[test]
fn match_time_capture_rejection_fails_the_whole_match() {
    let program = runtime_capture_program();
    let mut rejector = Always(MatchTimeOutcomeKind::Reject);
    let mut funcs: Vec<&mut dyn MatchTimeFn> = vec![&mut rejector];
    let outcome = match_program(&program, b"()", 0, 2, Vec::new(), &mut funcs, Limits::default()).unwrap();
    assert!(matches!(outcome, MatchOutcome::NoMatch));
}

#[test]
fn match_time_capture_accept_injects_a_runtime_value() {
    let program = runtime_capture_program();
    let mut acceptor = Always(MatchTimeOutcomeKind::AcceptOneValue(42));
    let mut funcs: Vec<&mut dyn MatchTimeFn> = vec![&mut acceptor];
    let outcome = match_program(&program, b"()", 0, 2, Vec::new(), &mut funcs, Limits::default()).unwrap();
    match outcome {
        MatchOutcome::Match { end, captures, values } => {
            assert_eq!(end, 2);
            assert_eq!(values, vec![Value::Int(42)]);
            assert_eq!(captures.len(), 3);
            assert_eq!(captures[1].kind, CaptureKind::Runtime);
            assert_eq!(captures[1].idx, 0);
            assert_eq!(captures[2].kind, CaptureKind::Close);
        }
        MatchOutcome::NoMatch => panic!("expected a match"),
    }
}

#[test]
fn utf8_range_accepts_in_range_codepoint() {
    // 0xC2 0xA9 is U+00A9 (the copyright sign), inside [0x80, 0x7FF].
    let program = Program::new(vec![Instruction::Utf8Range { lo: 0x80, hi: 0x7FF }, Instruction::End]);
    let outcome = match_program(&program, &[0xC2, 0xA9], 0, 2, Vec::new(), &mut [], Limits::default()).unwrap();
    match outcome {
        MatchOutcome::Match { end, .. } => assert_eq!(end, 2),
        MatchOutcome::NoMatch => panic!("expected a match"),
    }
}

#[test]
fn utf8_range_rejects_overlong_encoding() {
    // 0xC0 0xA9 is an overlong two-byte encoding of U+0029.
    let program = Program::new(vec![Instruction::Utf8Range { lo: 0x80, hi: 0x7FF }, Instruction::End]);
    let outcome = match_program(&program, &[0xC0, 0xA9], 0, 2, Vec::new(), &mut [], Limits::default()).unwrap();
    assert!(matches!(outcome, MatchOutcome::NoMatch));
}

#[test]
fn any_char_set_fail_at_end_of_input() {
    let any = Program::new(vec![Instruction::Any, Instruction::End]);
    assert!(matches!(match_program(&any, b"", 0, 0, Vec::new(), &mut [], Limits::default()).unwrap(), MatchOutcome::NoMatch));

    let lit = Program::new(vec![Instruction::Char(b'a'), Instruction::End]);
    assert!(matches!(match_program(&lit, b"", 0, 0, Vec::new(), &mut [], Limits::default()).unwrap(), MatchOutcome::NoMatch));

    let set = Program::new(vec![Instruction::Set(digit_set()), Instruction::End]);
    assert!(matches!(match_program(&set, b"", 0, 0, Vec::new(), &mut [], Limits::default()).unwrap(), MatchOutcome::NoMatch));
}

#[test]
fn behind_fails_when_not_enough_preceding_bytes() {
    let program = Program::new(vec![Instruction::Behind { n: 3 }, Instruction::End]);
    // Two bytes precede position 2, but IBehind 3 needs at least three.
    let outcome = match_program(&program, b"ab", 2, 2, Vec::new(), &mut [], Limits::default()).unwrap();
    assert!(matches!(outcome, MatchOutcome::NoMatch));
}

#[test]
fn behind_succeeds_and_moves_the_cursor_back() {
    let program = Program::new(vec![Instruction::Behind { n: 2 }, Instruction::End]);
    let outcome = match_program(&program, b"ab", 2, 2, Vec::new(), &mut [], Limits::default()).unwrap();
    match outcome {
        MatchOutcome::Match { end, .. } => assert_eq!(end, 0),
        MatchOutcome::NoMatch => panic!("expected a match"),
    }
}

#[test]
fn backtrack_stack_overflow_is_fatal_not_a_no_match() {
    // Three choice points in a row, never committed, against a limit of two.
    let program = Program::new(vec![
        Instruction::Choice { offset: 1 },
        Instruction::Choice { offset: 1 },
        Instruction::Choice { offset: 1 },
        Instruction::End,
    ]);
    let limits = Limits { max_backtrack: 2, ..Limits::default() };
    let result = match_program(&program, b"", 0, 0, Vec::new(), &mut [], limits);
    assert_eq!(result.unwrap_err(), MatchError::BacktrackStackOverflow { limit: 2 });
}

#[test]
fn replaying_the_same_match_is_deterministic() {
    let program = left_recursive_sum_program();
    let first = match_program(&program, b"n+n+n", 0, 5, Vec::new(), &mut [], Limits::default()).unwrap();
    let second = match_program(&program, b"n+n+n", 0, 5, Vec::new(), &mut [], Limits::default()).unwrap();
    match (first, second) {
        (MatchOutcome::Match { end: e1, .. }, MatchOutcome::Match { end: e2, .. }) => assert_eq!(e1, e2),
        _ => panic!("expected both replays to succeed identically"),
    }
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn digit_plus_agrees_with_leading_digit_count(s in "[a-zA-Z0-9]{0,16}") {
            let program = digit_plus_program();
            let bytes = s.as_bytes();
            let outcome = match_program(&program, bytes, 0, bytes.len(), Vec::new(), &mut [], Limits::default()).unwrap();
            let expected = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
            match outcome {
                MatchOutcome::Match { end, .. } => prop_assert_eq!(end, expected),
                MatchOutcome::NoMatch => prop_assert_eq!(expected, 0),
            }
        }

        #[test]
        fn digit_plus_replay_is_deterministic(s in "[a-zA-Z0-9]{0,16}") {
            let program = digit_plus_program();
            let bytes = s.as_bytes();
            let first = match_program(&program, bytes, 0, bytes.len(), Vec::new(), &mut [], Limits::default()).unwrap();
            let second = match_program(&program, bytes, 0, bytes.len(), Vec::new(), &mut [], Limits::default()).unwrap();
            match (first, second) {
                (MatchOutcome::Match { end: e1, .. }, MatchOutcome::Match { end: e2, .. }) => prop_assert_eq!(e1, e2),
                (MatchOutcome::NoMatch, MatchOutcome::NoMatch) => {}
                _ => prop_assert!(false, "the same program/input pair produced different outcomes on replay"),
            }
        }
    }
}
