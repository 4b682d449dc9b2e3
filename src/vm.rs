//! The interpreter loop: opcode dispatch over a precompiled instruction
//! stream, with backtracking, rule calls, bounded left recursion, and
//! match-time captures.
//!
//! `Matcher` bundles all of a single match's mutable state into one
//! context passed explicitly between its methods, and `match_program` is
//! the crate's external entry point.

use crate::capstack::CaptureStack;
use crate::capture::{Capture, CaptureBuffer};
use crate::error::MatchError;
use crate::frame::{BacktrackStack, Frame};
use crate::instruction::{CaptureKind, Instruction, Program};
use crate::lambda::{Committed, LambdaEntry, LambdaTable, Seed};
use crate::limits::Limits;
use crate::value::{MatchTimeFn, MatchTimeOutcome, Value};

/// The result of running the matcher to completion.
#[derive(Debug)]
pub enum MatchOutcome {
    /// Success: the final subject position, the capture records collected
    /// along the way, and any values synthesized by match-time functions.
    Match { end: usize, captures: Vec<Capture>, values: Vec<Value> },
    /// Failure: the sentinel was reached. Never an error.
    NoMatch,
}

/// Runs `program` against `subject[start..end]` (with `subject[..start]`
/// still visible to `IBehind`).
pub fn match_program(
    program: &Program,
    subject: &[u8],
    start: usize,
    end: usize,
    initial_captures: Vec<Capture>,
    funcs: &mut [&mut dyn MatchTimeFn],
    limits: Limits,
) -> Result<MatchOutcome, MatchError> {
    debug_assert!(start <= end && end <= subject.len());
    let mut matcher = Matcher::new(program, subject, end, limits, initial_captures);
    matcher.run(funcs, 0, start)
}

struct Matcher<'p, 's> {
    program: &'p Program,
    subject: &'s [u8],
    end: usize,
    limits: Limits,
    stack: BacktrackStack,
    captures: CaptureBuffer,
    capstack: CaptureStack,
    lambda: LambdaTable,
    values: Vec<Value>,
}

impl<'p, 's> Matcher<'p, 's> {
    fn new(program: &'p Program, subject: &'s [u8], end: usize, limits: Limits, initial_captures: Vec<Capture>) -> Self {
        let mut captures = CaptureBuffer::from_vec(initial_captures);
        captures.reserve(limits.init_captures);
        Matcher {
            program,
            subject,
            end,
            limits,
            stack: BacktrackStack::with_capacity(limits.init_backtrack),
            captures,
            capstack: CaptureStack::new(),
            lambda: LambdaTable::new(),
            values: Vec::new(),
        }
    }

    fn jump(pc: usize, offset: isize) -> usize {
        (pc as isize + offset) as usize
    }

    fn fetch(&self, pc: usize) -> Result<Instruction, MatchError> {
        self.program.get(pc).cloned().ok_or_else(|| {
            log::error!("program counter {pc} out of range");
            MatchError::MalformedProgram { reason: "program counter out of range" }
        })
    }

    fn run(&mut self, funcs: &mut [&mut dyn MatchTimeFn], mut pc: usize, mut s: usize) -> Result<MatchOutcome, MatchError> {
        loop {
            let instr = self.fetch(pc)?;
            match instr {
                Instruction::Any => {
                    if s < self.end {
                        s += 1;
                        pc += 1;
                    } else {
                        match self.fail()? {
                            Some((np, ns)) => {
                                pc = np;
                                s = ns;
                            }
                            None => return Ok(MatchOutcome::NoMatch),
                        }
                    }
                }
                Instruction::Char(c) => {
                    if s < self.end && self.subject[s] == c {
                        s += 1;
                        pc += 1;
                    } else {
                        match self.fail()? {
                            Some((np, ns)) => {
                                pc = np;
                                s = ns;
                            }
                            None => return Ok(MatchOutcome::NoMatch),
                        }
                    }
                }
                Instruction::Set(set) => {
                    if s < self.end && set.contains(self.subject[s]) {
                        s += 1;
                        pc += 1;
                    } else {
                        match self.fail()? {
                            Some((np, ns)) => {
                                pc = np;
                                s = ns;
                            }
                            None => return Ok(MatchOutcome::NoMatch),
                        }
                    }
                }
                Instruction::Span(set) => {
                    while s < self.end && set.contains(self.subject[s]) {
                        s += 1;
                    }
                    pc += 1;
                }
                Instruction::TestAny { offset } => {
                    if s < self.end {
                        pc += 1;
                    } else {
                        pc = Self::jump(pc, offset);
                    }
                }
                Instruction::TestChar { c, offset } => {
                    if s < self.end && self.subject[s] == c {
                        pc += 1;
                    } else {
                        pc = Self::jump(pc, offset);
                    }
                }
                Instruction::TestSet { set, offset } => {
                    if s < self.end && set.contains(self.subject[s]) {
                        pc += 1;
                    } else {
                        pc = Self::jump(pc, offset);
                    }
                }
                Instruction::Utf8Range { lo, hi } => {
                    match crate::charset::decode_utf8(self.subject, s) {
                        Some(d) if s + d.len <= self.end && d.codepoint >= lo && d.codepoint <= hi => {
                            s += d.len;
                            pc += 1;
                        }
                        _ => match self.fail()? {
                            Some((np, ns)) => {
                                pc = np;
                                s = ns;
                            }
                            None => return Ok(MatchOutcome::NoMatch),
                        },
                    }
                }
                Instruction::Behind { n } => {
                    let n = n as usize;
                    if s >= n {
                        s -= n;
                        pc += 1;
                    } else {
                        match self.fail()? {
                            Some((np, ns)) => {
                                pc = np;
                                s = ns;
                            }
                            None => return Ok(MatchOutcome::NoMatch),
                        }
                    }
                }
                Instruction::Jmp { offset } => {
                    pc = Self::jump(pc, offset);
                }
                Instruction::Choice { offset } => {
                    if self.stack.len() >= self.limits.max_backtrack {
                        log::error!("backtrack stack overflow at pc {pc}");
                        return Err(MatchError::BacktrackStackOverflow { limit: self.limits.max_backtrack });
                    }
                    self.stack.push(Frame::Choice { s, p: Self::jump(pc, offset), caplevel: self.captures.len() });
                    pc += 1;
                }
                Instruction::Commit { offset } => {
                    match self.stack.pop() {
                        Some(Frame::Choice { .. }) => {}
                        _ => {
                            log::error!("ICommit at pc {pc} found no choice frame on top of the backtrack stack");
                            return Err(MatchError::MalformedProgram { reason: "ICommit without a choice frame on top" });
                        }
                    }
                    pc = Self::jump(pc, offset);
                }
                Instruction::PartialCommit { offset } => {
                    match self.stack.top_mut() {
                        Some(Frame::Choice { s: fs, caplevel, .. }) => {
                            *fs = s;
                            *caplevel = self.captures.len();
                        }
                        _ => {
                            log::error!("IPartialCommit at pc {pc} found no choice frame on top of the backtrack stack");
                            return Err(MatchError::MalformedProgram { reason: "IPartialCommit without a choice frame on top" });
                        }
                    }
                    pc = Self::jump(pc, offset);
                }
                Instruction::BackCommit { offset } => {
                    match self.stack.pop() {
                        Some(Frame::Choice { s: fs, caplevel, .. }) => {
                            s = fs;
                            self.captures.truncate(caplevel);
                        }
                        _ => {
                            log::error!("IBackCommit at pc {pc} found no choice frame on top of the backtrack stack");
                            return Err(MatchError::MalformedProgram { reason: "IBackCommit without a choice frame on top" });
                        }
                    }
                    pc = Self::jump(pc, offset);
                }
                Instruction::FailTwice => {
                    match self.stack.pop() {
                        Some(Frame::Choice { .. }) => {}
                        _ => {
                            log::error!("IFailTwice at pc {pc} found no choice frame on top of the backtrack stack");
                            return Err(MatchError::MalformedProgram { reason: "IFailTwice without a choice frame on top" });
                        }
                    }
                    match self.fail()? {
                        Some((np, ns)) => {
                            pc = np;
                            s = ns;
                        }
                        None => return Ok(MatchOutcome::NoMatch),
                    }
                }
                Instruction::Fail => match self.fail()? {
                    Some((np, ns)) => {
                        pc = np;
                        s = ns;
                    }
                    None => return Ok(MatchOutcome::NoMatch),
                },
                Instruction::Giveup => return Ok(MatchOutcome::NoMatch),
                Instruction::Ret => {
                    match self.stack.pop() {
                        Some(Frame::Return { p }) => {
                            pc = p;
                        }
                        Some(Frame::LeftRec { s: orig_s, p, rule_pc, seed }) => {
                            let improved = match seed {
                                Seed::None => true,
                                Seed::At(x) => s > x,
                            };
                            if improved {
                                let commit = Committed { captures: self.captures.take(), values: std::mem::take(&mut self.values) };
                                let entry = self.lambda.get_mut(rule_pc, orig_s).ok_or_else(|| {
                                    log::error!("no lambda entry for rule {rule_pc} at {orig_s} on seed improvement");
                                    MatchError::MalformedProgram { reason: "missing lambda entry on seed improvement" }
                                })?;
                                entry.seed = Seed::At(s);
                                entry.commit = commit;
                                log::trace!("left-recursive rule at {rule_pc} improved seed to {s}");
                                self.stack.push(Frame::LeftRec { s: orig_s, p, rule_pc, seed: Seed::At(s) });
                                pc = rule_pc;
                                s = orig_s;
                            } else {
                                let final_pos = match seed {
                                    Seed::At(x) => x,
                                    Seed::None => unreachable!("LeftRec frame always has a real X by the time it doesn't improve"),
                                };
                                let entry = self.lambda.remove(rule_pc, orig_s).ok_or_else(|| {
                                    log::error!("no lambda entry for rule {rule_pc} at {orig_s} on convergence");
                                    MatchError::MalformedProgram { reason: "missing lambda entry on convergence" }
                                })?;
                                self.capstack.leave(&mut self.captures, &mut self.values)?;
                                self.captures.extend_from(&entry.commit.captures);
                                self.values.extend(entry.commit.values);
                                log::trace!("left-recursive rule at {rule_pc} converged at {final_pos}");
                                s = final_pos;
                                pc = p;
                            }
                        }
                        None => {
                            log::error!("IRet at pc {pc} found an empty backtrack stack");
                            return Err(MatchError::MalformedProgram { reason: "IRet with an empty backtrack stack" });
                        }
                    }
                }
                Instruction::End => {
                    if !self.stack.is_empty() {
                        log::error!("IEnd at pc {pc} reached with {} frames still on the backtrack stack", self.stack.len());
                        return Err(MatchError::MalformedProgram { reason: "IEnd reached with frames still on the backtrack stack" });
                    }
                    return Ok(MatchOutcome::Match { end: s, captures: std::mem::take(&mut self.captures).into_vec(), values: std::mem::take(&mut self.values) });
                }
                Instruction::Call { offset, k: 0 } => {
                    self.stack.push(Frame::Return { p: pc + 1 });
                    pc = Self::jump(pc, offset);
                }
                Instruction::Call { offset, k } => {
                    let target = Self::jump(pc, offset);
                    enum Lookup {
                        Absent,
                        FailFast,
                        Reuse(Committed, usize),
                    }
                    let lookup = match self.lambda.get(target, s) {
                        None => Lookup::Absent,
                        Some(entry) if entry.seed.is_fail() || k < entry.k => Lookup::FailFast,
                        Some(entry) => {
                            let seed_pos = match entry.seed {
                                Seed::At(x) => x,
                                Seed::None => unreachable!(),
                            };
                            Lookup::Reuse(entry.commit.clone(), seed_pos)
                        }
                    };
                    match lookup {
                        Lookup::Absent => {
                            if self.capstack.len() >= self.limits.max_capture_stack {
                                log::error!("too many concurrent left-recursive captures lists");
                                return Err(MatchError::TooManyCaptureLists);
                            }
                            self.lambda.insert(target, s, LambdaEntry { seed: Seed::None, k, commit: Committed::default() });
                            self.capstack.enter(&mut self.captures, &mut self.values);
                            self.stack.push(Frame::LeftRec { s, p: pc + 1, rule_pc: target, seed: Seed::None });
                            log::trace!("seeding left-recursive rule at {target} from position {s}");
                            pc = target;
                        }
                        Lookup::FailFast => {
                            match self.fail()? {
                                Some((np, ns)) => {
                                    pc = np;
                                    s = ns;
                                }
                                None => return Ok(MatchOutcome::NoMatch),
                            }
                        }
                        Lookup::Reuse(commit, seed_pos) => {
                            self.splice_committed(&commit)?;
                            s = seed_pos;
                            pc += 1;
                        }
                    }
                }
                Instruction::OpenCapture { kind, idx } => {
                    self.check_capture_budget()?;
                    self.captures.open(s, idx, kind);
                    pc += 1;
                }
                Instruction::CloseCapture { kind, idx } => {
                    self.check_capture_budget()?;
                    self.captures.close(s, idx, kind);
                    pc += 1;
                }
                Instruction::FullCapture { kind, idx, back } => {
                    self.check_capture_budget()?;
                    self.captures.full(s, back as usize, idx, kind);
                    pc += 1;
                }
                Instruction::CloseRunTime { idx } => {
                    match self.run_time_capture(funcs, idx as usize, s)? {
                        Some(new_s) => {
                            s = new_s;
                            pc += 1;
                        }
                        None => match self.fail()? {
                            Some((np, ns)) => {
                                pc = np;
                                s = ns;
                            }
                            None => return Ok(MatchOutcome::NoMatch),
                        },
                    }
                }
                Instruction::Nop => {
                    pc += 1;
                }
            }
        }
    }

    fn check_capture_budget(&self) -> Result<(), MatchError> {
        if self.captures.len() >= self.limits.max_captures {
            log::error!("too many captures (limit {})", self.limits.max_captures);
            return Err(MatchError::TooManyCaptures);
        }
        Ok(())
    }

    /// Splice another buffer's captures into the current one, translating
    /// any `Runtime` capture's value index by the current length of
    /// `self.values`, then appending its values.
    fn splice_committed(&mut self, commit: &Committed) -> Result<(), MatchError> {
        let offset = self.values.len();
        for cap in commit.captures.as_slice() {
            let mut cap = *cap;
            if cap.kind == CaptureKind::Runtime {
                let translated = offset.checked_add(cap.idx as usize).and_then(|v| u16::try_from(v).ok()).ok_or_else(|| {
                    log::error!("too many match-time results to translate a spliced runtime capture index");
                    MatchError::TooManyMatchTimeResults
                })?;
                cap.idx = translated;
            }
            self.captures.push(cap);
        }
        self.values.extend(commit.values.iter().cloned());
        Ok(())
    }

    /// The failure protocol. Pops frames until a choice or
    /// left-recursive frame is found (discarding plain return frames along
    /// the way), undoing left-recursion bookkeeping as it goes. Returns the
    /// `(pc, s)` to resume at, or `None` if the backtrack stack was
    /// exhausted (a genuine no-match).
    fn fail(&mut self) -> Result<Option<(usize, usize)>, MatchError> {
        loop {
            match self.stack.pop() {
                None => return Ok(None),
                Some(Frame::Return { .. }) => continue,
                Some(Frame::LeftRec { s: orig_s, rule_pc, seed, .. }) if seed.is_fail() => {
                    // lvar.2: the seed call itself never produced a match.
                    self.capstack.leave(&mut self.captures, &mut self.values)?;
                    self.lambda.remove(rule_pc, orig_s);
                    continue;
                }
                Some(Frame::LeftRec { s: orig_s, p, rule_pc, seed }) => {
                    // inc.2: at least one iteration succeeded; fall back to it.
                    let final_pos = match seed {
                        Seed::At(x) => x,
                        Seed::None => unreachable!("guarded by is_fail() above"),
                    };
                    let entry = self.lambda.remove(rule_pc, orig_s).ok_or_else(|| {
                        log::error!("no lambda entry for rule {rule_pc} at {orig_s} while failing a left-recursive call");
                        MatchError::MalformedProgram { reason: "missing lambda entry while failing a left-recursive call" }
                    })?;
                    self.capstack.leave(&mut self.captures, &mut self.values)?;
                    self.captures.extend_from(&entry.commit.captures);
                    self.values.extend(entry.commit.values);
                    log::trace!("left-recursive rule at {rule_pc} falling back to best iteration at {final_pos}");
                    return Ok(Some((p, final_pos)));
                }
                Some(Frame::Choice { s: fs, p, caplevel }) => {
                    if !self.values.is_empty() {
                        self.truncate_values_at_caplevel(caplevel);
                    }
                    self.captures.truncate(caplevel);
                    return Ok(Some((p, fs)));
                }
            }
        }
    }

    fn truncate_values_at_caplevel(&mut self, caplevel: usize) {
        let mut min_idx: Option<usize> = None;
        for cap in &self.captures.as_slice()[caplevel..] {
            if cap.kind == CaptureKind::Runtime {
                let idx = cap.idx as usize;
                min_idx = Some(min_idx.map_or(idx, |m| m.min(idx)));
            }
        }
        if let Some(idx) = min_idx {
            self.values.truncate(idx);
        }
    }

    /// The match-time capture protocol. Returns the new
    /// subject position on acceptance, or `None` on rejection (which the
    /// caller routes into the ordinary failure protocol).
    fn run_time_capture(&mut self, funcs: &mut [&mut dyn MatchTimeFn], idx: usize, s: usize) -> Result<Option<usize>, MatchError> {
        let group_idx = self.captures.last_open_index().ok_or_else(|| {
            log::error!("ICloseRunTime at position {s} found no open group capture");
            MatchError::MalformedProgram { reason: "ICloseRunTime with no open group capture" }
        })?;

        let nested_start = group_idx + 1;
        let n = self.captures.len() - nested_start;
        let mut rem = 0usize;
        let mut min_value_idx: Option<usize> = None;
        let mut args = Vec::with_capacity(n);
        for i in nested_start..self.captures.len() {
            let cap = *self.captures.get(i).unwrap();
            match cap.kind {
                CaptureKind::Runtime => {
                    let vi = cap.idx as usize;
                    min_value_idx = Some(min_value_idx.map_or(vi, |m| m.min(vi)));
                    if let Some(v) = self.values.get(vi) {
                        args.push(v.clone());
                    }
                }
                _ => {
                    if let Some(len) = cap.len {
                        args.push(Value::Bytes(self.subject[cap.s..cap.s + len].to_vec()));
                    }
                }
            }
        }
        if let Some(min_vi) = min_value_idx {
            rem = self.values.len() - min_vi;
        }

        let func = funcs.get_mut(idx).ok_or_else(|| {
            log::error!("ICloseRunTime references unknown match-time function index {idx}");
            MatchError::MalformedProgram { reason: "ICloseRunTime references an unknown function index" }
        })?;
        log::trace!("invoking match-time function {idx} at position {s}");
        let outcome = func.call(self.subject, s, &args);

        match outcome {
            MatchTimeOutcome::Fail => Ok(None),
            MatchTimeOutcome::Accept { new_pos, results } => {
                if let Some(new_pos) = new_pos {
                    if new_pos < s || new_pos > self.end {
                        log::error!("match-time function returned out-of-range position {new_pos}");
                        return Err(MatchError::InvalidMatchTimePosition);
                    }
                }
                self.captures.truncate(group_idx + 1);
                let new_values_len = self.values.len().saturating_sub(rem);
                self.values.truncate(new_values_len);

                if results.is_empty() {
                    self.captures.pop();
                } else {
                    if let Some(group) = self.captures.get_mut(group_idx) {
                        group.kind = CaptureKind::Close;
                        group.len = Some(0);
                    }
                    for value in results {
                        let value_idx = self.values.len();
                        let idx16 = u16::try_from(value_idx).map_err(|_| {
                            log::error!("too many match-time results produced by function {idx}");
                            MatchError::TooManyMatchTimeResults
                        })?;
                        self.values.push(value);
                        self.captures.push(Capture { s, idx: idx16, kind: CaptureKind::Runtime, len: Some(0) });
                    }
                    self.captures.close(s, 0, CaptureKind::Close);
                }
                Ok(Some(new_pos.unwrap_or(s)))
            }
        }
    }
}
