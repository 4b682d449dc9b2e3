//! The left-recursion memoization table ("lambda table"): per-(rule,
//! position) state for the seed-and-grow algorithm.

use std::collections::HashMap;

use crate::capture::CaptureBuffer;
use crate::value::Value;

/// The seed state of an in-progress or completed left-recursive call.
/// `Seed::None` means no seed has succeeded yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Seed {
    None,
    At(usize),
}

impl Seed {
    pub fn is_fail(&self) -> bool {
        matches!(self, Seed::None)
    }
}

/// The committed captures and dynamic values produced by the best iteration
/// seen so far for a given lambda entry.
#[derive(Clone, Debug, Default)]
pub struct Committed {
    pub captures: CaptureBuffer,
    pub values: Vec<Value>,
}

/// Per-(rule, position) memo of a left-recursive call's state.
#[derive(Clone, Debug)]
pub struct LambdaEntry {
    pub seed: Seed,
    pub k: u8,
    pub commit: Committed,
}

/// Keyed directly by `(rule_pc, position)` rather than a packed integer —
/// a `HashMap` needs no single-integer key, so there is nothing to gain
/// from multiplying the two together the way a fixed-size array would.
#[derive(Clone, Debug, Default)]
pub struct LambdaTable {
    entries: HashMap<(usize, usize), LambdaEntry>,
}

impl LambdaTable {
    pub fn new() -> Self {
        LambdaTable::default()
    }

    pub fn get(&self, rule_pc: usize, pos: usize) -> Option<&LambdaEntry> {
        self.entries.get(&(rule_pc, pos))
    }

    pub fn get_mut(&mut self, rule_pc: usize, pos: usize) -> Option<&mut LambdaEntry> {
        self.entries.get_mut(&(rule_pc, pos))
    }

    pub fn insert(&mut self, rule_pc: usize, pos: usize, entry: LambdaEntry) {
        self.entries.insert((rule_pc, pos), entry);
    }

    pub fn remove(&mut self, rule_pc: usize, pos: usize) -> Option<LambdaEntry> {
        self.entries.remove(&(rule_pc, pos))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
