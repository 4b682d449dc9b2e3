//! The capture-stack used to snapshot captures across recursive
//! invocations.

use crate::capture::CaptureBuffer;
use crate::error::MatchError;
use crate::value::Value;

/// A snapshot of the working capture buffer and the live dynamic values,
/// pushed when entering a left-recursive seed call and popped on its
/// return or failure.
#[derive(Clone, Debug, Default)]
struct Entry {
    captures: CaptureBuffer,
    values: Vec<Value>,
}

/// Stack of saved capture buffers and dynamic-value snapshots.
///
/// No separate field tracks the saved buffer's capacity: the saved
/// `CaptureBuffer`'s own `Vec` capacity already carries whatever
/// allocation such bookkeeping would otherwise exist to remember.
#[derive(Clone, Debug, Default)]
pub struct CaptureStack {
    entries: Vec<Entry>,
}

impl CaptureStack {
    pub fn new() -> Self {
        CaptureStack::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entering a left-recursive seed call: snapshot `captures`/`values` by
    /// moving them onto this stack, leaving the caller's buffers empty for
    /// the seed iteration to use.
    pub fn enter(&mut self, captures: &mut CaptureBuffer, values: &mut Vec<Value>) {
        let saved_captures = captures.take();
        let saved_values = std::mem::take(values);
        self.entries.push(Entry { captures: saved_captures, values: saved_values });
    }

    /// Leaving such a call: restore the most recently saved buffer and
    /// values into `captures`/`values`, which the caller then splices the
    /// winning iteration's results into.
    pub fn leave(&mut self, captures: &mut CaptureBuffer, values: &mut Vec<Value>) -> Result<(), MatchError> {
        let entry = self.entries.pop().ok_or_else(|| {
            log::error!("capture stack underflow on leave");
            MatchError::MalformedProgram { reason: "capture stack underflow on leave" }
        })?;
        *captures = entry.captures;
        *values = entry.values;
        Ok(())
    }
}
