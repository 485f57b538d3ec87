//! Try-catch-finally frames.

/// Which section of a TRY region is currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryState {
    /// Inside the try block.
    Try,
    /// Inside the catch block.
    Catch,
    /// Inside the finally block.
    Finally,
}

/// One TRY region recorded on a context's try stack.
#[derive(Debug, Clone)]
pub struct TryContext {
    /// Absolute offset of the catch block, if declared.
    pub catch_offset: Option<usize>,
    /// Absolute offset of the finally block, if declared.
    pub finally_offset: Option<usize>,
    /// Where ENDFINALLY resumes after a non-exceptional exit.
    pub end_offset: usize,
    /// Current section.
    pub state: TryState,
    /// Evaluation stack depth when the region was entered; the stack is
    /// truncated back to this depth when the handler takes over.
    pub stack_depth: usize,
}

impl TryContext {
    /// Opens a region in the Try state.
    pub fn new(
        catch_offset: Option<usize>,
        finally_offset: Option<usize>,
        stack_depth: usize,
    ) -> Self {
        Self {
            catch_offset,
            finally_offset,
            end_offset: 0,
            state: TryState::Try,
            stack_depth,
        }
    }

    /// True when an exception arriving now can be routed to a catch block.
    pub fn can_catch(&self) -> bool {
        self.state == TryState::Try && self.catch_offset.is_some()
    }

    /// True when the finally block still needs to run on the way out.
    pub fn needs_finally(&self) -> bool {
        self.state != TryState::Finally && self.finally_offset.is_some()
    }
}
