//! Cyclic module interface
//!
//! Processing stages in `lane_exec` are driven the same way regardless of what they do: build
//! them once from their parameters, then call `proc` once per camera frame.

// ---------------------------------------------------------------------------
// MODULE STATE
// ---------------------------------------------------------------------------

/// A module which is initialised once and then processes one input per cycle.
pub trait State {
    /// Parameters needed to build the module.
    type InitData;
    type InitError;

    /// The per-cycle input, e.g. a camera frame.
    type InputData;
    /// The per-cycle result handed to the next module.
    type OutputData;
    /// Diagnostics about the cycle, for logging and archiving only.
    type StatusReport;
    type ProcError;

    /// Build the module, replacing any previous configuration and memory.
    fn init(&mut self, init_data: Self::InitData) -> Result<(), Self::InitError>;

    /// Process one cycle's input.
    ///
    /// An `Err` means the input was rejected, and the module's memory is left as it was.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>;

    /// Forget everything accumulated by `proc` while keeping the configuration.
    fn reset(&mut self);
}
