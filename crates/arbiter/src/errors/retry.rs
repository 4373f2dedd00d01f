/// Classification for failure handling during plan execution.
///
/// Used to determine how the arbitration engine should respond to errors
/// raised while executing a plan entry.
///
/// # Behavior Summary
///
/// | Class | Try Next Plan Entry? | Record Reliability Failure? |
/// |-------|---------------------|-----------------------------|
/// | `Never` | No | No |
/// | `FailoverWithPenalty` | Yes | Yes (affects future scoring) |
/// | `NextProvider` | Yes | No |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - the request is terminal as a whole.
    ///
    /// Raised for exhausted plans, missing providers, and invalid
    /// configuration. Moving to another provider won't help.
    Never,

    /// Failover to the next plan entry and record a reliability penalty.
    ///
    /// Used for timeouts and provider-side errors. The failure is recorded
    /// in the provider stats store, which lowers the provider's reliability
    /// and availability scores for future requests. Enough consecutive
    /// failures mark the provider degraded until its next success.
    FailoverWithPenalty,

    /// Try the next plan entry without recording any penalty.
    ///
    /// Used when this provider can't serve the request (unsupported asset,
    /// no data) but another provider might succeed.
    NextProvider,
}
