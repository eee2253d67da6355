/// Machine output that is either a value (`Ok`) or, when nothing changed, what the runner should
/// wait on next (`Err`).
///
/// For the polling machines the wait value is the schedule of the next fetch. `None` from
/// `poll_output` means neither applies, for example once a loop has been ended.
pub type WrappedOutput<T, E> = Result<T, E>;
