pub mod backoff;
pub mod notification;
pub mod telemetry;
pub mod wrappers;

/// The [`StateMachine`] trait separates the bookkeeping of a polling loop from the loop itself.
///
/// # Functionality
/// A polling loop does three things: it performs IO, it waits, and it decides what the IO
/// results mean for the state consumers see. Only the last of these is interesting to test and
/// only the last of these can race with readers. Implementors of this trait hold exactly that
/// part: they receive everything the loop observed as [`Input`](StateMachine::Input) and expose
/// what changed as [`Output`](StateMachine::Output).
///
/// The runner (a tokio task in [`crate::poller`]) owns the IO, the timers, and the clock; the
/// state machine owns the derived state.
///
/// # Invariants
/// Implementors *must* uphold the following.
///
/// ## No Interior Mutability
/// All state is mutated through `&mut self` only. No [`std::cell`] containers, no
/// [`std::sync`] locks, and no reference counted sharing of mutable state. Immutable shared
/// data such as an `Arc` of a published sample is fine, since nobody can write through it.
///
/// The container holding the machine decides how it is shared, typically behind a single
/// [`Mutex`](std::sync::Mutex) so that a whole input is applied before any reader observes it.
///
/// ## No IO
/// No network, filesystem, or channel access. Fetch results arrive as input.
///
/// ### No System Time
/// Reading [`std::time::Instant::now`] or the wall clock makes two otherwise identical runs
/// diverge. Time is delivered as input; see [`wrappers`] for injecting it implicitly.
///
/// ## No Async and No Blocking
/// Processing an input is synchronous and completes before the runner reaches its next await
/// point. This is what makes each update atomic from a consumer's point of view.
///
/// # Side Effects
/// Logging through `tracing` is allowed as long as the logic never depends on it.
///
/// # Example
/// ```ignore
/// let mut machine = NotificationMachine::new(policy);
/// machine.process_input(NotificationInput::Begin(session.clone()));
/// machine.process_input(NotificationInput::Fetched { session, notifications });
///
/// while let Some(Ok(update)) = machine.poll_output() {
///     publish(update);
/// }
/// ```
pub trait StateMachine {
    /// The type of input that is [processed](StateMachine::process_input) by the state machine.
    ///
    /// Usually an enum of everything the runner can observe.
    type Input;
    /// The type of output that is [polled](StateMachine::poll_output) from the state machine.
    type Output;

    /// Apply one observation to the state machine.
    fn process_input(&mut self, input: Self::Input);

    /// Poll the state machine for output, returning the first available output if present.
    fn poll_output(&mut self) -> Option<Self::Output>;
}
