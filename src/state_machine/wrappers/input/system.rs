use chrono::{DateTime, Utc};

/// A value only the runtime environment can provide, such as the wall clock.
///
/// Machines never call [`generate`](SystemResource::generate) themselves. Their containers do,
/// and hand the result over as [`SystemInput::System`], which keeps the machine replayable in
/// tests with fixed values.
pub trait SystemResource {
    fn generate() -> Self;
}

impl SystemResource for DateTime<Utc> {
    fn generate() -> Self {
        Utc::now()
    }
}

/// Input to a machine that needs a [`SystemResource`] alongside its regular input.
///
/// Containers send `System` ahead of each `Input` so the machine sees a fresh clock reading.
#[derive(Debug)]
pub enum SystemInput<I, S> {
    Input(I),
    System(S),
}
