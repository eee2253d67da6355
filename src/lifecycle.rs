use tokio::sync::watch;

/// Whether the host application is currently in the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppVisibility {
    #[default]
    Foreground,
    Background,
}

/// The host side of the shared foreground signal.
///
/// The host owns the only writer; pollers hold receivers and treat the value as read-only.
#[derive(Debug)]
pub struct HostLifecycle {
    tx: watch::Sender<AppVisibility>,
}

impl HostLifecycle {
    pub fn new(initial: AppVisibility) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn set(&self, visibility: AppVisibility) {
        self.tx.send_if_modified(|current| {
            let changed = *current != visibility;
            *current = visibility;
            changed
        });
    }

    pub fn set_foreground(&self) {
        self.set(AppVisibility::Foreground);
    }

    pub fn set_background(&self) {
        self.set(AppVisibility::Background);
    }

    pub fn current(&self) -> AppVisibility {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppVisibility> {
        self.tx.subscribe()
    }

    /// Number of pollers still listening to the signal.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for HostLifecycle {
    fn default() -> Self {
        Self::new(AppVisibility::Foreground)
    }
}

/// Wait until `visibility` reports the foreground.
///
/// Returns `false` if the host dropped the signal while backgrounded.
pub(crate) async fn wait_for_foreground(visibility: &mut watch::Receiver<AppVisibility>) -> bool {
    visibility
        .wait_for(|current| *current == AppVisibility::Foreground)
        .await
        .is_ok()
}
