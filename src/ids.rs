use std::fmt::Display;
use std::sync::Arc;

/// Declares a cheaply clonable string identifier.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(id: impl Into<Arc<str>>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s.into())
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.into())
            }
        }
    };
}

string_id! {
    /// An ID for a monitored waste bin.
    ///
    /// Assigned by the backend; any non-empty string is accepted.
    BinId
}

string_id! {
    /// An ID for a dashboard or field-worker account whose notifications are polled.
    UserId
}

string_id! {
    /// A server-assigned notification ID, the merge key for the local read state.
    NotificationId
}

string_id! {
    /// A server-assigned ID for an activity log (pickup task) record.
    ActivityLogId
}
