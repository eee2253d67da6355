pub mod bin_context;
pub mod bin_map;
pub mod classify;
pub mod config;
pub mod elapsed;
pub mod ids;
pub mod lifecycle;
pub mod model;
pub mod notification_context;
pub mod poller;
pub mod position;
pub mod resolver;
pub mod source;
pub mod state_machine;

pub use bin_context::BinContext;
pub use bin_map::BinMap;
pub use config::MonitorConfig;
pub use ids::{ActivityLogId, BinId, NotificationId, UserId};
pub use lifecycle::{AppVisibility, HostLifecycle};
pub use notification_context::NotificationContext;
pub use poller::error::FetchFailure;
pub use poller::{NotificationPoller, PollSessionId, TelemetryPoller};
pub use source::{HttpApi, SourceError};

/// Path segment for a single bin's latest reading: `GET {base}/bin/{binId}`.
pub const BIN_SEGMENT: &str = "bin";

/// Path segment for a user's notifications: `GET {base}/notifications/{userId}`.
pub const NOTIFICATIONS_SEGMENT: &str = "notifications";

/// Path segment for pickup tasks: `GET {base}/activity-logs`, `PUT {base}/activity-logs/{id}`.
pub const ACTIVITY_LOGS_SEGMENT: &str = "activity-logs";
