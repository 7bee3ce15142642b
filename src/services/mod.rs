//! Services layer - Business logic
//!
//! Session accounting and the read-only reports built on top of the
//! repositories. Services are responsible for:
//! - Enforcing the one-open-session rule and the daily quota
//! - Bucketing playtime by UTC calendar day
//! - Mapping store outcomes to typed errors

pub mod clock;
pub mod open_session_guard;
pub mod player;
pub mod quota;
pub mod session_accounting;
pub mod session_queries;
pub mod time_accounting;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{Clock, DynClock, FixedClock, SystemClock};
pub use open_session_guard::{OpenSessionGuard, OpenSessions};
pub use player::{PlayerService, PlayerServiceError};
pub use quota::exceeds_quota;
pub use session_accounting::{SessionAccountingService, SessionServiceError};
pub use session_queries::{SessionQueryError, SessionQueryService};
pub use time_accounting::{
    day_bounds, end_of_day, is_same_calendar_day, minutes_between, parse_day, start_of_day,
    InvalidDay,
};
