//! HTTP API for the analytics engine
//!
//! Read endpoints follow the always-succeed policy: they return degraded
//! (zero/default) data rather than errors, so dashboards never need an
//! error path per render. The participation endpoint is the exception --
//! it surfaces a 503 when the backing store is unreachable, because the
//! primary write must fail loudly rather than silently drop the event.

pub mod health;
pub mod participation;
pub mod poll;
pub mod summary;
pub mod user;

pub use health::health_routes;
pub use participation::record_participation;
pub use poll::{get_bot_risk, get_poll_analytics};
pub use summary::get_dashboard_summary;
pub use user::get_user_analytics;
