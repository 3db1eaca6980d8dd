//! `datalink-activity`: the activity (audit / data-change) log.
//!
//! Entries are written after successful mutations and rendered for the
//! dashboard feed with an icon, a color and a relative timestamp.

pub mod entry;
pub mod time;

pub use entry::{
    ActionType, Activity, ActivityFilter, ActivityView, Actor, DataChange, MAX_WINDOW_DAYS, NewActivity, validate_window,
};
pub use time::relative_time;
