//! Duration formatting for call displays
//!
//! Two formats are in use and are deliberately kept apart:
//!
//! - [`format_duration`] for the live in-call timer: minutes and seconds only,
//!   so a long call reads `61m 1s`.
//! - [`format_duration_hms`] for aggregate views (talk time per agent, queue
//!   totals): switches to hours and minutes once past an hour.
//!
//! ```rust
//! use dialer_core::format::{format_duration, format_duration_hms};
//!
//! assert_eq!(format_duration(Some(3661)), "61m 1s");
//! assert_eq!(format_duration_hms(Some(3661)), "1h 1m");
//! ```

/// Format a live call duration as `"{s}s"` or `"{m}m {s}s"`
pub fn format_duration(seconds: Option<u64>) -> String {
    match seconds {
        None | Some(0) => "0s".to_string(),
        Some(s) if s < 60 => format!("{}s", s),
        Some(s) => format!("{}m {}s", s / 60, s % 60),
    }
}

/// Format an aggregate duration, hour-aware
pub fn format_duration_hms(seconds: Option<u64>) -> String {
    match seconds {
        None | Some(0) => "0s".to_string(),
        Some(s) if s < 60 => format!("{}s", s),
        Some(s) if s < 3600 => format!("{}m {}s", s / 60, s % 60),
        Some(s) => format!("{}h {}m", s / 3600, (s % 3600) / 60),
    }
}
