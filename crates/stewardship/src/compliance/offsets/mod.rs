//! Offset mechanisms that reduce or satisfy a community's site requirement.

pub mod direct;
pub mod events;

pub use direct::{direct_offset_adjustments, DirectOffsetAdjustment, DirectOffsetConfig};
pub use events::{
    EventApplicationOutcome, EventBulkOutcome, EventCommunityState, EventOffsetError,
    EventOffsetLedger, EventOffsetOverview,
};

/// Reduce a requirement by a percentage without ever eliminating a positive
/// requirement. The percentage is expected to be clamped by the caller.
pub fn apply_offset(required: u32, percentage: f64) -> u32 {
    if required == 0 {
        return 0;
    }
    if percentage.is_nan() {
        return required;
    }

    let remaining = f64::from(required) * (100.0 - percentage) / 100.0;
    let rounded = remaining.ceil();
    if rounded < 1.0 {
        1
    } else {
        rounded as u32
    }
}

/// Clamp a user-supplied percentage into `[0, 100]`; non-finite input counts as 0.
pub fn clamp_percentage(percentage: f64) -> f64 {
    if percentage.is_finite() {
        percentage.clamp(0.0, 100.0)
    } else {
        0.0
    }
}
