//! Subscription max-interval negotiation.
//!
//! An intermittently connected device (ICD) sleeps for IdleModeDuration
//! between check-ins, so it aligns a subscription's max interval with its
//! wake-ups instead of honouring the requested ceiling verbatim. Always-on
//! devices use the requested ceiling.

use log::debug;

use crate::config::IcdConfig;

/// Publisher's own upper bound on a max interval, in seconds.
pub const SUBSCRIPTION_MAX_INTERVAL_PUBLISHER_LIMIT: u16 = 3600;

/// Choose the max interval for a subscription.
///
/// The min interval floor is never changed; only the max interval is
/// negotiated:
/// - start from the idle mode duration (or the ceiling when it is 0)
/// - when the floor is above it, round up to the next multiple of it
/// - a result beyond 16 bits falls back to the requested ceiling
/// - the result never exceeds `max(publisher limit, ceiling)`
pub fn negotiate_max_interval(
    min_interval_floor: u16,
    max_interval_ceiling: u16,
    idle_mode_duration_secs: u32,
) -> u16 {
    let mut decided = if idle_mode_duration_secs == 0 {
        u32::from(max_interval_ceiling)
    } else {
        idle_mode_duration_secs
    };

    let floor = u32::from(min_interval_floor);
    if decided > 0 && floor > decided {
        decided = floor.div_ceil(decided).saturating_mul(decided);
    }

    if decided > u32::from(u16::MAX) {
        decided = u32::from(max_interval_ceiling);
    }

    let maximum = u32::from(SUBSCRIPTION_MAX_INTERVAL_PUBLISHER_LIMIT.max(max_interval_ceiling));
    let decided = u16::try_from(decided.min(maximum)).unwrap_or(max_interval_ceiling);

    debug!(
        "Negotiated max interval {}s (floor {}s, ceiling {}s, idle {}s)",
        decided, min_interval_floor, max_interval_ceiling, idle_mode_duration_secs
    );
    decided
}

/// Max interval to grant under the device's ICD configuration.
pub fn max_interval_for(config: &IcdConfig, min_interval_floor: u16, max_interval_ceiling: u16) -> u16 {
    match config.idle_mode_duration_secs {
        Some(idle) => negotiate_max_interval(min_interval_floor, max_interval_ceiling, idle),
        None => max_interval_ceiling,
    }
}
