//! GenericSwitch cluster (0x003B).
//!
//! The GenericSwitch cluster represents a physical switch/button that can emit events.
//!
//! ## Features Supported
//! - Momentary Switch (MS) - Button that returns to default position when released
//! - Momentary Switch Release (MSR) - Generates events on button release
//! - Momentary Switch Multi Press (MSM) - Multi-press detection
//!
//! ## Events
//! - InitialPress (0x01) - Button pressed down
//! - ShortRelease (0x03) - Button released after short press
//! - MultiPressComplete (0x06) - Multi-press sequence completed

use super::super::metadata::ClusterDescriptor;
use super::super::value::Value;
use strum::FromRepr;

/// Matter Cluster ID for GenericSwitch
pub const CLUSTER_ID: u32 = 0x003B;

/// Cluster revision
pub const CLUSTER_REVISION: u16 = 2;

/// Feature flags for GenericSwitch
pub mod features {
    /// Latching Switch feature (LS)
    pub const LATCHING_SWITCH: u32 = 0x01;
    /// Momentary Switch feature (MS)
    pub const MOMENTARY_SWITCH: u32 = 0x02;
    /// Momentary Switch Release feature (MSR)
    pub const MOMENTARY_SWITCH_RELEASE: u32 = 0x04;
    /// Momentary Switch Long Press feature (MSL)
    pub const MOMENTARY_SWITCH_LONG_PRESS: u32 = 0x08;
    /// Momentary Switch Multi Press feature (MSM)
    pub const MOMENTARY_SWITCH_MULTI_PRESS: u32 = 0x10;
}

/// Attribute IDs for the GenericSwitch cluster
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr)]
#[repr(u32)]
pub enum GenericSwitchAttribute {
    /// Number of switch positions (always 2 for momentary)
    NumberOfPositions = 0x0000,
    /// Current switch position (0 = released, 1 = pressed)
    CurrentPosition = 0x0001,
    /// Maximum number of presses in a multi-press sequence
    MultiPressMax = 0x0002,
}

/// GenericSwitch event IDs
pub mod events {
    /// Button was initially pressed down
    pub const INITIAL_PRESS: u32 = 0x01;
    /// Button was released after being held for a long time
    pub const LONG_PRESS: u32 = 0x02;
    /// Button was released after a short press
    pub const SHORT_RELEASE: u32 = 0x03;
    /// Button was released after a long press
    pub const LONG_RELEASE: u32 = 0x04;
    /// Multi-press sequence is ongoing
    pub const MULTI_PRESS_ONGOING: u32 = 0x05;
    /// Multi-press sequence completed
    pub const MULTI_PRESS_COMPLETE: u32 = 0x06;
}

pub fn descriptor() -> ClusterDescriptor {
    ClusterDescriptor::new(CLUSTER_ID, CLUSTER_REVISION)
        // MS (0x02) + MSR (0x04) + MSM (0x10) = 0x16
        .feature_map(
            features::MOMENTARY_SWITCH
                | features::MOMENTARY_SWITCH_RELEASE
                | features::MOMENTARY_SWITCH_MULTI_PRESS,
        )
        .attributes(&[
            GenericSwitchAttribute::NumberOfPositions as u32,
            GenericSwitchAttribute::CurrentPosition as u32,
            GenericSwitchAttribute::MultiPressMax as u32,
        ])
        .events(&[
            events::INITIAL_PRESS,
            events::SHORT_RELEASE,
            events::MULTI_PRESS_COMPLETE,
        ])
}

/// InitialPress event payload.
pub fn initial_press(new_position: u8) -> Value {
    Value::Struct(vec![(0, new_position.into())])
}

/// ShortRelease event payload.
pub fn short_release(previous_position: u8) -> Value {
    Value::Struct(vec![(0, previous_position.into())])
}

/// MultiPressComplete event payload.
pub fn multi_press_complete(previous_position: u8, total_number_of_presses_counted: u8) -> Value {
    Value::Struct(vec![
        (0, previous_position.into()),
        (1, total_number_of_presses_counted.into()),
    ])
}
