//! TemperatureMeasurement cluster (0x0402).
//!
//! Values are in hundredths of a degree Celsius.

use super::super::metadata::ClusterDescriptor;
use strum::FromRepr;

/// Matter Cluster ID for TemperatureMeasurement
pub const CLUSTER_ID: u32 = 0x0402;

/// Cluster revision
pub const CLUSTER_REVISION: u16 = 4;

/// Attribute IDs for the TemperatureMeasurement cluster
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr)]
#[repr(u32)]
pub enum TemperatureMeasurementAttribute {
    /// Current temperature (centi-degrees)
    MeasuredValue = 0x0000,
    /// Lowest value the sensor can report
    MinMeasuredValue = 0x0001,
    /// Highest value the sensor can report
    MaxMeasuredValue = 0x0002,
    /// Measurement tolerance
    Tolerance = 0x0003,
}

pub fn descriptor() -> ClusterDescriptor {
    ClusterDescriptor::new(CLUSTER_ID, CLUSTER_REVISION).attributes(&[
        TemperatureMeasurementAttribute::MeasuredValue as u32,
        TemperatureMeasurementAttribute::MinMeasuredValue as u32,
        TemperatureMeasurementAttribute::MaxMeasuredValue as u32,
        TemperatureMeasurementAttribute::Tolerance as u32,
    ])
}
