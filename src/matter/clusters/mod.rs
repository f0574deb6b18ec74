//! Cluster definitions for the simulated bridge device.
//!
//! Each submodule carries the cluster's ids and a [`ClusterDescriptor`]
//! builder; [`bridge_data_model`] assembles them into a populated node.
//!
//! [`ClusterDescriptor`]: super::metadata::ClusterDescriptor

use log::warn;

use super::data_model::MemoryDataModel;
use super::ids::EndpointId;
use super::metadata::{EndpointDescriptor, NodeDescriptor};
use super::path::ConcreteAttributePath;
use super::value::Value;

pub mod boolean_state;
pub mod generic_switch;
pub mod icd_mgmt;
pub mod temperature_measurement;

pub const ROOT_ENDPOINT: EndpointId = 0;
pub const CONTACT_SENSOR_ENDPOINT: EndpointId = 1;
pub const TEMPERATURE_SENSOR_ENDPOINT: EndpointId = 2;
pub const SWITCH_ENDPOINT: EndpointId = 3;

/// Root endpoint with ICD Management plus one endpoint per bridged device.
pub fn bridge_node() -> NodeDescriptor {
    NodeDescriptor::new()
        .endpoint(EndpointDescriptor::new(ROOT_ENDPOINT).cluster(icd_mgmt::descriptor()))
        .endpoint(
            EndpointDescriptor::new(CONTACT_SENSOR_ENDPOINT).cluster(boolean_state::descriptor()),
        )
        .endpoint(
            EndpointDescriptor::new(TEMPERATURE_SENSOR_ENDPOINT)
                .cluster(temperature_measurement::descriptor()),
        )
        .endpoint(EndpointDescriptor::new(SWITCH_ENDPOINT).cluster(generic_switch::descriptor()))
}

/// Bridge node populated with initial sensor values.
pub fn bridge_data_model(idle_mode_duration_secs: Option<u32>) -> MemoryDataModel {
    use generic_switch::GenericSwitchAttribute as Switch;
    use icd_mgmt::IcdMgmtAttribute as Icd;
    use temperature_measurement::TemperatureMeasurementAttribute as Temperature;

    let mut model = MemoryDataModel::new(bridge_node());
    let initial: [(EndpointId, u32, u32, Value); 11] = [
        (
            ROOT_ENDPOINT,
            icd_mgmt::CLUSTER_ID,
            Icd::IdleModeDuration as u32,
            idle_mode_duration_secs
                .unwrap_or(icd_mgmt::ALWAYS_ON_IDLE_MODE_DURATION_SECS)
                .into(),
        ),
        (
            ROOT_ENDPOINT,
            icd_mgmt::CLUSTER_ID,
            Icd::ActiveModeDuration as u32,
            icd_mgmt::ALWAYS_ON_ACTIVE_MODE_DURATION_MS.into(),
        ),
        (
            ROOT_ENDPOINT,
            icd_mgmt::CLUSTER_ID,
            Icd::ActiveModeThreshold as u32,
            icd_mgmt::ALWAYS_ON_ACTIVE_MODE_THRESHOLD_MS.into(),
        ),
        (
            CONTACT_SENSOR_ENDPOINT,
            boolean_state::CLUSTER_ID,
            boolean_state::BooleanStateAttribute::StateValue as u32,
            false.into(),
        ),
        (
            TEMPERATURE_SENSOR_ENDPOINT,
            temperature_measurement::CLUSTER_ID,
            Temperature::MeasuredValue as u32,
            2150i16.into(),
        ),
        (
            TEMPERATURE_SENSOR_ENDPOINT,
            temperature_measurement::CLUSTER_ID,
            Temperature::MinMeasuredValue as u32,
            (-4000i16).into(),
        ),
        (
            TEMPERATURE_SENSOR_ENDPOINT,
            temperature_measurement::CLUSTER_ID,
            Temperature::MaxMeasuredValue as u32,
            8500i16.into(),
        ),
        (
            TEMPERATURE_SENSOR_ENDPOINT,
            temperature_measurement::CLUSTER_ID,
            Temperature::Tolerance as u32,
            50u16.into(),
        ),
        (
            SWITCH_ENDPOINT,
            generic_switch::CLUSTER_ID,
            Switch::NumberOfPositions as u32,
            2u8.into(),
        ),
        (
            SWITCH_ENDPOINT,
            generic_switch::CLUSTER_ID,
            Switch::CurrentPosition as u32,
            0u8.into(),
        ),
        (
            SWITCH_ENDPOINT,
            generic_switch::CLUSTER_ID,
            Switch::MultiPressMax as u32,
            2u8.into(),
        ),
    ];

    for (endpoint, cluster, attribute, value) in initial {
        let path = ConcreteAttributePath::new(endpoint, cluster, attribute);
        if let Err(status) = model.set_attribute(path, value) {
            warn!("Failed to initialize {}: {}", path, status);
        }
    }
    model
}
