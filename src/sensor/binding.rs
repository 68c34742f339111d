//! Identity of a calibrated sensor
//!
//! Derives the output entity id, unique id and display name from the source
//! entity and the optional user overrides.

use crate::config::SensorEntry;
use crate::host::{DeviceLink, SourceState};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Integration domain, used as the unique id prefix
pub const DOMAIN: &str = "auto_calibrate";

/// Entity domain of the calibrated outputs
pub const OUTPUT_DOMAIN: &str = "sensor";

/// Appended to the source's local id when no object id override is given
pub const OBJECT_ID_SUFFIX: &str = "_calibrated";

static NON_SLUG_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug pattern"));

/// Immutable link between one calibration state and its upstream source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBinding {
    /// Upstream entity, e.g. `sensor.soil_sensor`
    pub source_entity: String,
    /// Display name of the calibrated entity
    pub name: String,
    /// Object id of the calibrated entity, e.g. `soil_sensor_calibrated`
    pub object_id: String,
    /// Host-visible id of the calibrated entity, e.g. `sensor.soil_sensor_calibrated`
    pub entity_id: String,
    /// Stable id that survives renames
    pub unique_id: String,
    /// Device shared with the source entity
    pub device: Option<DeviceLink>,
}

impl SourceBinding {
    /// Resolve identity from the source id, overrides and the source's
    /// current state (for its friendly name and device).
    pub fn new(
        source_entity: &str,
        name_override: Option<&str>,
        object_id_override: Option<&str>,
        source: Option<&SourceState>,
    ) -> Self {
        let object_id = derive_object_id(source_entity, object_id_override);
        let device = source
            .and_then(|s| s.device.clone())
            .filter(|d| !d.is_empty());

        Self {
            source_entity: source_entity.to_string(),
            name: display_name(source_entity, name_override, source),
            entity_id: format!("{}.{}", OUTPUT_DOMAIN, object_id),
            object_id,
            unique_id: unique_id(source_entity),
            device,
        }
    }

    /// Resolve identity for a configured entry.
    ///
    /// A device stored on the entry wins over the one the source reports.
    pub fn from_entry(entry: &SensorEntry, source: Option<&SourceState>) -> Self {
        let mut binding = Self::new(
            &entry.source_entity,
            entry.name.as_deref(),
            entry.object_id.as_deref(),
            source,
        );
        if let Some(device) = entry.device.as_ref().filter(|d| !d.is_empty()) {
            binding.device = Some(device.clone());
        }
        binding
    }
}

/// Source entity id without its domain prefix
pub fn local_id(source_entity: &str) -> &str {
    source_entity
        .split_once('.')
        .map_or(source_entity, |(_, id)| id)
}

/// Unique id of the calibrated entity for a source
pub fn unique_id(source_entity: &str) -> String {
    format!("{}_{}", DOMAIN, source_entity)
}

/// Object id: the slugified override when usable, otherwise
/// `<local id>_calibrated`.
pub fn derive_object_id(source_entity: &str, object_id_override: Option<&str>) -> String {
    object_id_override
        .map(slugify)
        .filter(|slug| !slug.is_empty())
        .unwrap_or_else(|| format!("{}{}", local_id(source_entity), OBJECT_ID_SUFFIX))
}

/// Display name: explicit override, then the source's friendly name, then
/// the title-cased local id.
pub fn display_name(
    source_entity: &str,
    name_override: Option<&str>,
    source: Option<&SourceState>,
) -> String {
    if let Some(name) = name_override.map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }

    if let Some(friendly) = source
        .and_then(|s| s.friendly_name.as_deref())
        .filter(|n| !n.is_empty())
    {
        return friendly.to_string();
    }

    title_case(&local_id(source_entity).replace('_', " "))
}

/// Lowercase, collapse every run of non-alphanumerics to `_`, trim `_`
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    NON_SLUG_CHARS
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_id() {
        assert_eq!(local_id("sensor.soil_sensor"), "soil_sensor");
        assert_eq!(local_id("sensor.garden.bed"), "garden.bed");
        assert_eq!(local_id("no_domain"), "no_domain");
    }

    #[test]
    fn test_default_object_id() {
        assert_eq!(
            derive_object_id("sensor.soil_sensor", None),
            "soil_sensor_calibrated"
        );
        assert_eq!(
            derive_object_id("sensor.soil_sensor", Some("   ")),
            "soil_sensor_calibrated"
        );
        assert_eq!(
            derive_object_id("sensor.soil_sensor", Some("!!!")),
            "soil_sensor_calibrated"
        );
    }

    #[test]
    fn test_object_id_override_is_slugified() {
        assert_eq!(
            derive_object_id("sensor.soil_sensor", Some("Front Lawn Moisture")),
            "front_lawn_moisture"
        );
        assert_eq!(slugify("  Bed #2 -- West "), "bed_2_west");
    }

    #[test]
    fn test_display_name_precedence() {
        let source = SourceState::new("512").with_friendly_name("Garden Sensor");

        assert_eq!(
            display_name("sensor.soil_sensor", Some(" My Plant "), Some(&source)),
            "My Plant"
        );
        assert_eq!(
            display_name("sensor.soil_sensor", None, Some(&source)),
            "Garden Sensor"
        );
        assert_eq!(
            display_name("sensor.soil_sensor", Some(""), None),
            "Soil Sensor"
        );
        assert_eq!(display_name("sensor.ADC_raw_2", None, None), "Adc Raw 2");
    }

    #[test]
    fn test_binding() {
        let device = DeviceLink {
            identifiers: vec![("esphome".to_string(), "garden-node".to_string())],
            connections: vec![],
        };
        let source = SourceState::new("300").with_device(device.clone());
        let binding = SourceBinding::new("sensor.soil_sensor", None, None, Some(&source));

        assert_eq!(binding.entity_id, "sensor.soil_sensor_calibrated");
        assert_eq!(binding.object_id, "soil_sensor_calibrated");
        assert_eq!(binding.unique_id, "auto_calibrate_sensor.soil_sensor");
        assert_eq!(binding.name, "Soil Sensor");
        assert_eq!(binding.device, Some(device));
    }
}
