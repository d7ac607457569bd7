//! Rendering of a [`Resolution`]
//!
//! YAML keeps the "no origin" key as a real YAML `null`. JSON object keys
//! must be strings, so there it becomes the string `"null"`.

use crate::config::OutputFormat;
use crate::error::OutputError;
use crate::walker::Resolution;
use serde_json::{Map, Value};

/// Render a resolution in the requested format, newline-terminated
pub fn render(resolution: &Resolution, format: OutputFormat) -> Result<String, OutputError> {
    let mut text = match format {
        OutputFormat::Yaml => to_yaml(resolution)?,
        OutputFormat::Json => to_json(resolution)?,
    };
    if !text.ends_with('\n') {
        text.push('\n');
    }
    Ok(text)
}

pub fn to_yaml(resolution: &Resolution) -> Result<String, OutputError> {
    Ok(serde_yaml::to_string(resolution)?)
}

pub fn to_json(resolution: &Resolution) -> Result<String, OutputError> {
    Ok(serde_json::to_string_pretty(&to_json_value(resolution))?)
}

/// Convert to a JSON value with string keys throughout
pub fn to_json_value(resolution: &Resolution) -> Value {
    let mut objects = Map::new();

    for (object, table) in resolution {
        let mut protocols = Map::new();
        for (protocol, by_origin) in table {
            let origins: Map<String, Value> = by_origin
                .iter()
                .map(|(origin, prefixes)| {
                    let key = origin.clone().unwrap_or_else(|| "null".to_string());
                    let prefixes = prefixes.iter().cloned().map(Value::String).collect();
                    (key, Value::Array(prefixes))
                })
                .collect();
            protocols.insert(protocol.to_string(), Value::Object(origins));
        }
        objects.insert(object.clone(), Value::Object(protocols));
    }

    Value::Object(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irr::Protocol;
    use crate::query::{OriginMap, RouteTable};
    use serde_json::json;

    fn route_set() -> Resolution {
        let mut ipv4 = OriginMap::new();
        ipv4.insert(None, ["192.0.2.0/24".to_string()].into_iter().collect());
        let mut ipv6 = OriginMap::new();
        ipv6.insert(None, Default::default());

        let mut table = RouteTable::new();
        table.insert(Protocol::Ipv4, ipv4);
        table.insert(Protocol::Ipv6, ipv6);

        let mut resolution = Resolution::new();
        resolution.insert("RS-X".to_string(), table);
        resolution.insert("INVALID".to_string(), RouteTable::new());
        resolution
    }

    #[test]
    fn test_yaml_keeps_null_origin() {
        let yaml = to_yaml(&route_set()).unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

        let ipv4 = &parsed["RS-X"]["ipv4"];
        let prefixes = ipv4
            .as_mapping()
            .and_then(|m| m.get(serde_yaml::Value::Null))
            .and_then(|v| v.as_sequence())
            .unwrap();
        assert_eq!(prefixes.len(), 1);
        assert_eq!(prefixes[0].as_str(), Some("192.0.2.0/24"));
        assert!(parsed["INVALID"].as_mapping().unwrap().is_empty());
    }

    #[test]
    fn test_json_value() {
        assert_eq!(
            to_json_value(&route_set()),
            json!({
                "RS-X": {
                    "ipv4": { "null": ["192.0.2.0/24"] },
                    "ipv6": { "null": [] }
                },
                "INVALID": {}
            })
        );
    }

    #[test]
    fn test_render_ends_with_newline() {
        let text = render(&Resolution::new(), OutputFormat::Json).unwrap();
        assert_eq!(text, "{}\n");
    }
}
