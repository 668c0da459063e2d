//! Simple configuration file manager

use serde::{Deserialize, Serialize};
use serde_yaml;
use std::collections::HashMap;

/// Definition of all size filters
#[derive(Deserialize, Serialize)]
pub struct Configuration {
    pub filters: Vec<HashMap<String, FilterDefinition>>,
}

/// Properties of one size filter
#[derive(Deserialize, Serialize)]
pub struct FilterDefinition {
    pub iface: Vec<String>,
    #[serde(default)]
    pub direction: Direction,
    /// match options, e.g. ["--size", "80:120"]
    pub matches: Vec<String>,
    #[serde(default)]
    pub target: TargetDefinition,
}

/// Traffic direction the classifier is attached to
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ingress,
    #[default]
    Egress,
}

/// Action for packets matching the filter
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TargetDefinition {
    Accept,
    #[default]
    Drop,
}

/// Load configuration for the filter
///
/// # Arguments
/// * `path` - path to configuration file
///
/// Returns the configuration [`Configuration`] or an error ([`std::error::Error`]). Fails if the file cannot be opened or parsed
///
pub fn load_config(path: &str) -> Result<Configuration, Box<dyn std::error::Error>> {
    let f = std::fs::File::open(path).map_err(|err| format!("Cannot open file: {}: {}", path, err))?;
    match serde_yaml::from_reader(f) {
        Ok(conf) => Ok(conf),
        Err(err) => Err(Box::new(err)),
    }
}

/// Parses a configuration from a string
pub fn parse_config(content: &str) -> Result<Configuration, serde_yaml::Error> {
    serde_yaml::from_str(content)
}

#[cfg(test)]
mod tests {
    use super::{Direction, TargetDefinition};

    #[test]
    fn test_parse_config() {
        let config = super::parse_config(
            r#"
filters:
  - small-udp:
      iface: [eth0, eth1]
      direction: ingress
      matches: ["--size", "80:120"]
      target: ACCEPT
  - tiny:
      iface: [eth0]
      matches: ["--size=0"]
"#,
        )
        .unwrap();
        assert_eq!(2, config.filters.len());
        let small_udp = &config.filters[0]["small-udp"];
        assert_eq!(vec!["eth0".to_string(), "eth1".to_string()], small_udp.iface);
        assert_eq!(Direction::Ingress, small_udp.direction);
        assert_eq!(TargetDefinition::Accept, small_udp.target);
        let tiny = &config.filters[1]["tiny"];
        assert_eq!(Direction::Egress, tiny.direction);
        assert_eq!(TargetDefinition::Drop, tiny.target);
    }

    #[test]
    fn test_parse_config_invalid_direction() {
        assert!(super::parse_config(
            "filters:\n  - f:\n      iface: [eth0]\n      direction: sideways\n      matches: []\n"
        )
        .is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = super::load_config("./does/not/exist.yml").err().unwrap();
        assert!(err.to_string().starts_with("Cannot open file: ./does/not/exist.yml"));
    }
}
