//! Compiles the configured filters into range records that can be installed into the classifier

use anyhow::Context;
use pktsize_common::{PktSizeInfo, PktSizeRule, Target, TrafficDirection, MAX_RULES, MAX_RULE_IFACES};

use crate::conf::{Configuration, Direction, TargetDefinition};
use crate::sizespec;

/// A validated size filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    pub id: u32,
    pub name: String,
    pub info: PktSizeInfo,
    pub target: Target,
    pub iface: Vec<String>,
    pub direction: Direction,
}

impl CompiledRule {
    /// Encoded value for the rule map of the classifier
    ///
    /// # Arguments
    /// * `ifindex` - kernel indexes of the interfaces in `iface`
    pub fn to_map_value(&self, ifindex: &[u32]) -> PktSizeRule {
        PktSizeRule::new(&self.info, self.target, to_direction(self.direction), ifindex)
    }

    /// e.g. "small-udp: size 80:120 -> DROP"
    pub fn describe(&self) -> String {
        format!(
            "{}: {}-> {}",
            self.name,
            sizespec::print_form(&self.info),
            target_name(self.target)
        )
    }

    /// e.g. "small-udp --size 80:120 -j DROP"
    pub fn save(&self) -> String {
        format!(
            "{} {}-j {}",
            self.name,
            sizespec::save_form(&self.info),
            target_name(self.target)
        )
    }
}

pub fn target_name(target: Target) -> &'static str {
    match target {
        Target::Accept => "ACCEPT",
        Target::Drop => "DROP",
    }
}

pub fn to_direction(direction: Direction) -> TrafficDirection {
    match direction {
        Direction::Ingress => TrafficDirection::Ingress,
        Direction::Egress => TrafficDirection::Egress,
    }
}

fn to_target(target: TargetDefinition) -> Target {
    match target {
        TargetDefinition::Accept => Target::Accept,
        TargetDefinition::Drop => Target::Drop,
    }
}

/// Validates all filters of a configuration
///
/// # Arguments
/// * `config` - loaded configuration
///
/// # Returns
/// The rules in configuration order, numbered from 0, or the first error found
pub fn compile(config: &Configuration) -> anyhow::Result<Vec<CompiledRule>> {
    let mut rules = Vec::new();
    for filter in &config.filters {
        // the order of names within one entry is not preserved, so each entry holds exactly one filter
        if filter.len() != 1 {
            return Err(anyhow::anyhow!(
                "Each filter list entry must contain exactly one filter, found {}",
                filter.len()
            ));
        }
        for (name, definition) in filter {
            if rules.len() == MAX_RULES as usize {
                return Err(anyhow::anyhow!(
                    "Too many size filters. Maximum {}",
                    MAX_RULES
                ));
            }
            if definition.iface.is_empty() || definition.iface.len() > MAX_RULE_IFACES {
                return Err(anyhow::anyhow!(
                    "Size filter {} needs between 1 and {} interfaces",
                    name,
                    MAX_RULE_IFACES
                ));
            }
            let info = sizespec::parse_options(definition.matches.as_slice())
                .with_context(|| format!("Invalid size filter {}", name))?;
            rules.push(CompiledRule {
                id: rules.len() as u32,
                name: name.clone(),
                info,
                target: to_target(definition.target),
                iface: definition.iface.clone(),
                direction: definition.direction,
            });
        }
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use pktsize_common::{PktSizeInfo, Target, TrafficDirection};

    use crate::conf;
    use crate::sizespec::SizeSpecError;

    #[test]
    fn test_compile() {
        let config = conf::parse_config(
            r#"
filters:
  - small:
      iface: [eth0]
      matches: ["--size", "65"]
  - medium:
      iface: [eth0]
      direction: ingress
      matches: ["--size", "80:120"]
      target: ACCEPT
"#,
        )
        .unwrap();
        let rules = super::compile(&config).unwrap();
        assert_eq!(2, rules.len());
        assert_eq!(0, rules[0].id);
        assert_eq!(PktSizeInfo::exact(65), rules[0].info);
        assert_eq!(Target::Drop, rules[0].target);
        assert_eq!(1, rules[1].id);
        assert_eq!(Target::Accept, rules[1].target);
        assert_eq!("small: size 65 -> DROP", rules[0].describe());
        assert_eq!("medium --size 80:120 -j ACCEPT", rules[1].save());
        let value = rules[1].to_map_value(&[2]);
        assert_eq!(Some(rules[1].info), value.record());
        assert!(value.applies_to(2, TrafficDirection::Ingress));
        assert_eq!(false, value.applies_to(2, TrafficDirection::Egress));
    }

    #[test]
    fn test_compile_shipped_configuration() {
        let config = conf::load_config(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../conf/pktsize-filter.yml"
        ))
        .unwrap();
        let rules = super::compile(&config).unwrap();
        let saved: Vec<String> = rules.iter().map(|rule| rule.save()).collect();
        assert_eq!(
            vec![
                "drop-65 --size 65 -j DROP".to_string(),
                "small --size 80:120 -j ACCEPT".to_string(),
                "large --size 1400:65535 -j DROP".to_string(),
            ],
            saved
        );
    }

    #[test]
    fn test_compile_reports_filter_name() {
        let config = conf::parse_config(
            "filters:\n  - broken:\n      iface: [eth0]\n      matches: [\"--size\", \"120:80\"]\n",
        )
        .unwrap();
        let err = super::compile(&config).unwrap_err();
        assert_eq!("Invalid size filter broken", err.to_string());
        assert_eq!(
            Some(&SizeSpecError::RangeInverted { min: 120, max: 80 }),
            err.downcast_ref::<SizeSpecError>()
        );
    }

    #[test]
    fn test_compile_missing_size() {
        let config =
            conf::parse_config("filters:\n  - empty:\n      iface: [eth0]\n      matches: []\n")
                .unwrap();
        let err = super::compile(&config).unwrap_err();
        assert_eq!(
            Some(&SizeSpecError::MissingSpecification),
            err.downcast_ref::<SizeSpecError>()
        );
    }

    #[test]
    fn test_compile_rejects_several_filters_per_entry() {
        let config = conf::parse_config(
            r#"
filters:
  - a:
      iface: [eth0]
      matches: ["--size", "65"]
    b:
      iface: [eth0]
      matches: ["--size", "80:120"]
"#,
        )
        .unwrap();
        assert_eq!(
            "Each filter list entry must contain exactly one filter, found 2",
            super::compile(&config).unwrap_err().to_string()
        );
    }

    #[test]
    fn test_compile_rule_order_follows_list() {
        let mut content = "filters:\n".to_string();
        for name in ["c", "a", "b"] {
            content.push_str(&format!(
                "  - {}:\n      iface: [eth0]\n      matches: [\"--size\", \"65\"]\n",
                name
            ));
        }
        let config = conf::parse_config(&content).unwrap();
        let names: Vec<String> = super::compile(&config)
            .unwrap()
            .into_iter()
            .map(|rule| rule.name)
            .collect();
        assert_eq!(vec!["c", "a", "b"], names);
    }

    #[test]
    fn test_compile_interface_count() {
        let config = conf::parse_config(
            "filters:\n  - wide:\n      iface: [a, b, c, d, e]\n      matches: [\"--size\", \"65\"]\n",
        )
        .unwrap();
        assert_eq!(
            "Size filter wide needs between 1 and 4 interfaces",
            super::compile(&config).unwrap_err().to_string()
        );
    }

    #[test]
    fn test_compile_too_many_rules() {
        let mut content = "filters:\n".to_string();
        for i in 0..=pktsize_common::MAX_RULES {
            content.push_str(&format!(
                "  - f{}:\n      iface: [eth0]\n      matches: [\"--size\", \"{}\"]\n",
                i, i
            ));
        }
        let config = conf::parse_config(&content).unwrap();
        assert_eq!(
            "Too many size filters. Maximum 16",
            super::compile(&config).unwrap_err().to_string()
        );
    }
}
