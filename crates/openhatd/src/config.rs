//! The daemon's TOML configuration file.
//!
//! The `[General]` table holds the daemon settings. Every other top-level
//! table is a node; its `Type` key selects the node type. Nested tables
//! and arrays are flattened into the dotted `key = value` form the port
//! configuration reads:
//!
//! ```toml
//! [General]
//! TargetFPS = 20
//!
//! [Window]
//! Type = "Window"
//! ErrorPorts = ["Alarm", "Buzzer"]
//!
//! [Window.Labels]
//! Off = 0
//! Closed = 1
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use openhat_core::ConfigView;
use toml::{Table, Value};

pub const GENERAL_SECTION: &str = "General";

pub struct NodeSection {
    pub id: String,
    pub config: ConfigView,
}

impl NodeSection {
    pub fn node_type(&self) -> openhat_core::Result<String> {
        self.config.get_string("Type", "", true)
    }
}

pub struct DaemonConfig {
    pub general: ConfigView,
    /// Nodes in file order.
    pub nodes: Vec<NodeSection>,
}

impl DaemonConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Unable to read configuration file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid configuration file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let table: Table = text.parse()?;
        let mut general = BTreeMap::new();
        let mut nodes = Vec::new();
        for (id, value) in table {
            let Value::Table(section) = value else {
                bail!("Top-level key {id} must be a table");
            };
            let mut values = BTreeMap::new();
            flatten("", section, &mut values)?;
            if id == GENERAL_SECTION {
                general = values;
            } else {
                nodes.push(NodeSection {
                    config: ConfigView::new(id.clone(), values),
                    id,
                });
            }
        }
        Ok(Self {
            general: ConfigView::new(GENERAL_SECTION, general),
            nodes,
        })
    }
}

fn flatten(prefix: &str, table: Table, out: &mut BTreeMap<String, String>) -> Result<()> {
    for (key, value) in table {
        let key = if prefix.is_empty() {
            key
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Table(nested) => flatten(&key, nested, out)?,
            other => {
                let text = scalar_text(&key, other)?;
                out.insert(key, text);
            }
        }
    }
    Ok(())
}

/// Arrays become space-separated lists, as port lists are written.
fn scalar_text(key: &str, value: Value) -> Result<String> {
    Ok(match value {
        Value::String(s) => s,
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Datetime(d) => d.to_string(),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Array(_) => bail!("{key}: Nested lists are not supported"),
                scalar => scalar_text(key, scalar),
            })
            .collect::<Result<Vec<_>>>()?
            .join(" "),
        Value::Table(_) => bail!("{key}: Tables are not supported in lists"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    const SAMPLE: &str = r#"
[General]
TargetFPS = 25
LogVerbosity = "Verbose"

[Window]
Type = "Window"
OpeningTime = 1500
ErrorPorts = ["Alarm", "Buzzer"]

[Window.Labels]
Off = 0
Closed = 1

[Alarm]
Type = "DigitalPort"
Readonly = false
"#;

    #[test]
    fn test_nodes_keep_file_order() {
        let config = DaemonConfig::parse(SAMPLE).unwrap();
        let ids: Vec<&str> = config.nodes.iter().map(|node| node.id.as_str()).collect();
        assert_eq!(ids, vec!["Window", "Alarm"]);
        assert_eq!(config.nodes[0].node_type().unwrap(), "Window");
        assert_eq!(config.general.get_int("TargetFPS", 0, true).unwrap(), 25);
    }

    #[test]
    fn test_nested_values_are_flattened() {
        let config = DaemonConfig::parse(SAMPLE).unwrap();
        let window = &config.nodes[0].config;
        assert_eq!(window.get_string("ErrorPorts", "", true).unwrap(), "Alarm Buzzer");
        assert_eq!(window.section("Labels").get_int("Closed", -1, true).unwrap(), 1);
        assert_eq!(window.get_int64("OpeningTime", 0, true).unwrap(), 1500);
        assert!(!config.nodes[1].config.get_bool("Readonly", true, true).unwrap());
    }

    #[rstest]
    #[case::scalar_at_top("Type = \"Window\"")]
    #[case::nested_list("[Node]\nPorts = [[\"A\"]]")]
    #[case::malformed("[Node")]
    fn test_rejects_invalid_files(#[case] text: &str) {
        assert!(DaemonConfig::parse(text).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = DaemonConfig::load(file.path()).unwrap();
        assert_eq!(config.nodes.len(), 2);

        assert!(DaemonConfig::load(Path::new("/nonexistent/openhat.toml")).is_err());
    }

    #[test]
    fn test_missing_general_section_is_empty() {
        let config = DaemonConfig::parse("[Node]\nType = \"DigitalPort\"").unwrap();
        assert_eq!(config.general.get_int("TargetFPS", 20, false).unwrap(), 20);
    }
}
