//! Document decoding shared by every loader.

use serde::de::DeserializeOwned;

/// Parse `text` as JSON, falling back to YAML.
///
/// Both parser errors are kept in the message so a broken file of either
/// format is diagnosable.
pub fn parse_document<T: DeserializeOwned>(text: &str) -> anyhow::Result<T> {
    match serde_json::from_str(text) {
        Ok(v) => Ok(v),
        Err(json_err) => serde_yaml::from_str(text)
            .map_err(|yaml_err| anyhow::anyhow!("neither JSON ({json_err}) nor YAML ({yaml_err})")),
    }
}
