use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;

/// Reads a config from a `.yaml`/`.yml` or `.json` file, picked by extension.
pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let buffer = std::fs::read(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_slice(&buffer)
            .with_context(|| format!("invalid yaml config {}", path.display())),
        Some("json") => serde_json::from_slice(&buffer)
            .with_context(|| format!("invalid json config {}", path.display())),
        _ => bail!("unsupported config file extension: {}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_config::{IndexConfig, IvfConfig};
    use crate::search_params::PruningParams;

    #[test]
    fn test_load_yaml_and_json() {
        let temp_dir = tempdir::TempDir::new("config_loader_test").unwrap();

        let yaml_path = temp_dir.path().join("index.yaml");
        std::fs::write(&yaml_path, "index_type: Ivf\nnum_features: 8\nnum_lists: 10\n").unwrap();
        let config: IndexConfig = load_config(&yaml_path).unwrap();
        assert_eq!(
            config,
            IndexConfig::Ivf(IvfConfig {
                num_features: 8,
                num_lists: 10,
                ..Default::default()
            })
        );

        let json_path = temp_dir.path().join("pruning.json");
        std::fs::write(&json_path, "{\"cut\": 2, \"window_offset\": 1.5}").unwrap();
        let params: PruningParams = load_config(&json_path).unwrap();
        assert_eq!(params.cut, 2);
        assert_eq!(params.window_offset, 1.5);
        assert_eq!(params.num_segments, 20);
    }

    #[test]
    fn test_load_errors() {
        let temp_dir = tempdir::TempDir::new("config_loader_test").unwrap();
        let missing = temp_dir.path().join("missing.yaml");
        assert!(load_config::<IvfConfig>(&missing).is_err());

        let txt = temp_dir.path().join("config.txt");
        std::fs::write(&txt, "num_lists: 10").unwrap();
        assert!(load_config::<IvfConfig>(&txt).is_err());
    }
}
