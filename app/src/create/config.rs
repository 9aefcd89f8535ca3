/*++

Licensed under the Apache-2.0 license.

File Name:

   config.rs

Abstract:

    File contains utilities for parsing the input configuration file.

--*/

use anyhow::Context;
use serde_derive::{Deserialize, Serialize};
use std::path::PathBuf;

/// Input Configuration: paths the command line flags default to.
#[derive(Default, Serialize, Deserialize)]
pub(crate) struct InputConfig {
    pub private_key: Option<PathBuf>,

    pub password: Option<String>,

    pub device_cert: Option<PathBuf>,

    pub ca_cert: Option<PathBuf>,
}

/// Load Input Configuration from file
pub(crate) fn load_input_config(path: &PathBuf) -> anyhow::Result<InputConfig> {
    let config_str = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read the config file {}", path.display()))?;

    let config: InputConfig = toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;

    Ok(config)
}
