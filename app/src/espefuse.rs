/*++

Licensed under the Apache-2.0 license.

File Name:

   espefuse.rs

Abstract:

    Fuse-management collaborator backed by the espefuse.py utility.

--*/

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use secure_cert_provision::{EfuseKeyStore, KeyBlockInfo};
use secure_cert_types::{SecureCertError, Target, WRAPPING_KEY_BYTE_SIZE};

/// Shells out to espefuse.py and translates its JSON summary into key
/// block state. Everything above this adapter is tool-agnostic.
pub struct EspefuseTool {
    target: Target,
    port: String,
    espefuse: PathBuf,
}

impl EspefuseTool {
    pub fn new(target: Target, port: impl Into<String>, idf_path: &Path) -> Self {
        Self {
            target,
            port: port.into(),
            espefuse: idf_path.join("components/esptool_py/esptool/espefuse.py"),
        }
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new("python");
        cmd.arg(&self.espefuse)
            .args(["--chip", self.target.name(), "-p", &self.port]);
        cmd
    }

    /// Print the human-readable eFuse summary to stdout.
    pub fn print_summary(&self) -> Result<(), SecureCertError> {
        let status = self.base_command().arg("summary").status()?;
        if !status.success() {
            return Err(SecureCertError::KeyStore(format!(
                "espefuse summary exited with {status}"
            )));
        }
        Ok(())
    }

    fn summary_json(&self) -> Result<serde_json::Value, SecureCertError> {
        let output = self
            .base_command()
            .args(["summary", "--format", "json"])
            .output()?;
        if !output.status.success() {
            return Err(SecureCertError::KeyStore(format!(
                "espefuse summary failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        // the tool prints connection chatter before the JSON document
        let json_start = text
            .find('{')
            .ok_or_else(|| SecureCertError::KeyStore("no JSON in espefuse output".to_string()))?;
        serde_json::from_str(&text[json_start..])
            .map_err(|e| SecureCertError::KeyStore(format!("failed to parse espefuse JSON: {e}")))
    }
}

impl EfuseKeyStore for EspefuseTool {
    fn key_block_info(&mut self, block: u32) -> Result<KeyBlockInfo, SecureCertError> {
        let summary = self.summary_json()?;
        let entry = &summary[format!("BLOCK_KEY{block}").as_str()];
        let missing =
            |field: &str| SecureCertError::KeyStore(format!("BLOCK_KEY{block} has no {field}"));

        let writable = entry["writeable"].as_bool().ok_or_else(|| missing("writeable"))?;
        let readable = entry["readable"].as_bool().ok_or_else(|| missing("readable"))?;
        let purpose = summary[format!("KEY_PURPOSE_{block}").as_str()]["value"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        let value = if readable {
            let hex_value: String = entry["value"]
                .as_str()
                .ok_or_else(|| missing("value"))?
                .split_whitespace()
                .collect();
            let bytes = hex::decode(&hex_value).map_err(|e| {
                SecureCertError::KeyStore(format!("BLOCK_KEY{block} value is not hex: {e}"))
            })?;
            Some(bytes.try_into().map_err(|_| {
                SecureCertError::KeyStore(format!("BLOCK_KEY{block} is not a 256-bit block"))
            })?)
        } else {
            None
        };

        Ok(KeyBlockInfo {
            writable,
            readable,
            purpose,
            value,
        })
    }

    fn burn_key(
        &mut self,
        block: u32,
        purpose: &str,
        key: &[u8; WRAPPING_KEY_BYTE_SIZE],
        read_protect: bool,
    ) -> Result<(), SecureCertError> {
        // espefuse consumes the key from a file
        let mut key_file = tempfile::NamedTempFile::new()?;
        key_file.write_all(key)?;
        key_file.flush()?;

        let mut cmd = self.base_command();
        cmd.arg("burn_key")
            .arg(format!("BLOCK_KEY{block}"))
            .arg(key_file.path())
            .arg(purpose);
        if !read_protect {
            cmd.arg("--no-read-protect");
        }
        let output = cmd.output()?;
        if !output.status.success() {
            return Err(SecureCertError::KeyStore(format!(
                "espefuse burn_key failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }
}
