/*++

Licensed under the Apache-2.0 license.

File Name:

   esptool.rs

Abstract:

    Flashing collaborator backed by the esptool.py utility.

--*/

use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context};
use secure_cert_types::Target;

/// Write the partition image to device flash at the given offset.
pub fn flash_partition(
    idf_path: &Path,
    target: Target,
    port: &str,
    offset: u32,
    image: &Path,
) -> anyhow::Result<()> {
    let esptool = idf_path.join("components/esptool_py/esptool/esptool.py");
    log::info!(
        "flashing the secure cert partition at offset {offset:#x}; pass --skip-flash to skip this step"
    );
    let status = Command::new("python")
        .arg(&esptool)
        .args(["--chip", target.name(), "-p", port, "write_flash"])
        .arg(format!("{offset:#x}"))
        .arg(image)
        .status()
        .with_context(|| "failed to run esptool.py")?;
    if !status.success() {
        bail!("esptool write_flash exited with {status}");
    }
    Ok(())
}
