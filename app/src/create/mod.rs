/*++

Licensed under the Apache-2.0 license.

File Name:

   mod.rs

Abstract:

    File contains implementation of the partition creation command.

--*/

mod config;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::ArgMatches;

use secure_cert_crypto::{load_certificate, load_private_key, rsa_key_numbers, OsslCrypto};
use secure_cert_gen::{derive_ds_params, generate_partition_ds, generate_partition_no_ds};
use secure_cert_provision::KeySlotProvisioner;
use secure_cert_types::{Target, EFUSE_KEY_BLOCK_COUNT};

use crate::espefuse::EspefuseTool;
use crate::esptool;
use config::InputConfig;

const HMAC_KEY_FILE_NAME: &str = "hmac_key.bin";
const DEFAULT_OUT: &str = "esp_secure_cert_data/esp_secure_cert.bin";

/// Run the command
pub(crate) fn run_cmd(args: &ArgMatches) -> anyhow::Result<()> {
    let config = match args.get_one::<PathBuf>("config") {
        Some(path) => config::load_input_config(path)?,
        None => InputConfig::default(),
    };

    let private_key_path = args
        .get_one::<PathBuf>("private-key")
        .cloned()
        .or(config.private_key)
        .unwrap_or_else(|| PathBuf::from("client.key"));
    let device_cert_path = args
        .get_one::<PathBuf>("device-cert")
        .cloned()
        .or(config.device_cert)
        .unwrap_or_else(|| PathBuf::from("client.crt"));
    let ca_cert_path = args
        .get_one::<PathBuf>("ca-cert")
        .cloned()
        .or(config.ca_cert)
        .unwrap_or_else(|| PathBuf::from("ca.crt"));
    let password = args
        .get_one::<String>("password")
        .cloned()
        .or(config.password);

    let target: Target = args
        .get_one::<String>("target-chip")
        .with_context(|| "target-chip arg not specified")?
        .parse()?;

    let configure_ds = args.get_flag("configure-ds");
    let production = args.get_flag("production");
    let keep_ds_data = args.get_flag("keep-ds-data");
    let skip_flash = args.get_flag("skip-flash");
    let port = args.get_one::<String>("port").cloned();

    let efuse_key_id = *args
        .get_one::<u32>("efuse-key-id")
        .with_context(|| "efuse-key-id arg not specified")?;
    if efuse_key_id >= EFUSE_KEY_BLOCK_COUNT {
        return Err(anyhow!(
            "efuse-key-id must be in 0..{EFUSE_KEY_BLOCK_COUNT}"
        ));
    }

    let offset = parse_offset(
        args.get_one::<String>("offset")
            .with_context(|| "offset arg not specified")?,
    )?;

    let out_path = args
        .get_one::<PathBuf>("out")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT));
    let data_dir = out_path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;
    let hmac_key_file = data_dir.join(HMAC_KEY_FILE_NAME);

    let device_cert = load_certificate(&device_cert_path)?;
    let ca_cert = if ca_cert_path.exists() {
        Some(load_certificate(&ca_cert_path)?)
    } else {
        log::info!(
            "CA certificate {} not found, skipping the CA_CERT record",
            ca_cert_path.display()
        );
        None
    };

    let key = load_private_key(&private_key_path, password.as_deref())?;

    let image = if configure_ds {
        let port = port
            .as_deref()
            .with_context(|| "--port is required when configuring the DS peripheral")?;
        let mut store = EspefuseTool::new(target, port, &idf_path()?);
        let provisioner =
            KeySlotProvisioner::new(efuse_key_id, production, &hmac_key_file, keep_ds_data);
        let wrapping_key = provisioner.provision(&mut store)?;

        let numbers = rsa_key_numbers(&key)?;
        let ds = derive_ds_params(
            &OsslCrypto::default(),
            &numbers,
            Some(&wrapping_key),
            target,
            efuse_key_id as u8,
        )?;
        generate_partition_ds(&device_cert, ca_cert.as_ref(), &ds)?
    } else {
        log::warn!(
            "--configure-ds not set, the private key will be stored as plaintext; not secure"
        );
        generate_partition_no_ds(&device_cert, ca_cert.as_ref(), &key)?
    };

    std::fs::write(&out_path, image.as_bytes())
        .with_context(|| format!("Failed to write {}", out_path.display()))?;
    log::info!("secure cert partition written to {}", out_path.display());

    if skip_flash {
        log::info!("--skip-flash given, not flashing the partition");
    } else {
        let port = port
            .as_deref()
            .with_context(|| "--port is required to flash the partition (or pass --skip-flash)")?;
        esptool::flash_partition(&idf_path()?, target, port, offset, &out_path)?;
    }

    if !keep_ds_data && hmac_key_file.exists() {
        std::fs::remove_file(&hmac_key_file)
            .with_context(|| format!("Failed to remove {}", hmac_key_file.display()))?;
    }

    Ok(())
}

/// Root of the device toolchain; only the espefuse/esptool collaborators
/// need it.
pub(crate) fn idf_path() -> anyhow::Result<PathBuf> {
    let path = std::env::var_os("IDF_PATH")
        .map(PathBuf::from)
        .with_context(|| "IDF_PATH not set")?;
    if !path.exists() {
        return Err(anyhow!("IDF_PATH {} does not exist", path.display()));
    }
    Ok(path)
}

fn parse_offset(value: &str) -> anyhow::Result<u32> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .with_context(|| "offset must be a hex value, e.g. 0xD000")?;
    u32::from_str_radix(digits, 16).with_context(|| format!("invalid offset {value}"))
}

#[cfg(test)]
mod tests {
    use super::parse_offset;

    #[test]
    fn test_parse_offset() {
        assert_eq!(parse_offset("0xD000").unwrap(), 0xD000);
        assert_eq!(parse_offset("0X10000").unwrap(), 0x10000);
        assert!(parse_offset("53248").is_err());
        assert!(parse_offset("0xZZ").is_err());
    }
}
