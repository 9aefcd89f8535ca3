/*++

Licensed under the Apache-2.0 license.

File Name:

   lib.rs

Abstract:

    Provisioning of the eFuse key slot holding the DS wrapping key.

--*/

use std::path::PathBuf;

use secure_cert_types::{SecureCertError, WrappingKey, DS_KEY_PURPOSE, WRAPPING_KEY_BYTE_SIZE};

/// Metadata and (when readable) contents of one eFuse key block, as
/// reported by the fuse-management collaborator.
#[derive(Debug, Clone)]
pub struct KeyBlockInfo {
    pub writable: bool,
    pub readable: bool,
    pub purpose: String,
    pub value: Option<[u8; WRAPPING_KEY_BYTE_SIZE]>,
}

/// The external fuse-management collaborator. Burning is irrevocable;
/// implementations must not retry on their own.
pub trait EfuseKeyStore {
    /// Query the state of one key block
    fn key_block_info(&mut self, block: u32) -> Result<KeyBlockInfo, SecureCertError>;

    /// Program a key block with the given purpose. `read_protect` is set
    /// only for production burns; development burns stay readable so the
    /// write can be verified.
    fn burn_key(
        &mut self,
        block: u32,
        purpose: &str,
        key: &[u8; WRAPPING_KEY_BYTE_SIZE],
        read_protect: bool,
    ) -> Result<(), SecureCertError>;
}

/// Resolved state of a key slot; each state has exactly one outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Writable: mint a fresh wrapping key and burn it
    Empty,
    /// Already holds a DS wrapping key: reuse it
    OccupiedCompatible,
    /// Holds a key with a different purpose: unusable
    OccupiedIncompatible,
    /// Neither writable nor readable: unusable
    Locked,
}

impl SlotState {
    pub fn classify(info: &KeyBlockInfo) -> SlotState {
        if info.writable {
            SlotState::Empty
        } else if !info.readable {
            SlotState::Locked
        } else if info.purpose == DS_KEY_PURPOSE {
            SlotState::OccupiedCompatible
        } else {
            SlotState::OccupiedIncompatible
        }
    }
}

/// Decides whether the configured key block must be populated with a
/// freshly generated wrapping key or already holds a usable one, and
/// returns the resolved key. Never retries: on any failure the caller
/// must rerun with a different key id.
pub struct KeySlotProvisioner {
    block: u32,
    production: bool,
    key_file: PathBuf,
    keep_key_on_host: bool,
}

impl KeySlotProvisioner {
    pub fn new(
        block: u32,
        production: bool,
        key_file: impl Into<PathBuf>,
        keep_key_on_host: bool,
    ) -> Self {
        Self {
            block,
            production,
            key_file: key_file.into(),
            keep_key_on_host,
        }
    }

    pub fn provision<S: EfuseKeyStore>(
        &self,
        store: &mut S,
    ) -> Result<WrappingKey, SecureCertError> {
        let info = store.key_block_info(self.block)?;
        match SlotState::classify(&info) {
            SlotState::Empty => self.mint(store),
            SlotState::OccupiedCompatible => self.reuse(info),
            SlotState::OccupiedIncompatible => {
                log::error!(
                    "key block {} holds a key with purpose {:?}, expected {DS_KEY_PURPOSE}",
                    self.block,
                    info.purpose
                );
                Err(SecureCertError::SlotUnusable(self.block))
            }
            SlotState::Locked => {
                log::error!("key block {} is neither writable nor readable", self.block);
                Err(SecureCertError::SlotUnusable(self.block))
            }
        }
    }

    /// Empty slot: generate a key, persist it to the host key file, burn
    /// it, and verify the burn. In development mode the block stays
    /// readable and the verification is a byte compare of the read-back;
    /// in production the block is read-protected and only the declared
    /// purpose can be checked.
    fn mint<S: EfuseKeyStore>(&self, store: &mut S) -> Result<WrappingKey, SecureCertError> {
        log::info!(
            "key block {} is writable, generating a new wrapping key and burning it",
            self.block
        );
        let mut key = [0u8; WRAPPING_KEY_BYTE_SIZE];
        openssl::rand::rand_bytes(&mut key)
            .map_err(|e| SecureCertError::Crypto(e.to_string()))?;
        std::fs::write(&self.key_file, key)?;

        if !self.production {
            log::warn!(
                "eFuse key block will not be read protected in development mode; \
                 enable production mode to read protect the key block"
            );
        }
        store.burn_key(self.block, DS_KEY_PURPOSE, &key, self.production)?;

        let info = store.key_block_info(self.block)?;
        if self.production {
            if info.purpose != DS_KEY_PURPOSE {
                return Err(SecureCertError::ProvisioningVerificationFailed(self.block));
            }
        } else if info.value != Some(key) {
            return Err(SecureCertError::ProvisioningVerificationFailed(self.block));
        }
        log::info!("wrapping key written to key block {}", self.block);
        Ok(WrappingKey::new(key))
    }

    /// Occupied-compatible slot: read the existing key back and reuse it.
    /// Idempotent across repeated runs against the same device.
    fn reuse(&self, info: KeyBlockInfo) -> Result<WrappingKey, SecureCertError> {
        log::info!(
            "key block {} already holds a DS wrapping key, reusing it",
            self.block
        );
        let value = info
            .value
            .ok_or(SecureCertError::SlotUnusable(self.block))?;
        if self.keep_key_on_host {
            std::fs::write(&self.key_file, value)?;
        }
        Ok(WrappingKey::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    /// Simulated fuse controller. `flip_burned_bit` models a failed burn
    /// by corrupting what the read-back reports.
    struct MockKeyStore {
        info: KeyBlockInfo,
        burned: Option<[u8; 32]>,
        burn_calls: u32,
        flip_burned_bit: bool,
    }

    impl MockKeyStore {
        fn new(info: KeyBlockInfo) -> Self {
            Self {
                info,
                burned: None,
                burn_calls: 0,
                flip_burned_bit: false,
            }
        }
    }

    impl EfuseKeyStore for MockKeyStore {
        fn key_block_info(&mut self, _block: u32) -> Result<KeyBlockInfo, SecureCertError> {
            Ok(self.info.clone())
        }

        fn burn_key(
            &mut self,
            _block: u32,
            purpose: &str,
            key: &[u8; 32],
            read_protect: bool,
        ) -> Result<(), SecureCertError> {
            self.burn_calls += 1;
            let mut stored = *key;
            if self.flip_burned_bit {
                stored[0] ^= 0x80;
            }
            self.burned = Some(stored);
            self.info.writable = false;
            self.info.readable = !read_protect;
            self.info.purpose = purpose.to_string();
            self.info.value = self.info.readable.then_some(stored);
            Ok(())
        }
    }

    fn empty_block() -> KeyBlockInfo {
        KeyBlockInfo {
            writable: true,
            readable: true,
            purpose: String::new(),
            value: None,
        }
    }

    fn key_file() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hmac_key.bin");
        (dir, path)
    }

    #[test]
    fn test_empty_slot_minted_and_verified() {
        let (_dir, path) = key_file();
        let mut store = MockKeyStore::new(empty_block());
        let provisioner = KeySlotProvisioner::new(1, false, &path, false);
        let key = provisioner.provision(&mut store).unwrap();
        assert_eq!(store.burn_calls, 1);
        assert_eq!(store.burned.unwrap(), *key.as_bytes());
        // the generated key was persisted for the caller
        assert_eq!(std::fs::read(&path).unwrap(), key.as_bytes());
    }

    #[test]
    fn test_readback_mismatch_is_fatal() {
        let (_dir, path) = key_file();
        let mut store = MockKeyStore::new(empty_block());
        store.flip_burned_bit = true;
        let provisioner = KeySlotProvisioner::new(2, false, &path, false);
        assert!(matches!(
            provisioner.provision(&mut store),
            Err(SecureCertError::ProvisioningVerificationFailed(2))
        ));
    }

    #[test]
    fn test_production_burn_verifies_purpose_only() {
        let (_dir, path) = key_file();
        let mut store = MockKeyStore::new(empty_block());
        // even a corrupted burn passes in production: the block is read
        // protected, only the purpose tag can be checked
        store.flip_burned_bit = true;
        let provisioner = KeySlotProvisioner::new(3, true, &path, false);
        let key = provisioner.provision(&mut store).unwrap();
        // the caller-visible file holds the key that was sent to the tool
        assert_eq!(std::fs::read(&path).unwrap(), key.as_bytes());
    }

    #[test]
    fn test_occupied_compatible_reused() {
        let existing = [0x77u8; 32];
        let info = KeyBlockInfo {
            writable: false,
            readable: true,
            purpose: DS_KEY_PURPOSE.to_string(),
            value: Some(existing),
        };
        let (_dir, path) = key_file();
        let mut store = MockKeyStore::new(info);
        let provisioner = KeySlotProvisioner::new(1, false, &path, false);
        let first = provisioner.provision(&mut store).unwrap();
        let second = provisioner.provision(&mut store).unwrap();
        assert_eq!(first.as_bytes(), &existing);
        assert_eq!(second.as_bytes(), &existing);
        assert_eq!(store.burn_calls, 0);
        // key file only written when requested
        assert!(!Path::new(&path).exists());

        let keeper = KeySlotProvisioner::new(1, false, &path, true);
        keeper.provision(&mut store).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), existing);
    }

    #[test]
    fn test_incompatible_purpose_fails_without_write() {
        let info = KeyBlockInfo {
            writable: false,
            readable: true,
            purpose: "XTS_AES_128_KEY".to_string(),
            value: Some([0u8; 32]),
        };
        let (_dir, path) = key_file();
        let mut store = MockKeyStore::new(info);
        let provisioner = KeySlotProvisioner::new(4, false, &path, false);
        assert!(matches!(
            provisioner.provision(&mut store),
            Err(SecureCertError::SlotUnusable(4))
        ));
        assert_eq!(store.burn_calls, 0);
    }

    #[test]
    fn test_locked_slot_fails_without_write() {
        let info = KeyBlockInfo {
            writable: false,
            readable: false,
            purpose: String::new(),
            value: None,
        };
        let (_dir, path) = key_file();
        let mut store = MockKeyStore::new(info);
        let provisioner = KeySlotProvisioner::new(5, false, &path, false);
        assert!(matches!(
            provisioner.provision(&mut store),
            Err(SecureCertError::SlotUnusable(5))
        ));
        assert_eq!(store.burn_calls, 0);
    }

    #[test]
    fn test_slot_state_classification() {
        let mut info = empty_block();
        assert_eq!(SlotState::classify(&info), SlotState::Empty);

        info.writable = false;
        info.purpose = DS_KEY_PURPOSE.to_string();
        assert_eq!(SlotState::classify(&info), SlotState::OccupiedCompatible);

        info.purpose = "USER".to_string();
        assert_eq!(SlotState::classify(&info), SlotState::OccupiedIncompatible);

        info.readable = false;
        assert_eq!(SlotState::classify(&info), SlotState::Locked);
    }
}
