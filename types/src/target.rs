/*++

Licensed under the Apache-2.0 license.

File Name:

   target.rs

Abstract:

    Target chip table: per-target DS capabilities.

--*/

use core::fmt;
use core::str::FromStr;

use crate::SecureCertError;

/// Target chips the tool can provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Esp32,
    Esp32s2,
    Esp32s3,
    Esp32c3,
    Esp32c6,
    Esp32h2,
}

impl Target {
    pub const ALL: [Target; 6] = [
        Target::Esp32,
        Target::Esp32s2,
        Target::Esp32s3,
        Target::Esp32c3,
        Target::Esp32c6,
        Target::Esp32h2,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Target::Esp32 => "esp32",
            Target::Esp32s2 => "esp32s2",
            Target::Esp32s3 => "esp32s3",
            Target::Esp32c3 => "esp32c3",
            Target::Esp32c6 => "esp32c6",
            Target::Esp32h2 => "esp32h2",
        }
    }

    /// RSA modulus sizes the target's DS peripheral accepts, smallest
    /// first. `None` if the target has no DS peripheral.
    pub fn supported_rsa_sizes(&self) -> Option<&'static [u32]> {
        match self {
            Target::Esp32 => None,
            Target::Esp32s2 | Target::Esp32s3 => Some(&[1024, 2048, 3072, 4096]),
            Target::Esp32c3 | Target::Esp32c6 | Target::Esp32h2 => Some(&[1024, 2048, 3072]),
        }
    }

    /// Largest supported RSA modulus size; DS operands are zero-padded to
    /// this length.
    pub fn max_rsa_size(&self) -> Option<u32> {
        self.supported_rsa_sizes()
            .and_then(|sizes| sizes.last().copied())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Target {
    type Err = SecureCertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::ALL
            .iter()
            .find(|t| t.name() == s)
            .copied()
            .ok_or_else(|| SecureCertError::UnknownTarget(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parse() {
        assert_eq!("esp32c3".parse::<Target>().unwrap(), Target::Esp32c3);
        assert!(matches!(
            "esp8266".parse::<Target>(),
            Err(SecureCertError::UnknownTarget(_))
        ));
    }

    #[test]
    fn test_ds_support() {
        assert_eq!(Target::Esp32.supported_rsa_sizes(), None);
        assert_eq!(Target::Esp32s2.max_rsa_size(), Some(4096));
        assert_eq!(Target::Esp32c3.max_rsa_size(), Some(3072));
    }
}
