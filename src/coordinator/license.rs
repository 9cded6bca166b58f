//! License verification for registrations of the licensed application

use crate::common::{LicenseConfig, Result};
use crate::proto::ErrorType;
use crate::Error;

/// Checks a node's core count and the resulting cluster size against the
/// installed license.
pub trait LicenseVerifier: Send + Sync {
    fn verify(&self, cores: u32, node_count: usize) -> Result<()>;
}

/// Limits taken from configuration; 0 means unlimited.
pub struct QuotaLicenseVerifier {
    max_nodes: u32,
    max_cores: u32,
}

impl QuotaLicenseVerifier {
    pub fn new(config: &LicenseConfig) -> Self {
        Self {
            max_nodes: config.max_nodes,
            max_cores: config.max_cores,
        }
    }

    /// A verifier that accepts everything
    pub fn unlimited() -> Self {
        Self {
            max_nodes: 0,
            max_cores: 0,
        }
    }
}

impl LicenseVerifier for QuotaLicenseVerifier {
    fn verify(&self, cores: u32, node_count: usize) -> Result<()> {
        if cores == 0 {
            return Err(Error::business(
                ErrorType::InvalidCoreCount,
                "invalid core count: 0",
            ));
        }
        if self.max_cores > 0 && cores > self.max_cores {
            return Err(Error::business(
                ErrorType::LicenseVerifyError,
                format!(
                    "core count {} exceeds the licensed {} per node",
                    cores, self.max_cores
                ),
            ));
        }
        if self.max_nodes > 0 && node_count > self.max_nodes as usize {
            return Err(Error::business(
                ErrorType::LicenseVerifyError,
                format!(
                    "node count {} exceeds the licensed {}",
                    node_count, self.max_nodes
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits() {
        let verifier = QuotaLicenseVerifier::new(&LicenseConfig {
            max_nodes: 3,
            max_cores: 16,
        });
        assert!(verifier.verify(16, 3).is_ok());
        assert!(verifier.verify(17, 1).is_err());
        assert!(verifier.verify(8, 4).is_err());
        assert!(verifier.verify(0, 1).is_err());
    }

    #[test]
    fn test_unlimited() {
        assert!(QuotaLicenseVerifier::unlimited().verify(512, 1000).is_ok());
    }
}
