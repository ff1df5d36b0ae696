//! Egress pricing.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PricingError {
    #[error("network pricing unavailable: {0}")]
    Unavailable(String),

    #[error("invalid network pricing: {0}")]
    Invalid(String),
}

/// Per-unit egress rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkPricing {
    pub zone_egress_cost: f64,
    pub region_egress_cost: f64,
    pub internet_egress_cost: f64,
}

impl NetworkPricing {
    pub fn new(zone: f64, region: f64, internet: f64) -> Self {
        Self {
            zone_egress_cost: zone,
            region_egress_cost: region,
            internet_egress_cost: internet,
        }
    }

    /// Rates must be finite and non-negative.
    pub fn validate(&self) -> Result<(), PricingError> {
        for (name, rate) in [
            ("zone_egress_cost", self.zone_egress_cost),
            ("region_egress_cost", self.region_egress_cost),
            ("internet_egress_cost", self.internet_egress_cost),
        ] {
            if !rate.is_finite() || rate < 0.0 {
                return Err(PricingError::Invalid(format!("{name} = {rate}")));
            }
        }
        Ok(())
    }
}

/// Source of egress rates, usually backed by a cloud provider's price list.
pub trait PricingProvider: Send + Sync {
    fn network_pricing(&self) -> Result<NetworkPricing, PricingError>;
}

impl<P: PricingProvider + ?Sized> PricingProvider for &P {
    fn network_pricing(&self) -> Result<NetworkPricing, PricingError> {
        (**self).network_pricing()
    }
}

impl<P: PricingProvider + ?Sized> PricingProvider for Box<P> {
    fn network_pricing(&self) -> Result<NetworkPricing, PricingError> {
        (**self).network_pricing()
    }
}

/// Fixed rates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticPricing {
    pricing: NetworkPricing,
}

impl StaticPricing {
    pub fn new(pricing: NetworkPricing) -> Result<Self, PricingError> {
        pricing.validate()?;
        Ok(Self { pricing })
    }

    /// Load rates from a `.json` file, or TOML for any other extension.
    pub fn from_path(path: &Path) -> Result<Self, PricingError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PricingError::Unavailable(format!("failed to read {}: {e}", path.display()))
        })?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let pricing: NetworkPricing = if is_json {
            serde_json::from_str(&content).map_err(|e| {
                PricingError::Invalid(format!("failed to parse {}: {e}", path.display()))
            })?
        } else {
            toml::from_str(&content).map_err(|e| {
                PricingError::Invalid(format!("failed to parse {}: {e}", path.display()))
            })?
        };

        Self::new(pricing)
    }
}

impl PricingProvider for StaticPricing {
    fn network_pricing(&self) -> Result<NetworkPricing, PricingError> {
        Ok(self.pricing)
    }
}
