//! Pricing joined egress usage into a cost series.
//!
//! Two alignments are supported:
//!
//! - [`CostAlignment::Positional`] combines the i-th sample of every series,
//!   taking the timestamp from the last series that has an i-th sample. This
//!   is only meaningful when the three queries were sampled on the same
//!   schedule; see [`is_co_sampled`].
//! - [`CostAlignment::Timestamp`] sums costs per distinct timestamp across
//!   the three series and returns them in timestamp order.

use std::collections::BTreeMap;
use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::pricing::{NetworkPricing, PricingError, PricingProvider};
use super::usage::{EgressKind, NetworkUsageData};
use crate::logging::LogDeduper;
use crate::model::Vector;

const MIS_SAMPLED_TEMPLATE: &str = "egress series for {} are not co-sampled; positional costs may misalign";

#[derive(Error, Debug)]
pub enum CostError {
    #[error("failed to price network usage: {0}")]
    Pricing(#[from] PricingError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CostAlignment {
    #[default]
    Positional,
    Timestamp,
}

impl std::str::FromStr for CostAlignment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "positional" => Ok(Self::Positional),
            "timestamp" => Ok(Self::Timestamp),
            _ => Err(format!("Unknown cost alignment: {}", s)),
        }
    }
}

impl fmt::Display for CostAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positional => write!(f, "positional"),
            Self::Timestamp => write!(f, "timestamp"),
        }
    }
}

fn rate(pricing: &NetworkPricing, kind: EgressKind) -> f64 {
    match kind {
        EgressKind::Zone => pricing.zone_egress_cost,
        EgressKind::Region => pricing.region_egress_cost,
        EgressKind::Internet => pricing.internet_egress_cost,
    }
}

/// Positional cost of `usage` under `provider`'s rates.
pub fn get_network_cost<P>(usage: &NetworkUsageData, provider: &P) -> Result<Vec<Vector>, CostError>
where
    P: PricingProvider + ?Sized,
{
    get_network_cost_with(usage, provider, CostAlignment::Positional)
}

pub fn get_network_cost_with<P>(
    usage: &NetworkUsageData,
    provider: &P,
    alignment: CostAlignment,
) -> Result<Vec<Vector>, CostError>
where
    P: PricingProvider + ?Sized,
{
    let pricing = provider.network_pricing()?;
    Ok(price(usage, &pricing, alignment))
}

/// Cost every workload in a joined usage map with a single pricing lookup.
pub fn get_network_costs<P>(
    usage: &BTreeMap<String, NetworkUsageData>,
    provider: &P,
    alignment: CostAlignment,
) -> Result<BTreeMap<String, Vec<Vector>>, CostError>
where
    P: PricingProvider + ?Sized,
{
    let pricing = provider.network_pricing()?;
    Ok(usage
        .iter()
        .map(|(key, data)| (key.clone(), price(data, &pricing, alignment)))
        .collect())
}

/// Apply already-fetched rates.
pub fn price(usage: &NetworkUsageData, pricing: &NetworkPricing, alignment: CostAlignment) -> Vec<Vector> {
    match alignment {
        CostAlignment::Positional => positional(usage, pricing),
        CostAlignment::Timestamp => by_timestamp(usage, pricing),
    }
}

fn positional(usage: &NetworkUsageData, pricing: &NetworkPricing) -> Vec<Vector> {
    let len = EgressKind::ALL
        .iter()
        .map(|&k| usage.series(k).len())
        .max()
        .unwrap_or(0);

    (0..len)
        .map(|i| {
            let mut cost = 0.0;
            let mut timestamp = 0.0;
            for kind in EgressKind::ALL {
                if let Some(sample) = usage.series(kind).get(i) {
                    let priced = sample.scaled(rate(pricing, kind));
                    cost += priced.value;
                    timestamp = priced.timestamp;
                }
            }
            Vector::new(cost, timestamp)
        })
        .collect()
}

fn by_timestamp(usage: &NetworkUsageData, pricing: &NetworkPricing) -> Vec<Vector> {
    let mut samples: Vec<Vector> = EgressKind::ALL
        .iter()
        .flat_map(|&kind| {
            let r = rate(pricing, kind);
            usage.series(kind).iter().map(move |s| s.scaled(r))
        })
        .collect();
    // Stable, so equal timestamps keep zone -> region -> internet order.
    samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let mut out: Vec<Vector> = Vec::new();
    for sample in samples {
        match out.last_mut() {
            Some(last) if last.timestamp == sample.timestamp => last.value += sample.value,
            _ => out.push(sample),
        }
    }
    out
}

fn strictly_increasing(series: &[Vector]) -> bool {
    series.windows(2).all(|w| w[0].timestamp < w[1].timestamp)
}

/// True if the non-empty series were sampled on a common schedule: each one
/// has strictly increasing timestamps, and every pair agrees on timestamps
/// position by position up to the shorter length.
///
/// When this holds and the non-empty series share a length, positional and
/// timestamp alignment produce the same costs.
pub fn is_co_sampled(usage: &NetworkUsageData) -> bool {
    let series: Vec<&[Vector]> = EgressKind::ALL
        .iter()
        .map(|&k| usage.series(k))
        .filter(|s| !s.is_empty())
        .collect();

    if !series.iter().all(|s| strictly_increasing(s)) {
        return false;
    }

    series.iter().enumerate().all(|(i, a)| {
        series[i + 1..].iter().all(|b| {
            a.iter()
                .zip(b.iter())
                .all(|(x, y)| x.timestamp == y.timestamp)
        })
    })
}

/// Warn, through `dedup`, about every workload whose series are not
/// co-sampled. Nothing is reported under timestamp alignment, which does not
/// depend on co-sampling. Returns the number of mis-sampled workloads.
pub fn warn_mis_sampled(
    usage: &BTreeMap<String, NetworkUsageData>,
    alignment: CostAlignment,
    dedup: &LogDeduper,
    limit: usize,
) -> usize {
    if alignment != CostAlignment::Positional {
        return 0;
    }
    let mut mis_sampled = 0;
    for (key, data) in usage {
        if !is_co_sampled(data) {
            mis_sampled += 1;
            dedup.warn(
                limit,
                MIS_SAMPLED_TEMPLATE,
                &format!("egress series for {key} are not co-sampled; positional costs may misalign"),
            );
        }
    }
    mis_sampled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::pricing::StaticPricing;

    struct Unavailable;

    impl PricingProvider for Unavailable {
        fn network_pricing(&self) -> Result<NetworkPricing, PricingError> {
            Err(PricingError::Unavailable("price list not loaded".into()))
        }
    }

    fn usage(zone: &[(f64, f64)], region: &[(f64, f64)], internet: &[(f64, f64)]) -> NetworkUsageData {
        let series = |s: &[(f64, f64)]| s.iter().map(|&v| Vector::from(v)).collect();
        NetworkUsageData {
            zone_egress: series(zone),
            region_egress: series(region),
            internet_egress: series(internet),
            ..Default::default()
        }
    }

    fn pricing() -> StaticPricing {
        StaticPricing::new(NetworkPricing::new(0.01, 0.02, 0.1)).unwrap()
    }

    #[test]
    fn positional_takes_last_timestamp() {
        let u = usage(&[(1.0, 100.0)], &[(1.0, 101.0)], &[]);
        let cost = get_network_cost(&u, &pricing()).unwrap();
        assert_eq!(cost.len(), 1);
        assert!((cost[0].value - 0.03).abs() < 1e-12);
        assert_eq!(cost[0].timestamp, 101.0);
    }

    #[test]
    fn empty_usage_costs_nothing() {
        let u = NetworkUsageData::default();
        assert!(get_network_cost(&u, &pricing()).unwrap().is_empty());
        assert!(
            get_network_cost_with(&u, &pricing(), CostAlignment::Timestamp)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn pricing_failure_is_an_error() {
        let u = usage(&[(1.0, 0.0)], &[], &[]);
        assert!(matches!(
            get_network_cost(&u, &Unavailable),
            Err(CostError::Pricing(PricingError::Unavailable(_)))
        ));
    }

    #[test]
    fn timestamp_alignment_sums_per_instant() {
        let u = usage(&[(1.0, 0.0), (1.0, 60.0)], &[(1.0, 60.0)], &[]);
        let cost = get_network_cost_with(&u, &pricing(), CostAlignment::Timestamp).unwrap();
        assert_eq!(cost.len(), 2);
        assert_eq!(cost[0].timestamp, 0.0);
        assert!((cost[0].value - 0.01).abs() < 1e-12);
        assert_eq!(cost[1].timestamp, 60.0);
        assert!((cost[1].value - 0.03).abs() < 1e-12);
    }

    #[test]
    fn positional_misaligns_mis_sampled_series() {
        let u = usage(&[(1.0, 0.0), (1.0, 60.0)], &[(1.0, 60.0)], &[]);
        assert!(!is_co_sampled(&u));
        let positional = get_network_cost(&u, &pricing()).unwrap();
        let aligned = get_network_cost_with(&u, &pricing(), CostAlignment::Timestamp).unwrap();
        assert_ne!(positional, aligned);
    }

    #[test]
    fn co_sampling_checks() {
        assert!(is_co_sampled(&NetworkUsageData::default()));
        assert!(is_co_sampled(&usage(&[(1.0, 0.0), (1.0, 60.0)], &[(2.0, 0.0)], &[])));
        assert!(!is_co_sampled(&usage(&[(1.0, 60.0), (1.0, 0.0)], &[], &[])));
    }

    #[test]
    fn costs_every_workload() {
        let mut map = BTreeMap::new();
        map.insert("ns,a,c".to_string(), usage(&[(1.0, 0.0)], &[], &[]));
        map.insert("ns,b,c".to_string(), NetworkUsageData::default());
        let costs = get_network_costs(&map, &pricing(), CostAlignment::Positional).unwrap();
        assert_eq!(costs.len(), 2);
        assert_eq!(costs["ns,a,c"].len(), 1);
        assert!(costs["ns,b,c"].is_empty());
        assert!(get_network_costs(&map, &Unavailable, CostAlignment::Positional).is_err());
    }

    #[test]
    fn mis_sampled_workloads_are_warned_up_to_the_limit() {
        let mut map = BTreeMap::new();
        for pod in ["a", "b", "c"] {
            map.insert(
                format!("ns,{pod},c"),
                usage(&[(1.0, 0.0), (1.0, 60.0)], &[(1.0, 60.0)], &[]),
            );
        }
        map.insert("ns,d,c".to_string(), usage(&[(1.0, 0.0)], &[(1.0, 0.0)], &[]));

        let dedup = LogDeduper::new();
        assert_eq!(warn_mis_sampled(&map, CostAlignment::Positional, &dedup, 2), 3);
        assert_eq!(dedup.count(MIS_SAMPLED_TEMPLATE), 3);

        let quiet = LogDeduper::new();
        assert_eq!(warn_mis_sampled(&map, CostAlignment::Timestamp, &quiet, 2), 0);
        assert_eq!(quiet.count(MIS_SAMPLED_TEMPLATE), 0);
    }

    #[test]
    fn timestamp_alignment_keeps_scaled_sample_when_alone() {
        let u = usage(&[], &[], &[(2.0, 30.0)]);
        let cost = get_network_cost_with(&u, &pricing(), CostAlignment::Timestamp).unwrap();
        assert_eq!(cost, vec![Vector::new(2.0, 30.0).scaled(0.1)]);
    }

    #[test]
    fn alignment_parse() {
        assert_eq!("Timestamp".parse::<CostAlignment>(), Ok(CostAlignment::Timestamp));
        assert!("nearest".parse::<CostAlignment>().is_err());
    }
}
