//! Network egress usage and cost.
//!
//! - [`query`]: query result rows and Prometheus response decoding
//! - [`usage`]: three-way join of zone/region/internet egress by workload
//! - [`pricing`]: egress rate lookup
//! - [`cost`]: usage × rates → cost series

pub mod cost;
pub mod pricing;
pub mod query;
pub mod usage;

pub use cost::{
    CostAlignment, CostError, get_network_cost, get_network_cost_with, get_network_costs,
    is_co_sampled, warn_mis_sampled,
};
pub use pricing::{NetworkPricing, PricingError, PricingProvider, StaticPricing};
pub use query::{QueryError, QueryResult, QueryResults, QueryRow};
pub use usage::{EgressKind, NetworkUsageData, NetworkUsageVector, get_network_usage_data, usage_key};
