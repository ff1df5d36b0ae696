//! Joining zone, region and internet egress usage per workload.
//!
//! Each egress type is queried separately. The three results are keyed by
//! `namespace,pod,cluster` and outer-joined, so a workload seen by any one
//! query gets a record, with the series the other queries did not report
//! left empty.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::query::{QueryError, QueryRow};
use crate::model::Vector;

/// Egress destination class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EgressKind {
    Zone,
    Region,
    Internet,
}

impl EgressKind {
    pub const ALL: [EgressKind; 3] = [Self::Zone, Self::Region, Self::Internet];
}

/// One workload's series from a single egress query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkUsageVector {
    pub cluster_id: String,
    pub pod_name: String,
    pub namespace: String,
    pub values: Vec<Vector>,
}

/// One workload's joined egress usage. Each series is independent; an empty
/// series means the corresponding query reported nothing for the workload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkUsageData {
    pub cluster_id: String,
    pub pod_name: String,
    pub namespace: String,
    pub zone_egress: Vec<Vector>,
    pub region_egress: Vec<Vector>,
    pub internet_egress: Vec<Vector>,
}

impl NetworkUsageData {
    pub fn key(&self) -> String {
        usage_key(&self.namespace, &self.pod_name, &self.cluster_id)
    }

    pub fn series(&self, kind: EgressKind) -> &[Vector] {
        match kind {
            EgressKind::Zone => &self.zone_egress,
            EgressKind::Region => &self.region_egress,
            EgressKind::Internet => &self.internet_egress,
        }
    }

    fn series_mut(&mut self, kind: EgressKind) -> &mut Vec<Vector> {
        match kind {
            EgressKind::Zone => &mut self.zone_egress,
            EgressKind::Region => &mut self.region_egress,
            EgressKind::Internet => &mut self.internet_egress,
        }
    }
}

/// Composite join key.
pub fn usage_key(namespace: &str, pod_name: &str, cluster_id: &str) -> String {
    format!("{namespace},{pod_name},{cluster_id}")
}

/// Key one query's rows by workload. A later row with the same key replaces
/// an earlier one.
fn get_network_usage<R: QueryRow>(
    rows: &[R],
    default_cluster_id: &str,
) -> Result<FxHashMap<String, NetworkUsageVector>, QueryError> {
    let mut by_key = FxHashMap::default();

    for row in rows {
        let pod_name = row.required_label("pod_name")?;
        let namespace = row.required_label("namespace")?;
        let cluster_id = match row.label("cluster_id")? {
            Some(id) if !id.is_empty() => id,
            _ => {
                debug!(
                    pod = pod_name,
                    namespace = namespace,
                    cluster_id = default_cluster_id,
                    "cluster id defaulted"
                );
                default_cluster_id
            }
        };

        by_key.insert(
            usage_key(namespace, pod_name, cluster_id),
            NetworkUsageVector {
                cluster_id: cluster_id.to_string(),
                pod_name: pod_name.to_string(),
                namespace: namespace.to_string(),
                values: row.values().to_vec(),
            },
        );
    }

    Ok(by_key)
}

/// Outer-join zone, region and internet egress usage by workload.
///
/// Any row error aborts the whole join; no partial map is returned.
pub fn get_network_usage_data<R: QueryRow>(
    zone: &[R],
    region: &[R],
    internet: &[R],
    default_cluster_id: &str,
) -> Result<BTreeMap<String, NetworkUsageData>, QueryError> {
    let sources = [
        (EgressKind::Zone, get_network_usage(zone, default_cluster_id)?),
        (EgressKind::Region, get_network_usage(region, default_cluster_id)?),
        (EgressKind::Internet, get_network_usage(internet, default_cluster_id)?),
    ];

    let mut usage: BTreeMap<String, NetworkUsageData> = BTreeMap::new();
    for (kind, source) in sources {
        for (key, vector) in source {
            let entry = usage.entry(key).or_insert_with(|| NetworkUsageData {
                cluster_id: vector.cluster_id.clone(),
                pod_name: vector.pod_name.clone(),
                namespace: vector.namespace.clone(),
                ..Default::default()
            });
            *entry.series_mut(kind) = vector.values;
        }
    }

    Ok(usage)
}
