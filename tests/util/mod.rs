use cost_audit::audit::{AllocationReconciliationAudit, AuditSet};
use cost_audit::model::{Vector, Window};
use cost_audit::network::QueryResult;

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: std::sync::Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// Install a debug-level capturing subscriber for the current thread.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[allow(dead_code)]
pub fn window(start: i64, end: i64) -> Window {
    Window::from_unix(start, end).expect("valid window")
}

/// Audit set over `[start, end)` carrying one reconciliation result.
#[allow(dead_code)]
pub fn reconciled_set(start: i64, end: i64, node: &str, expected: f64, actual: f64) -> AuditSet {
    let set = AuditSet::new(window(start, end));
    let mut audit = AllocationReconciliationAudit::new();
    audit.record(node, "cpu", expected, actual);
    set.set_allocation_reconciliation(Some(audit));
    set
}

/// Query row for a workload with the given labels and `(value, timestamp)` samples.
#[allow(dead_code)]
pub fn usage_row(
    namespace: &str,
    pod: &str,
    cluster: Option<&str>,
    samples: &[(f64, f64)],
) -> QueryResult {
    let mut labels = vec![("namespace", namespace), ("pod_name", pod)];
    if let Some(cluster) = cluster {
        labels.push(("cluster_id", cluster));
    }
    QueryResult::with_labels(
        labels,
        samples.iter().map(|&s| Vector::from(s)).collect(),
    )
}
