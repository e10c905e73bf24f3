//! Prometheus recorder and `/metrics` rendering.
//!
//! Metric names recorded by the hubs live in `relay_hub::metrics`.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the process-wide Prometheus recorder.
///
/// Call once at startup, before any metric is recorded. Fails if another
/// recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render the Prometheus text exposition.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::with_local_recorder;
    use relay_hub::metrics::SESSIONS_ACTIVE;

    #[test]
    fn renders_recorded_gauge() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        with_local_recorder(&recorder, || {
            metrics::gauge!(SESSIONS_ACTIVE, "hub" => "chat").set(3.0);
        });

        let output = render(&handle);
        assert!(output.contains(SESSIONS_ACTIVE), "{output}");
        assert!(output.contains("hub=\"chat\""), "{output}");
    }
}
