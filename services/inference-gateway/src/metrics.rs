//! Prometheus metrics owned by the gateway, exposed in text format on `/metrics`.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

const LATENCY_BUCKETS_MS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0];

#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    pub requests_total: IntCounterVec,
    pub inference_latency_ms: HistogramVec,
    pub models_loaded: IntGauge,
}

impl GatewayMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let requests_total = IntCounterVec::new(
            Opts::new("predictor_requests_total", "Prediction requests by disease and outcome"),
            &["disease", "outcome"],
        )?;
        let inference_latency_ms = HistogramVec::new(
            HistogramOpts::new("predictor_inference_latency_ms", "Inference latency ms").buckets(LATENCY_BUCKETS_MS.to_vec()),
            &["disease"],
        )?;
        let models_loaded = IntGauge::new("predictor_models_loaded", "Models available for serving")?;
        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(inference_latency_ms.clone()))?;
        registry.register(Box::new(models_loaded.clone()))?;
        Ok(Self { registry, requests_total, inference_latency_ms, models_loaded })
    }

    pub fn record(&self, disease: &str, outcome: &str) {
        self.requests_total.with_label_values(&[disease, outcome]).inc();
    }

    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(buf)
    }

    pub fn response(&self) -> Response {
        let (status, content_type, body) = match self.encode() {
            Ok(buf) => (StatusCode::OK, TextEncoder::new().format_type().to_string(), Body::from(buf)),
            Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, "text/plain".to_string(), Body::from(format!("encode error: {e}"))),
        };
        let mut resp = Response::new(body);
        *resp.status_mut() = status;
        if let Ok(v) = content_type.parse() { resp.headers_mut().insert(header::CONTENT_TYPE, v); }
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_text_output() {
        let m = GatewayMetrics::new().unwrap();
        m.models_loaded.set(3);
        m.record("heart", "ok");
        m.inference_latency_ms.with_label_values(&["heart"]).observe(1.2);
        let text = String::from_utf8(m.encode().unwrap()).unwrap();
        assert!(text.contains("predictor_models_loaded 3"));
        assert!(text.contains("predictor_requests_total{disease=\"heart\",outcome=\"ok\"} 1"));
        assert!(text.contains("predictor_inference_latency_ms_count{disease=\"heart\"} 1"));
    }

    #[test]
    fn registries_are_independent() {
        let a = GatewayMetrics::new().unwrap();
        let b = GatewayMetrics::new().unwrap();
        a.record("x", "ok");
        assert!(!String::from_utf8(b.encode().unwrap()).unwrap().contains("disease=\"x\""));
    }
}
