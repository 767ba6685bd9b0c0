//! Classification result types

use serde_json::Value;

/// Normalized result of classifying one frame
#[derive(Debug, Clone, PartialEq)]
pub struct GestureSignal {
    present: bool,
    confidence: f64,
    raw: Value,
}

impl GestureSignal {
    pub fn present(confidence: f64, raw: Value) -> Self {
        Self {
            present: true,
            confidence: clamp_confidence(confidence),
            raw,
        }
    }

    pub fn absent(raw: Value) -> Self {
        Self {
            present: false,
            confidence: 0.0,
            raw,
        }
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    /// Confidence in `0.0..=100.0`
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// The service document this signal was derived from
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Outcome of one classification call
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationOutcome {
    Success(GestureSignal),
    /// The service answered but reported a failure
    ServiceError(String),
    /// The request never produced a usable answer
    TransportError(String),
}

impl ClassificationOutcome {
    /// Short label for logs and events
    pub fn kind(&self) -> &'static str {
        match self {
            ClassificationOutcome::Success(_) => "success",
            ClassificationOutcome::ServiceError(_) => "service_error",
            ClassificationOutcome::TransportError(_) => "transport_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(GestureSignal::present(180.0, json!({})).confidence(), 100.0);
        assert_eq!(GestureSignal::present(-3.0, json!({})).confidence(), 0.0);
        assert_eq!(GestureSignal::present(f64::NAN, json!({})).confidence(), 0.0);
    }

    #[test]
    fn test_kind_labels() {
        let hit = ClassificationOutcome::Success(GestureSignal::present(90.0, json!({})));
        let service = ClassificationOutcome::ServiceError("IMAGE_ERROR_UNSUPPORTED_FORMAT".into());
        let transport = ClassificationOutcome::TransportError("timeout".to_string());
        assert_eq!(hit.kind(), "success");
        assert_eq!(service.kind(), "service_error");
        assert_eq!(transport.kind(), "transport_error");
    }
}
