//! Response normalization
//!
//! The recognition service has shipped several response layouts over time:
//! hands under `hands`, `hand_gestures` or a nested `result`, and gestures
//! given either as a score map or as a bare label. `ResponseNormalizer`
//! folds all of them into one `GestureSignal` and never fails; a shape it
//! does not recognise means "no gesture".

use serde_json::{Map, Value};
use tracing::debug;

use super::outcome::GestureSignal;

/// Keys that may hold the per-hand records, in probe order
const HAND_KEYS: [&str; 3] = ["hands", "hand_gestures", "result"];

/// Keys that may hold a hand's gesture descriptor, in probe order
const GESTURE_KEYS: [&str; 3] = ["gesture", "gesture_type", "label"];

/// Score key for the gesture we act on
const THUMB_UP: &str = "thumb_up";

/// Normalized labels accepted as a thumbs up
const THUMB_UP_LABELS: [&str; 2] = ["thumbup", "thumbsup"];

/// Default score a `thumb_up` entry must exceed
pub const DEFAULT_THRESHOLD: f64 = 50.0;

/// Turns a loosely-typed service document into a `GestureSignal`
#[derive(Debug, Clone, Copy)]
pub struct ResponseNormalizer {
    threshold: f64,
}

impl Default for ResponseNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl ResponseNormalizer {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Normalize a service document; total over every JSON value
    pub fn normalize(&self, document: &Value) -> GestureSignal {
        let Some(hands) = locate_hands(document) else {
            return GestureSignal::absent(document.clone());
        };

        for (index, hand) in hands.iter().enumerate() {
            if let Some(confidence) = self.match_hand(hand) {
                debug!(hand = index, confidence, "thumbs up found");
                return GestureSignal::present(confidence, document.clone());
            }
        }

        GestureSignal::absent(document.clone())
    }

    /// Confidence for a hand that shows a thumbs up, if it does
    fn match_hand(&self, hand: &Value) -> Option<f64> {
        let descriptor = first_truthy(hand.as_object()?, &GESTURE_KEYS)?;

        match descriptor {
            Value::Object(scores) => {
                let score = scores.get(THUMB_UP).and_then(Value::as_f64).unwrap_or(0.0);
                (score > self.threshold).then_some(score)
            }
            Value::String(label) => is_thumb_up_label(label).then_some(100.0),
            _ => None,
        }
    }
}

/// Find a non-empty list of hand records
fn locate_hands(document: &Value) -> Option<&Vec<Value>> {
    let mut found = first_truthy(document.as_object()?, &HAND_KEYS)?;

    if let Value::Object(nested) = found {
        found = nested.get("hands")?;
    }

    match found {
        Value::Array(hands) if !hands.is_empty() => Some(hands),
        _ => None,
    }
}

/// First value under `keys` that is present and not empty, null, false or zero
fn first_truthy<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|value| is_truthy(value))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn is_thumb_up_label(label: &str) -> bool {
    let normalized: String = label
        .chars()
        .filter(|c| *c != '_' && *c != ' ')
        .flat_map(char::to_lowercase)
        .collect();
    THUMB_UP_LABELS.contains(&normalized.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalize(document: Value) -> GestureSignal {
        ResponseNormalizer::default().normalize(&document)
    }

    #[test]
    fn test_score_map_above_threshold() {
        let signal = normalize(json!({"hands": [{"gesture": {"thumb_up": 75}}]}));
        assert!(signal.is_present());
        assert_eq!(signal.confidence(), 75.0);
    }

    #[test]
    fn test_score_at_threshold_is_not_enough() {
        let signal = normalize(json!({"hands": [{"gesture": {"thumb_up": 50}}]}));
        assert!(!signal.is_present());
        assert_eq!(signal.confidence(), 0.0);
    }

    #[test]
    fn test_label_string() {
        let signal = normalize(json!({"hands": [{"gesture": "Thumb_Up"}]}));
        assert!(signal.is_present());
        assert_eq!(signal.confidence(), 100.0);

        for label in ["thumbs up", "THUMBSUP", "thumb up", "Thumbs_Up"] {
            assert!(normalize(json!({"hands": [{"label": label}]})).is_present(), "{label}");
        }
        assert!(!normalize(json!({"hands": [{"label": "victory"}]})).is_present());
    }

    #[test]
    fn test_empty_documents() {
        assert!(!normalize(json!({})).is_present());
        assert!(!normalize(json!({"hands": []})).is_present());
        assert_eq!(normalize(json!({})).confidence(), 0.0);
    }

    #[test]
    fn test_total_over_odd_shapes() {
        for document in [
            Value::Null,
            json!(42),
            json!("thumb_up"),
            json!([{"gesture": "thumb_up"}]),
            json!({"hands": "thumb_up"}),
            json!({"hands": [1, null, "x", []]}),
            json!({"hands": [{"gesture": {"thumb_up": "99"}}]}),
            json!({"hands": [{"gesture": ["thumb_up"]}]}),
            json!({"hands": [{"gesture": 99}]}),
            json!({"result": {"faces": []}}),
            json!({"result": {"hands": {}}}),
        ] {
            let signal = normalize(document.clone());
            assert!(!signal.is_present(), "{document}");
            assert_eq!(signal.raw(), &document);
        }
    }

    #[test]
    fn test_alternate_collection_keys() {
        let signal = normalize(json!({"hand_gestures": [{"gesture_type": "thumbs_up"}]}));
        assert!(signal.is_present());

        let signal = normalize(json!({"result": {"hands": [{"gesture": {"thumb_up": 88.5}}]}}));
        assert!(signal.is_present());
        assert_eq!(signal.confidence(), 88.5);
    }

    #[test]
    fn test_empty_key_falls_through_to_next() {
        let signal = normalize(json!({
            "hands": [],
            "hand_gestures": [{"gesture": {"thumb_up": 90}}]
        }));
        assert!(signal.is_present());
        assert_eq!(signal.confidence(), 90.0);

        let signal = normalize(json!({"hands": [{"gesture": "", "label": "thumb_up"}]}));
        assert!(signal.is_present());
    }

    #[test]
    fn test_first_qualifying_hand_wins() {
        let signal = normalize(json!({"hands": [
            {"gesture": {"thumb_up": 10, "victory": 85}},
            {"gesture": {"thumb_up": 60}},
            {"gesture": {"thumb_up": 99}}
        ]}));
        assert!(signal.is_present());
        assert_eq!(signal.confidence(), 60.0);
    }

    #[test]
    fn test_disagreeing_hands_any_positive_wins() {
        let negative_first = normalize(json!({"hands": [
            {"gesture": "fist"},
            {"gesture": "thumb_up"}
        ]}));
        let positive_first = normalize(json!({"hands": [
            {"gesture": "thumb_up"},
            {"gesture": "fist"}
        ]}));
        assert!(negative_first.is_present());
        assert!(positive_first.is_present());
    }

    #[test]
    fn test_custom_threshold() {
        let strict = ResponseNormalizer::new(80.0);
        let document = json!({"hands": [{"gesture": {"thumb_up": 75}}]});
        assert!(!strict.normalize(&document).is_present());
        assert!(ResponseNormalizer::new(70.0).normalize(&document).is_present());
    }

    #[test]
    fn test_facepp_response_shape() {
        let document = json!({
            "image_id": "abc==",
            "request_id": "1500000000,xyz",
            "time_used": 212,
            "hands": [{
                "hand_rectangle": {"width": 120, "top": 80, "height": 130, "left": 200},
                "gesture": {
                    "unknown": 0.1,
                    "heart_a": 0.0,
                    "thumb_up": 97.3,
                    "victory": 1.2,
                    "fist": 0.4
                }
            }]
        });
        let signal = normalize(document);
        assert!(signal.is_present());
        assert_eq!(signal.confidence(), 97.3);
    }
}
