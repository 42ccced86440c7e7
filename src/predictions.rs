//! Price/time prediction scoring.
//!
//! Predictions live in the event log as PREDICTION rows; settlement scores
//! every one of them exactly once against the realized settle price and time,
//! producing a paired PREDICTION_SCORED row (even for a score of 0).

use chrono::{DateTime, Utc};

use crate::models::{json_number, parse_instant, EventLog};

/// One user's prediction, extracted from a PREDICTION event payload.
#[derive(Debug, Clone)]
pub struct PredictionRecord {
    pub user_id: String,
    pub price_eth: Option<f64>,
    pub time: Option<DateTime<Utc>>,
}

/// Scored prediction, all components rounded integers in [0, 100].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredPrediction {
    pub user_id: String,
    pub score: u32,
    pub price_score: u32,
    pub time_score: u32,
}

/// Extract a prediction from an event row. Malformed payloads degrade to an
/// anonymous empty prediction rather than being dropped: every PREDICTION row
/// gets scored.
pub fn prediction_from_event(event: &EventLog) -> PredictionRecord {
    let payload = event.payload.as_ref();
    let user_id = payload
        .and_then(|p| p.get("userId"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("anon")
        .to_string();
    let predict = payload.and_then(|p| p.get("predict"));
    let price_eth = predict.and_then(|p| p.get("priceEth")).and_then(json_number);
    let time = predict
        .and_then(|p| p.get("time"))
        .and_then(|v| v.as_str())
        .and_then(parse_instant);
    PredictionRecord {
        user_id,
        price_eth,
        time,
    }
}

/// Score a batch of predictions against the realized settle price and time.
///
/// Component scores:
/// - price: `max(0, 100 - |pred - actual| / max(0.01, actual) * 100)` when a
///   numeric prediction exists and the actual price is positive, else 0.
/// - time: `max(0, 100 - delta_seconds / 60)` when a time was predicted.
///
/// Combined score averages the two components only when the predicted price
/// is truthy; a predicted price of exactly 0 falls into the price-only branch
/// and scores 0 even when a time is present. Kept as-is: callers rely on the
/// historical behavior.
pub fn score_predictions(
    predictions: &[PredictionRecord],
    actual_price_eth: f64,
    actual_time: DateTime<Utc>,
) -> Vec<ScoredPrediction> {
    predictions
        .iter()
        .map(|p| score_one(p, actual_price_eth, actual_time))
        .collect()
}

fn score_one(
    prediction: &PredictionRecord,
    actual_price_eth: f64,
    actual_time: DateTime<Utc>,
) -> ScoredPrediction {
    let price_score = match prediction.price_eth {
        Some(pred) if actual_price_eth > 0.0 => {
            let denom = actual_price_eth.max(0.01);
            (100.0 - (pred - actual_price_eth).abs() / denom * 100.0).max(0.0)
        }
        _ => 0.0,
    };

    let time_score = match prediction.time {
        Some(pred) => {
            let delta_secs = (pred - actual_time).num_milliseconds().abs() as f64 / 1000.0;
            (100.0 - delta_secs / 60.0).max(0.0)
        }
        None => 0.0,
    };

    let both = prediction.price_eth.map_or(false, |p| p != 0.0) && prediction.time.is_some();
    let combined = if both {
        (price_score + time_score) / 2.0
    } else if prediction.price_eth.is_none() {
        time_score
    } else {
        price_score
    };

    ScoredPrediction {
        user_id: prediction.user_id.clone(),
        score: round_score(combined),
        price_score: round_score(price_score),
        time_score: round_score(time_score),
    }
}

fn round_score(v: f64) -> u32 {
    v.clamp(0.0, 100.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(price: Option<f64>, time: Option<DateTime<Utc>>) -> PredictionRecord {
        PredictionRecord {
            user_id: "u1".into(),
            price_eth: price,
            time,
        }
    }

    #[test]
    fn exact_price_scores_100() {
        let now = Utc::now();
        let scored = score_predictions(&[record(Some(2.0), None)], 2.0, now);
        assert_eq!(scored[0].price_score, 100);
        assert_eq!(scored[0].score, 100);
        assert_eq!(scored[0].time_score, 0);
    }

    #[test]
    fn exact_time_scores_100() {
        let now = Utc::now();
        let scored = score_predictions(&[record(None, Some(now))], 2.0, now);
        assert_eq!(scored[0].time_score, 100);
        assert_eq!(scored[0].score, 100);
        assert_eq!(scored[0].price_score, 0);
    }

    #[test]
    fn both_components_average() {
        let now = Utc::now();
        // Price half off => 50; time 30 minutes off => 70.
        let scored = score_predictions(
            &[record(Some(2.0), Some(now + Duration::minutes(30)))],
            4.0,
            now,
        );
        assert_eq!(scored[0].price_score, 50);
        assert_eq!(scored[0].time_score, 70);
        assert_eq!(scored[0].score, 60);
    }

    #[test]
    fn zero_predicted_price_is_treated_as_absent_in_the_gate() {
        let now = Utc::now();
        // Predicted price 0 with an exact time: the combined score takes the
        // price-only branch (0), not the average, and not the time score.
        let scored = score_predictions(&[record(Some(0.0), Some(now))], 2.0, now);
        assert_eq!(scored[0].time_score, 100);
        assert_eq!(scored[0].price_score, 0);
        assert_eq!(scored[0].score, 0);
    }

    #[test]
    fn time_more_than_100_minutes_off_scores_zero() {
        let now = Utc::now();
        let scored = score_predictions(&[record(None, Some(now + Duration::minutes(101)))], 2.0, now);
        assert_eq!(scored[0].time_score, 0);
        assert_eq!(scored[0].score, 0);
    }

    #[test]
    fn zero_actual_price_zeroes_the_price_component() {
        let now = Utc::now();
        let scored = score_predictions(&[record(Some(1.0), None)], 0.0, now);
        assert_eq!(scored[0].price_score, 0);
        assert_eq!(scored[0].score, 0);
    }

    #[test]
    fn tiny_actual_price_uses_floor_denominator() {
        let now = Utc::now();
        // actual 0.005 < 0.01 floor: |0.005 - 0.005| is 0 so still exact,
        // but an 0.01-off prediction is penalized against the floor.
        let scored = score_predictions(&[record(Some(0.015), None)], 0.005, now);
        assert_eq!(scored[0].price_score, 0);
    }

    #[test]
    fn empty_prediction_scores_zero_everywhere() {
        let now = Utc::now();
        let scored = score_predictions(&[record(None, None)], 2.0, now);
        assert_eq!(scored[0].score, 0);
        assert_eq!(scored[0].price_score, 0);
        assert_eq!(scored[0].time_score, 0);
    }

    #[test]
    fn malformed_event_payload_degrades_to_anon() {
        let event = EventLog {
            id: "e1".into(),
            auction_id: "a1".into(),
            kind: crate::models::EventType::Prediction,
            payload: Some(serde_json::json!({"predict": {"priceEth": "garbage"}})),
            tx_hash: None,
            created_at: Utc::now(),
        };
        let record = prediction_from_event(&event);
        assert_eq!(record.user_id, "anon");
        assert!(record.price_eth.is_none());
        assert!(record.time.is_none());
    }
}
