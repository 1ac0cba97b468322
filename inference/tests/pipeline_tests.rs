use std::sync::Arc;

use inference::testing::Fixture;
use inference::{Predict, SentimentLabel, SentimentPredictor, MAX_SEQ_LEN};

fn predictor() -> SentimentPredictor {
    Fixture::module()
        .and_then(|fixture| fixture.predictor())
        .expect("Should build fixture predictor")
}

#[test]
fn test_encoded_length_is_fixed() {
    let predictor = predictor();
    let long = "great ".repeat(3 * MAX_SEQ_LEN);
    for text in ["", "good", "I love this product! It's amazing!", long.as_str()] {
        assert_eq!(predictor.encode(text).len(), MAX_SEQ_LEN + 1, "length for {text:?}");
    }
}

#[test]
fn test_end_to_end_phrases() {
    let predictor = predictor();

    let positive = predictor.predict("I love this product! It's amazing!");
    assert!(positive.success);
    assert_eq!(positive.label, SentimentLabel::Positive);
    assert!(positive.sentiment_score > 0.0);

    let negative = predictor.predict("This is terrible and awful!");
    assert!(negative.success);
    assert_eq!(negative.label, SentimentLabel::Negative);
    assert!(negative.sentiment_score < 0.0);
}

#[test]
fn test_empty_text_is_degenerate_not_error() {
    let result = predictor().predict("");
    assert!(result.success);
    assert_eq!(result.label, SentimentLabel::Negative);
    assert!((result.confidence - 0.5).abs() < 1e-6);
    assert!(result.sentiment_score.abs() < 1e-6);
    assert!(result.error.is_none());
}

#[test]
fn test_successful_results_are_bounded() {
    let predictor = predictor();
    let texts = [
        "good good good",
        "bad",
        "I hate this, it is the worst",
        "zebra quokka",
        "the product was excellent . the movie was horrible",
    ];
    for result in predictor.predict_batch(&texts) {
        assert!(result.success, "{:?}", result.error);
        assert!((0.0..=1.0).contains(&result.confidence));
        assert!(result.confidence >= 0.5, "chosen class can never be below one half");
        assert_ne!(result.label, SentimentLabel::Error);
        assert!(result.processing_time >= 0.0);
        assert_eq!(result.request_id.len(), 36);
    }
}

#[test]
fn test_prediction_is_idempotent() {
    let predictor = predictor();
    let text = "the movie was not bad";
    let first = predictor.predict(text);
    let second = predictor.predict(text);

    assert_eq!(first.label, second.label);
    assert_eq!(first.confidence, second.confidence);
    assert_eq!(first.sentiment_score, second.sentiment_score);
    assert_ne!(first.request_id, second.request_id);
}

#[test]
fn test_confidence_and_score_are_distinct_quantities() {
    let result = predictor().predict("I love this product! It's amazing!");
    let [negative, positive] = predictor()
        .logits("I love this product! It's amazing!")
        .unwrap();

    assert!((result.sentiment_score - (positive - negative)).abs() < 1e-9);
    assert!(result.sentiment_score > 1.0, "score is an unbounded logit gap");
    assert!(result.confidence < 1.0);
}

#[tokio::test]
async fn test_concurrent_predictions_share_one_model() {
    let predictor = Arc::new(predictor());
    let expected = predictor.predict("This is terrible and awful!");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let predictor = Arc::clone(&predictor);
            tokio::task::spawn_blocking(move || predictor.predict("This is terrible and awful!"))
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap();
        assert_eq!(result.label, expected.label);
        assert_eq!(result.confidence, expected.confidence);
        assert_eq!(result.sentiment_score, expected.sentiment_score);
    }
}
