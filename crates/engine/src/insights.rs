//! Prediction insights
//!
//! Turns a finalized day count and the submitted features into the
//! human-readable parts of the result: an interpretation band, the top
//! contributing factors by stored importance, and rule-based advice.

use crate::models::{ContributingFactor, LongevityInterpretation, Recommendation};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

const EXCELLENT_DAYS: f64 = 1825.0;
const GOOD_DAYS: f64 = 1095.0;
const AVERAGE_DAYS: f64 = 365.0;
const BELOW_AVERAGE_DAYS: f64 = 180.0;

/// Number of contributing factors reported per prediction
const TOP_FACTORS: usize = 5;

/// Map a predicted lifespan in days to its interpretation band
pub fn interpret(days: f64) -> LongevityInterpretation {
    let (category, description, expected_lifespan, success_probability) = if days >= EXCELLENT_DAYS
    {
        (
            "Excellent",
            "This app shows strong indicators of long-term success and user retention.",
            "5+ years",
            "Very High",
        )
    } else if days >= GOOD_DAYS {
        (
            "Good",
            "This app has solid fundamentals and is likely to remain viable for years.",
            "3-5 years",
            "High",
        )
    } else if days >= AVERAGE_DAYS {
        (
            "Average",
            "This app has moderate longevity indicators, typical of the average app.",
            "1-3 years",
            "Medium",
        )
    } else if days >= BELOW_AVERAGE_DAYS {
        (
            "Below Average",
            "This app shows some concerning metrics that may limit its lifespan.",
            "6 months - 1 year",
            "Low",
        )
    } else {
        (
            "Poor",
            "This app shows significant risk factors that suggest a short lifespan.",
            "Less than 6 months",
            "Very Low",
        )
    };

    LongevityInterpretation {
        category: category.to_string(),
        description: description.to_string(),
        expected_lifespan: expected_lifespan.to_string(),
        success_probability: success_probability.to_string(),
    }
}

/// Rank the submitted features by stored importance, keeping the top few.
/// Returns `None` when the bundle shipped no importance scores.
pub fn contributing_factors(
    importances: Option<&HashMap<String, f64>>,
    values: &BTreeMap<String, Value>,
) -> Option<Vec<ContributingFactor>> {
    let importances = importances?;

    let mut ranked: Vec<(&String, &Value, f64)> = values
        .iter()
        .filter_map(|(feature, value)| {
            importances
                .get(feature)
                .map(|importance| (feature, value, *importance))
        })
        .collect();
    ranked.sort_by(|a, b| b.2.total_cmp(&a.2));

    Some(
        ranked
            .into_iter()
            .take(TOP_FACTORS)
            .map(|(feature, value, importance)| ContributingFactor {
                feature: feature.clone(),
                value: value.clone(),
                importance,
                impact: if importance > 0.0 {
                    "positive".to_string()
                } else {
                    "negative".to_string()
                },
            })
            .collect(),
    )
}

/// Rule-based advice from the submitted features, padded with generic
/// guidance when fewer than two rules fire
pub fn recommendations(values: &BTreeMap<String, Value>) -> Vec<Recommendation> {
    let mut out = Vec::new();

    if let Some(rating) = numeric(values, "rating") {
        if rating < 3.5 {
            out.push(recommendation(
                "User Satisfaction",
                "Low app rating",
                "Address common complaints in reviews and consider a major update to improve user experience.",
            ));
        } else if rating < 4.0 {
            out.push(recommendation(
                "User Satisfaction",
                "Average app rating",
                "Focus on improving specific features mentioned in user reviews to increase ratings.",
            ));
        }
    }

    if let Some(days_since_update) = numeric(values, "days_since_update") {
        if days_since_update > 90.0 {
            out.push(recommendation(
                "App Maintenance",
                "Infrequent updates",
                "Establish a regular update schedule to fix bugs and add new features.",
            ));
        }
    }

    if let Some(sentiment) = numeric(values, "avg_sentiment") {
        if sentiment < 3.0 {
            out.push(recommendation(
                "User Sentiment",
                "Negative user sentiment",
                "Analyze user reviews to identify pain points and prioritize addressing them.",
            ));
        }
    }

    if out.len() < 2 {
        out.push(recommendation(
            "User Engagement",
            "Potential engagement improvements",
            "Consider adding features that encourage daily app usage, such as notifications, rewards, or social elements.",
        ));
        out.push(recommendation(
            "Monetization",
            "Revenue optimization",
            "Review your monetization strategy compared to competitors in your category.",
        ));
    }

    out
}

fn numeric(values: &BTreeMap<String, Value>, key: &str) -> Option<f64> {
    values.get(key).and_then(Value::as_f64)
}

fn recommendation(area: &str, issue: &str, advice: &str) -> Recommendation {
    Recommendation {
        area: area.to_string(),
        issue: issue.to_string(),
        recommendation: advice.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interpretation_band_edges() {
        assert_eq!(interpret(1825.0).category, "Excellent");
        assert_eq!(interpret(1824.0).category, "Good");
        assert_eq!(interpret(1095.0).category, "Good");
        assert_eq!(interpret(365.0).category, "Average");
        assert_eq!(interpret(180.0).category, "Below Average");
        assert_eq!(interpret(179.0).category, "Poor");
        assert_eq!(interpret(0.0).category, "Poor");
    }

    #[test]
    fn test_factors_ranked_and_truncated() {
        let importances: HashMap<String, f64> = [
            ("a", 0.1),
            ("b", 0.6),
            ("c", 0.3),
            ("d", 0.2),
            ("e", 0.15),
            ("f", 0.05),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let values: BTreeMap<String, Value> = importances
            .keys()
            .map(|k| (k.clone(), json!(1.0)))
            .collect();

        let factors = contributing_factors(Some(&importances), &values).unwrap();
        assert_eq!(factors.len(), 5);
        assert_eq!(factors[0].feature, "b");
        assert_eq!(factors[1].feature, "c");
        assert!(!factors.iter().any(|f| f.feature == "f"));
    }

    #[test]
    fn test_factors_skip_unsubmitted_features() {
        let importances: HashMap<String, f64> =
            [("rating".to_string(), 0.5), ("size_mb".to_string(), 0.4)]
                .into_iter()
                .collect();
        let mut values = BTreeMap::new();
        values.insert("rating".to_string(), json!(4.5));

        let factors = contributing_factors(Some(&importances), &values).unwrap();
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].feature, "rating");
        assert_eq!(factors[0].impact, "positive");
    }

    #[test]
    fn test_negative_importance_is_negative_impact() {
        let importances: HashMap<String, f64> =
            [("days_since_update".to_string(), -0.3)].into_iter().collect();
        let mut values = BTreeMap::new();
        values.insert("days_since_update".to_string(), json!(200));

        let factors = contributing_factors(Some(&importances), &values).unwrap();
        assert_eq!(factors[0].impact, "negative");
    }

    #[test]
    fn test_no_importances_no_factors() {
        assert!(contributing_factors(None, &BTreeMap::new()).is_none());
    }

    #[test]
    fn test_recommendations_fire_on_weak_metrics() {
        let mut values = BTreeMap::new();
        values.insert("rating".to_string(), json!(3.0));
        values.insert("days_since_update".to_string(), json!(120));
        values.insert("avg_sentiment".to_string(), json!(2.5));

        let recs = recommendations(&values);
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].issue, "Low app rating");
        assert_eq!(recs[1].area, "App Maintenance");
        assert_eq!(recs[2].area, "User Sentiment");
    }

    #[test]
    fn test_healthy_app_gets_generic_advice() {
        let mut values = BTreeMap::new();
        values.insert("rating".to_string(), json!(4.6));
        values.insert("days_since_update".to_string(), json!(14));
        values.insert("avg_sentiment".to_string(), json!(4.4));

        let recs = recommendations(&values);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].area, "User Engagement");
        assert_eq!(recs[1].area, "Monetization");
    }

    #[test]
    fn test_single_rule_padded_with_generics() {
        let mut values = BTreeMap::new();
        values.insert("rating".to_string(), json!(3.8));

        let recs = recommendations(&values);
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].issue, "Average app rating");
    }
}
