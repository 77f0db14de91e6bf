use crate::compliance::domain::OrganizationId;
use crate::compliance::request::{EvaluateRequest, ValidationError};
use serde_json::json;

fn parse(value: serde_json::Value) -> EvaluateRequest {
    serde_json::from_value(value).expect("request parses")
}

#[test]
fn into_parts_maps_nested_call_data() {
    let request = parse(json!({
        "organizationId": " org-acme ",
        "callData": {
            "transcript": { "keywords": ["refund", "refund", "cancel"] },
            "sentiment": { "score": -0.4 },
            "duration": 95.8,
            "topics": ["billing"]
        }
    }));

    let (organization_id, signals) = request.into_parts().expect("valid request");

    assert_eq!(organization_id, OrganizationId("org-acme".to_string()));
    assert_eq!(signals.keywords.len(), 2);
    assert!(signals.keywords.contains("cancel"));
    assert_eq!(signals.sentiment, Some(-0.4));
    assert_eq!(signals.duration, Some(95));
    assert!(signals.topics.contains("billing"));
}

#[test]
fn missing_signals_stay_absent() {
    let request = parse(json!({
        "organizationId": "org-acme",
        "callData": { "sentiment": {} }
    }));

    let (_, signals) = request.into_parts().expect("valid request");

    assert!(signals.keywords.is_empty());
    assert_eq!(signals.sentiment, None);
    assert_eq!(signals.sentiment_or_default(), 0.0);
    assert_eq!(signals.duration_or_default(), 0);
}

#[test]
fn negative_durations_read_as_zero() {
    let request = parse(json!({
        "organizationId": "org-acme",
        "callData": { "duration": -12 }
    }));

    let (_, signals) = request.into_parts().expect("valid request");
    assert_eq!(signals.duration, Some(0));
}

#[test]
fn null_call_data_is_missing() {
    let request = parse(json!({ "organizationId": "org-acme", "callData": null }));

    assert_eq!(
        request.into_parts().unwrap_err(),
        ValidationError::MissingCallData
    );
}

#[test]
fn organization_is_checked_before_call_data() {
    let request = parse(json!({}));

    assert_eq!(
        request.into_parts().unwrap_err(),
        ValidationError::MissingOrganizationId
    );
}

#[test]
fn null_lists_read_as_empty() {
    let request = parse(json!({
        "organizationId": "org-acme",
        "callData": { "transcript": { "keywords": null }, "topics": null }
    }));

    let (_, signals) = request.into_parts().expect("valid request");
    assert!(signals.keywords.is_empty());
    assert!(signals.topics.is_empty());
}
