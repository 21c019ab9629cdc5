use super::*;
use serde_json::json;

fn params(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[test]
fn descriptor_merges_channel() {
    let d = descriptor("RoomChannel", &params(json!({ "id": 1 })));
    assert_eq!(Value::Object(d), json!({ "channel": "RoomChannel", "id": 1 }));
}

#[test]
fn descriptor_channel_wins_over_params() {
    let d = descriptor("RoomChannel", &params(json!({ "channel": "Other" })));
    assert_eq!(d.get("channel"), Some(&json!("RoomChannel")));
}

#[test]
fn identifier_is_stable_across_param_order() {
    let a = identifier(&descriptor("Room", &params(json!({ "a": 1, "b": 2 }))));
    let b = identifier(&descriptor("Room", &params(json!({ "b": 2, "a": 1 }))));
    assert_eq!(a, b);
    assert_eq!(a, r#"{"a":1,"b":2,"channel":"Room"}"#);
}

#[test]
fn subscribe_command_json() {
    let cmd = Command::subscribe(r#"{"channel":"Room"}"#);
    let value: Value = serde_json::from_str(&cmd.to_json().unwrap()).unwrap();
    assert_eq!(value, json!({ "command": "subscribe", "identifier": "{\"channel\":\"Room\"}" }));
}

#[test]
fn perform_nests_action_in_data_string() {
    let cmd = Command::perform("id", "speak", params(json!({ "body": "hi" })));
    assert_eq!(cmd.command, CommandKind::Message);
    let data: Value = serde_json::from_str(cmd.data.as_deref().unwrap()).unwrap();
    assert_eq!(data, json!({ "action": "speak", "body": "hi" }));
}

#[test]
fn parses_control_frames() {
    assert_eq!(parse_event(r#"{"type":"welcome"}"#).unwrap(), CableEvent::Welcome);
    assert_eq!(parse_event(r#"{"type":"ping","message":1700000000}"#).unwrap(), CableEvent::Ping);
    assert_eq!(
        parse_event(r#"{"type":"confirm_subscription","identifier":"x"}"#).unwrap(),
        CableEvent::Confirm { identifier: "x".to_owned() }
    );
    assert_eq!(
        parse_event(r#"{"type":"reject_subscription","identifier":"x"}"#).unwrap(),
        CableEvent::Reject { identifier: "x".to_owned() }
    );
    assert_eq!(
        parse_event(r#"{"type":"disconnect","reason":"unauthorized","reconnect":false}"#).unwrap(),
        CableEvent::Disconnect { reason: Some("unauthorized".to_owned()), reconnect: false }
    );
}

#[test]
fn parses_data_message() {
    let event = parse_event(r#"{"identifier":"x","message":{"kind":"match"}}"#).unwrap();
    assert_eq!(event, CableEvent::Message { identifier: "x".to_owned(), message: json!({ "kind": "match" }) });
}

#[test]
fn data_message_without_identifier_is_error() {
    assert!(matches!(parse_event(r#"{"message":1}"#), Err(ProtocolError::MissingField("identifier"))));
}

#[test]
fn unknown_type_is_preserved() {
    assert_eq!(parse_event(r#"{"type":"shiny"}"#).unwrap(), CableEvent::Unknown("shiny".to_owned()));
}

#[test]
fn garbage_is_error() {
    assert!(matches!(parse_event("not json"), Err(ProtocolError::Json(_))));
}
