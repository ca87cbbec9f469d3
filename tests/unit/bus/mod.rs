use super::*;

#[test]
fn messages_use_kind_tag_and_customer_id() {
    let msg = BusMessage::SetFilter {
        customer_id: "Acme".to_string(),
    };
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json, serde_json::json!({"kind": "SET_FILTER", "customerId": "Acme"}));

    let parsed: BusMessage =
        serde_json::from_str(r#"{"kind":"START_TAGGING","customer":"Globex"}"#).unwrap();
    assert_eq!(
        parsed,
        BusMessage::StartTagging {
            customer_id: "Globex".to_string()
        }
    );

    let stop: BusMessage = serde_json::from_str(r#"{"kind":"STOP_TAGGING"}"#).unwrap();
    assert_eq!(stop, BusMessage::StopTagging { customer_id: None });

    let right: BusMessage =
        serde_json::from_str(r#"{"kind":"TAG_LAST_RIGHT_CLICKED","customerId":"A"}"#).unwrap();
    assert!(matches!(right, BusMessage::TagLastRightClicked { .. }));
}

#[test]
fn publish_reaches_every_other_frame() {
    let bus = LocalBus::new();
    let a = bus.join(FrameId(1));
    let b = bus.join(FrameId(2));
    let msg = BusMessage::StopTagging { customer_id: None };
    bus.publish(FrameId(1), msg.clone()).unwrap();

    assert!(a.try_recv().is_err());
    let env = b.try_recv().unwrap();
    assert_eq!(env.from, FrameId(1));
    assert_eq!(env.message, msg);
    assert!(b.try_recv().is_err());
}

#[test]
fn closed_inboxes_are_pruned() {
    let bus = LocalBus::new();
    let a = bus.join(FrameId(1));
    drop(bus.join(FrameId(2)));
    assert_eq!(bus.frames(), 2);
    bus.publish(FrameId(3), BusMessage::StopTagging { customer_id: None })
        .unwrap();
    assert_eq!(bus.frames(), 1);
    assert!(a.try_recv().is_ok());
    bus.leave(FrameId(1));
    assert_eq!(bus.frames(), 0);
}

#[test]
fn unavailable_bus_is_transient() {
    let bus = LocalBus::new();
    bus.set_available(false);
    let err = bus
        .publish(FrameId(1), BusMessage::StopTagging { customer_id: None })
        .unwrap_err();
    assert!(err.is_transient());
}
