//! Property-based tests for permission resolution.

use proptest::prelude::*;

use crate::action::Action;
use crate::permissions::{Permissions, Verdict};

fn verdict() -> impl Strategy<Value = Verdict> {
    prop_oneof![Just(Verdict::Allow), Just(Verdict::Deny), Just(Verdict::Ask)]
}

fn action() -> impl Strategy<Value = Action> {
    prop::sample::select(Action::ALL.to_vec())
}

/// A tree built from optional entries at each of the four levels.
#[derive(Debug, Clone)]
struct Layers {
    resource_action: Option<Verdict>,
    resource_else: Option<Verdict>,
    default_action: Option<Verdict>,
    default_else: Option<Verdict>,
}

fn layers() -> impl Strategy<Value = Layers> {
    (
        proptest::option::of(verdict()),
        proptest::option::of(verdict()),
        proptest::option::of(verdict()),
        proptest::option::of(verdict()),
    )
        .prop_map(|(ra, re, da, de)| Layers {
            resource_action: ra,
            resource_else: re,
            default_action: da,
            default_else: de,
        })
}

fn build(layers: &Layers, action: Action) -> Permissions {
    let mut map = serde_json::json!({"default": {}, "resources": {}});
    if let Some(v) = layers.default_else {
        map["default"]["else"] = serde_json::json!(v);
    }
    if let Some(v) = layers.default_action {
        map["default"]["actions"] = serde_json::json!({ action.as_str(): v });
    }
    if layers.resource_action.is_some() || layers.resource_else.is_some() {
        let mut node = serde_json::json!({});
        if let Some(v) = layers.resource_else {
            node["else"] = serde_json::json!(v);
        }
        if let Some(v) = layers.resource_action {
            node["actions"] = serde_json::json!({ action.as_str(): v });
        }
        map["resources"]["Widget"] = node;
    }
    Permissions::from_map(&map).unwrap()
}

proptest! {
    #[test]
    fn prop_resolution_follows_priority(layers in layers(), action in action()) {
        let permissions = build(&layers, action);
        let expected = layers
            .resource_action
            .or(layers.resource_else)
            .or(layers.default_action)
            .or(layers.default_else)
            .unwrap_or(Verdict::Deny);
        prop_assert_eq!(permissions.permitted("Widget", action), expected);
    }

    #[test]
    fn prop_unrelated_resource_entries_do_not_leak(
        layers in layers(),
        action in action(),
        other_action in action(),
        other_verdict in verdict(),
    ) {
        let mut permissions = build(&layers, action);
        let before = permissions.permitted("Widget", action);

        permissions.set_resource("Gadget", other_action, other_verdict);
        permissions.set_resource_fallback("Gadget", other_verdict);

        prop_assert_eq!(permissions.permitted("Widget", action), before);
    }

    #[test]
    fn prop_map_round_trip_preserves_verdicts(layers in layers(), action in action()) {
        let permissions = build(&layers, action);
        let restored = Permissions::from_map(&permissions.to_map()).unwrap();
        for a in Action::ALL {
            prop_assert_eq!(restored.permitted("Widget", a), permissions.permitted("Widget", a));
            prop_assert_eq!(restored.permitted("Gadget", a), permissions.permitted("Gadget", a));
        }
    }
}
