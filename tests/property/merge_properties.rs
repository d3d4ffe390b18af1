//! Property-based tests for field-level last-writer-wins merging

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use soulstore::merge::merge_at;
use soulstore::types::Node;
use std::collections::BTreeMap;

const NOW: u64 = 1_000_000;

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[a-z]{0,8}".prop_map(Value::from),
    ]
}

/// Field name -> (value, state), states kept below NOW.
fn fields() -> impl Strategy<Value = BTreeMap<String, (Value, u32)>> {
    prop::collection::btree_map("[a-f]{1,2}", (scalar(), 1u32..10_000), 0..6)
}

/// Like [`fields`], but some values are child nodes with their own states.
fn nested_fields() -> impl Strategy<Value = BTreeMap<String, (Value, u32)>> {
    let child = prop::collection::btree_map("[a-f]{1,2}", (scalar(), 1u32..10_000), 0..4)
        .prop_map(|child| build(&child).into_value());
    let value = prop_oneof![3 => scalar(), 1 => child];
    prop::collection::btree_map("[a-f]{1,2}", (value, 1u32..10_000), 0..6)
}

fn build(fields: &BTreeMap<String, (Value, u32)>) -> Node {
    let mut map = Map::new();
    let mut states = Map::new();
    for (name, (value, state)) in fields {
        map.insert(name.clone(), value.clone());
        states.insert(name.clone(), json!(state));
    }
    map.insert("_".to_string(), json!({ ">": states }));
    Node::from_map(map)
}

proptest! {
    #[test]
    fn merging_a_node_with_itself_changes_nothing(a in fields()) {
        let node = build(&a);
        let merged = merge_at(Some(&node), Some(&node), NOW).unwrap();
        prop_assert_eq!(merged, node);
    }

    #[test]
    fn reapplying_the_same_update_changes_nothing(a in nested_fields(), b in nested_fields()) {
        let (x, y) = (build(&a), build(&b));
        let once = merge_at(Some(&x), Some(&y), NOW).unwrap();
        let twice = merge_at(Some(&once), Some(&y), NOW).unwrap();
        prop_assert_eq!(twice, once);
    }

    #[test]
    fn merging_a_nested_node_with_itself_changes_nothing(a in nested_fields()) {
        let node = build(&a);
        let merged = merge_at(Some(&node), Some(&node), NOW).unwrap();
        prop_assert_eq!(merged, node);
    }

    #[test]
    fn every_field_of_either_side_survives(a in fields(), b in fields()) {
        let merged = merge_at(Some(&build(&a)), Some(&build(&b)), NOW).unwrap();
        for name in a.keys().chain(b.keys()) {
            prop_assert!(merged.get(name).is_some(), "field {} lost", name);
            prop_assert!(merged.state(name).is_some(), "state for {} lost", name);
        }
        prop_assert_eq!(merged.fields().count(), a.keys().chain(b.keys()).collect::<std::collections::BTreeSet<_>>().len());
    }

    #[test]
    fn strictly_newer_state_wins(a in fields(), b in fields()) {
        let merged = merge_at(Some(&build(&a)), Some(&build(&b)), NOW).unwrap();
        for (name, (new_value, new_state)) in &b {
            let expected = match a.get(name) {
                Some((old_value, old_state)) if old_state >= new_state => (old_value, old_state),
                _ => (new_value, new_state),
            };
            prop_assert_eq!(merged.get(name), Some(expected.0));
            prop_assert_eq!(merged.state(name), Some(*expected.1 as f64));
        }
    }

    #[test]
    fn order_does_not_matter_when_states_differ(a in fields(), b in fields()) {
        let conflicting_tie = a
            .iter()
            .any(|(name, (_, state))| b.get(name).map(|(_, s)| s == state).unwrap_or(false));
        prop_assume!(!conflicting_tie);

        let (x, y) = (build(&a), build(&b));
        let ab = merge_at(Some(&x), Some(&y), NOW).unwrap();
        let ba = merge_at(Some(&y), Some(&x), NOW).unwrap();
        prop_assert_eq!(ab, ba);
    }

    #[test]
    fn stateless_incoming_fields_always_win(a in fields(), value in scalar()) {
        prop_assume!(!a.is_empty());
        let name = a.keys().next().unwrap().clone();
        let incoming = Node::new().with_value(&name, value.clone());

        let merged = merge_at(Some(&build(&a)), Some(&incoming), NOW).unwrap();
        prop_assert_eq!(merged.get(&name), Some(&value));
        prop_assert_eq!(merged.state(&name), Some(NOW as f64));
    }
}
