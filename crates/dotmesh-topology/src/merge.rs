//! Conservative merge of a [`TopologyPlan`] and a role template into a live
//! runtime config.
//!
//! Ownership rules:
//! - `Addresses.Announce`, `Bootstrap` and `Peering.Peers` belong to the
//!   reconciler and are replaced wholesale.
//! - `Routing.Type` follows the template when the template sets it.
//! - `Swarm`, `Pubsub` and `Provide` are merged key by key; a value already
//!   in the live config always wins over the template.
//! - `Reprovider` is dropped.
//! - Everything else, `Identity` included, is carried through untouched.

use serde_json::{Map, Value};

use crate::live_config::{AddressesSection, LiveConfig, PeeringSection, RoutingSection};
use crate::planner::TopologyPlan;
use crate::profile::RoleProfile;

/// Add template keys missing from `live`, recursing into objects present on
/// both sides. Arrays and scalars are leaves: the template only fills them
/// when the live side has no value (absent or `null`).
pub fn merge_tree(live: &mut Map<String, Value>, template: &Map<String, Value>) {
    for (key, template_value) in template {
        let slot = live.entry(key.clone()).or_insert(Value::Null);
        if slot.is_null() {
            *slot = template_value.clone();
        } else if let (Value::Object(live_obj), Value::Object(template_obj)) = (slot, template_value) {
            merge_tree(live_obj, template_obj);
        }
    }
}

fn merge_region(live: &mut Option<Map<String, Value>>, template: Option<&Map<String, Value>>) {
    if let Some(template) = template {
        merge_tree(live.get_or_insert_with(Map::new), template);
    }
}

/// Apply `plan` and `profile` to `live` and return the document to push.
pub fn merge(mut live: LiveConfig, plan: &TopologyPlan, profile: &RoleProfile) -> LiveConfig {
    live.addresses
        .get_or_insert_with(AddressesSection::default)
        .announce = Some(plan.announce.clone());

    live.bootstrap = Some(plan.bootstrap.clone());
    live.peering
        .get_or_insert_with(PeeringSection::default)
        .peers = Some(plan.peering.clone());

    if let Some(routing_type) = profile.routing_type() {
        live.routing
            .get_or_insert_with(RoutingSection::default)
            .routing_type = Some(routing_type.to_owned());
    }

    merge_region(&mut live.swarm, profile.swarm.as_ref());
    merge_region(&mut live.pubsub, profile.pubsub.as_ref());
    merge_region(&mut live.provide, profile.provide.as_ref());

    live.reprovider = None;
    live
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
