//! Built-in car profile.

use super::{
    NodeResult, Profile, ProfileProperties, ProfileSource, WayResult, TRAVEL_MODE_DEFAULT,
};
use crate::osm::{RawNode, RawWay};

/// Highway classes a car may use, with their default speeds in km/h.
/// The index in this table doubles as the highway classification id.
const SPEEDS: &[(&str, f64)] = &[
    ("motorway", 90.0),
    ("motorway_link", 45.0),
    ("trunk", 85.0),
    ("trunk_link", 40.0),
    ("primary", 65.0),
    ("primary_link", 30.0),
    ("secondary", 55.0),
    ("secondary_link", 25.0),
    ("tertiary", 40.0),
    ("tertiary_link", 20.0),
    ("unclassified", 25.0),
    ("residential", 25.0),
    ("living_street", 10.0),
    ("service", 15.0),
];

const TRAFFIC_SIGNAL_PENALTY_DS: i32 = 20; // 2 seconds
const U_TURN_PENALTY_DS: i32 = 200; // 20 seconds
const TURN_PENALTY_DS: f64 = 75.0;

#[derive(Debug, Default)]
pub struct CarProfile;

impl ProfileSource for CarProfile {
    fn name(&self) -> &str {
        "car"
    }

    fn properties(&self) -> ProfileProperties {
        ProfileProperties {
            traffic_signal_penalty: TRAFFIC_SIGNAL_PENALTY_DS,
            u_turn_penalty: U_TURN_PENALTY_DS,
            allow_u_turns: false,
            use_turn_restrictions: true,
        }
    }

    fn make_state(&self) -> Box<dyn Profile + '_> {
        Box::new(CarState)
    }
}

struct CarState;

impl Profile for CarState {
    fn node_function(&mut self, node: &RawNode, out: &mut NodeResult) {
        if let Some(barrier) = node.tags.get("barrier") {
            out.barrier = !matches!(barrier, "gate" | "entrance" | "no" | "toll_booth");
        }
        if node.tags.get("highway") == Some("traffic_signals") {
            out.traffic_light = true;
        }
    }

    fn way_function(&mut self, way: &RawWay, out: &mut WayResult) {
        let highway = match way.tags.get("highway") {
            Some(h) => h,
            None => return,
        };
        let class_and_speed = SPEEDS
            .iter()
            .enumerate()
            .find(|(_, (name, _))| *name == highway);
        let (class, speed) = match class_and_speed {
            Some((idx, (_, speed))) => (idx as u16, *speed),
            None => return,
        };

        match way.tags.get("access") {
            Some("no") | Some("private") => return,
            Some("destination") => out.access_restricted = true,
            _ => {}
        }

        let speed = match way.tags.get("maxspeed").and_then(parse_maxspeed) {
            Some(max) if max < speed => max,
            _ => speed,
        };

        out.roundabout = way.tags.get("junction") == Some("roundabout");

        // Oneway: explicit tag wins; roundabouts and motorways imply it.
        let oneway = match way.tags.get("oneway") {
            Some("yes") | Some("1") | Some("true") => Some(true),
            Some("-1") | Some("reverse") => Some(false),
            Some("no") | Some("0") | Some("false") => None,
            _ if out.roundabout || highway == "motorway" || highway == "motorway_link" => {
                Some(true)
            }
            _ => None,
        };
        match oneway {
            Some(true) => out.forward_speed = speed,
            Some(false) => out.backward_speed = speed,
            None => {
                out.forward_speed = speed;
                out.backward_speed = speed;
            }
        }

        if let Some(name) = way.tags.get("name") {
            out.name = name.to_string();
        }
        out.travel_mode = TRAVEL_MODE_DEFAULT;
        out.highway_class = class;
    }

    fn turn_function(&mut self, angle: f64) -> i32 {
        // Quadratic in the deviation from straight-through (180 degrees):
        // a 90-degree turn costs the full turn penalty, gentle curves next
        // to nothing.
        let deviation = (angle - 180.0).abs().min(180.0);
        (TURN_PENALTY_DS * (deviation * deviation) / (90.0 * 90.0)) as i32
    }
}

fn parse_maxspeed(value: &str) -> Option<f64> {
    if let Some(mph) = value.strip_suffix(" mph") {
        return mph.trim().parse::<f64>().ok().map(|v| v * 1.609_344);
    }
    value.trim().parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osm::RawTags;

    fn way(tags: &[(&str, &str)]) -> RawWay {
        RawWay {
            id: 1,
            node_refs: vec![1, 2],
            tags: RawTags::new(
                tags.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
        }
    }

    #[test]
    fn residential_is_bidirectional() {
        let mut state = CarProfile.make_state();
        let mut out = WayResult::default();
        state.way_function(&way(&[("highway", "residential")]), &mut out);
        assert!(out.forward() && out.backward());
        assert_eq!(out.forward_speed, 25.0);
    }

    #[test]
    fn oneway_reverse_flips_direction() {
        let mut state = CarProfile.make_state();
        let mut out = WayResult::default();
        state.way_function(
            &way(&[("highway", "primary"), ("oneway", "-1")]),
            &mut out,
        );
        assert!(!out.forward() && out.backward());
    }

    #[test]
    fn footway_is_rejected() {
        let mut state = CarProfile.make_state();
        let mut out = WayResult::default();
        state.way_function(&way(&[("highway", "footway")]), &mut out);
        assert!(!out.forward() && !out.backward());
    }

    #[test]
    fn maxspeed_caps_class_speed() {
        let mut state = CarProfile.make_state();
        let mut out = WayResult::default();
        state.way_function(
            &way(&[("highway", "primary"), ("maxspeed", "30")]),
            &mut out,
        );
        assert_eq!(out.forward_speed, 30.0);
    }

    #[test]
    fn straight_through_is_free() {
        let mut state = CarProfile.make_state();
        assert_eq!(state.turn_function(180.0), 0);
        assert!(state.turn_function(90.0) > 0);
        assert!(state.turn_function(90.0) <= state.turn_function(10.0));
    }
}
