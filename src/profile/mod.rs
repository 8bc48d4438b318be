//! Profile interface.
//!
//! A profile classifies raw elements into routable attributes and prices
//! turns. It is an opaque callable with four entry points: properties
//! (the source function), a per-node function, a per-way function, and a
//! turn-angle pricing function. Profile state is not shared across threads;
//! the pipeline asks the [`ProfileSource`] for one state handle per worker
//! thread and never migrates handles.

pub mod car;

use crate::osm::{RawNode, RawWay};

pub use car::CarProfile;

/// Travel mode carried on every edge. 0 is reserved for "inaccessible".
pub const TRAVEL_MODE_INACCESSIBLE: u8 = 0;
pub const TRAVEL_MODE_DEFAULT: u8 = 1;

/// Returned by `turn_function` to veto a turn entirely.
pub const TURN_REFUSED: i32 = -1;

/// Global pricing knobs exposed by the profile before parsing starts.
#[derive(Debug, Clone, Copy)]
pub struct ProfileProperties {
    /// Added to edge weights crossing a traffic signal, in deci-seconds.
    pub traffic_signal_penalty: i32,
    /// Added to every permitted u-turn, in deci-seconds.
    pub u_turn_penalty: i32,
    /// Permit u-turns at through nodes too. Dead ends always allow them.
    pub allow_u_turns: bool,
    /// Whether turn restrictions from the input are honored at all.
    pub use_turn_restrictions: bool,
}

/// Per-node classification result.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeResult {
    pub barrier: bool,
    pub traffic_light: bool,
}

/// Per-way classification result. Speeds are km/h; a non-positive speed
/// marks the direction as not traversable.
#[derive(Debug, Clone, Default)]
pub struct WayResult {
    pub forward_speed: f64,
    pub backward_speed: f64,
    pub name: String,
    pub roundabout: bool,
    pub access_restricted: bool,
    pub ignore_in_grid: bool,
    pub travel_mode: u8,
    pub highway_class: u16,
}

impl WayResult {
    pub fn forward(&self) -> bool {
        self.forward_speed > 0.0
    }

    pub fn backward(&self) -> bool {
        self.backward_speed > 0.0
    }
}

/// One profile state handle. Owned by a single worker thread.
pub trait Profile: Send {
    fn node_function(&mut self, node: &RawNode, out: &mut NodeResult);
    fn way_function(&mut self, way: &RawWay, out: &mut WayResult);

    /// Price a turn by its angle in degrees, where 180 is straight through.
    /// Returns a penalty in deci-seconds, or [`TURN_REFUSED`] to veto.
    fn turn_function(&mut self, angle: f64) -> i32;
}

/// Thread-safe factory for per-thread profile states.
pub trait ProfileSource: Sync {
    fn name(&self) -> &str;

    /// The source function: global properties, read once before parsing.
    fn properties(&self) -> ProfileProperties;

    fn make_state(&self) -> Box<dyn Profile + '_>;
}

/// Resolve a profile by name, as given on the `extract` command line.
pub fn by_name(name: &str) -> Option<Box<dyn ProfileSource>> {
    match name {
        "car" => Some(Box::new(CarProfile::default())),
        _ => None,
    }
}
