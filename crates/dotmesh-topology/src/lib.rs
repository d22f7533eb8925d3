//! dotmesh-topology: overlay planning for dotmesh storage nodes.
//!
//! Pure building blocks used by `dotmesh-reconciler`:
//!
//! | Module        | Purpose |
//! |---------------|---------|
//! | `address`     | Dial base + port (+ peer id) → concrete multiaddr strings |
//! | `roster`      | Federation roster (`custom.json`) loader |
//! | `profile`     | Server / client role tuning templates |
//! | `planner`     | Bootstrap, peering and announce set construction |
//! | `live_config` | Typed view over a node's runtime config document |
//! | `merge`       | Conservative merge of a plan into a live config |

pub mod address;
pub mod constants;
pub mod error;
pub mod live_config;
pub mod merge;
pub mod planner;
pub mod profile;
pub mod roster;

pub use constants::*;
pub use error::TopologyError;
pub use live_config::{LiveConfig, PeeringEntry};
pub use planner::{PlannerParams, TopologyPlan};
pub use profile::{RoleProfile, RoleProfiles};
pub use roster::{NodeRecord, NodeRole, Roster};
