//! The direct-mapped hardware tables backing the engine.
//!
//! All of these are fixed-size arrays of slots with sentinel-empty
//! semantics. Capacity and collision behavior are part of the hardware
//! contract, so none of them may be replaced by a growable map.

pub mod rr;
pub mod holding;
pub mod accuracy;
pub mod eviction;
pub mod recent;

pub use rr::*;
pub use holding::*;
pub use accuracy::*;
pub use eviction::*;
pub use recent::*;
