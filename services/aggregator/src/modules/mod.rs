//! Long-lived modules. Each owns its snapshot behind an `RwLock`; the only
//! writer is its refresher (scheduler) or the streaming dispatcher, and
//! readers copy the snapshot out.

pub mod eew;
pub mod global_quake;
pub mod p2p;
pub mod shake_level;
pub mod tsunami;
