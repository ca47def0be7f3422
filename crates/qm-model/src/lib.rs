// qm-model: Domain and wire types for the quakemap aggregation service.
//
// Pure serde types only: no I/O. The intensity scales, the unified EEW
// event, earthquake reports, tsunami rows, and the DMData wire envelopes
// all live here so the service, the parsers, and the test utilities share
// one vocabulary.

pub mod dmdata;
pub mod earthquake;
pub mod eew;
pub mod feeds;
pub mod intensity;
pub mod pswave;
pub mod tsunami;

pub use earthquake::*;
pub use eew::*;
pub use intensity::*;
pub use pswave::*;
pub use tsunami::*;
