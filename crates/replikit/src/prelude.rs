//! Convenient re-exports for common usage.
//!
//! ```
//! use replikit::prelude::*;
//! ```

pub use crate::clock::{ClockOrdering, VectorClock};
pub use crate::Crdt;
pub use crate::GCounter;
pub use crate::GSet;
pub use crate::LWWRegister;
pub use crate::ORMap;
pub use crate::OrderedSet;
pub use crate::PNCounter;
pub use crate::Rga;
pub use crate::TombstoneSet;
pub use crate::TwoPSet;
