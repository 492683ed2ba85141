//! Ports: the seams to the outside world.
//!
//! - `Clock` supplies "now" so lease arithmetic can be tested deterministically.
//! - `TaskQueueRpc` is the remote queue service contract (lease/create/
//!   acknowledge/renew). Authorization happens before a client is built and
//!   is not modelled here.
//! - `IdGenerator` names tasks created by in-process queue services.

pub mod clock;
pub mod id_generator;
pub mod rpc;

pub use self::clock::{Clock, FixedClock, ManualClock, SharedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::rpc::{RawTask, TaskQueueRpc, TaskRef};
