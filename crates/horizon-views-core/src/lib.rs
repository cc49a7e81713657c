//! Core primitives for Horizon Views.
//!
//! - **Signal/Slot System**: Type-safe, synchronous change notification
//! - **Logging**: Tracing targets and performance spans shared by all crates
//!
//! # Signal/Slot Example
//!
//! ```
//! use horizon_views_core::Signal;
//!
//! let value_changed = Signal::<i32>::new();
//! let conn_id = value_changed.connect(|value| {
//!     println!("Value changed to: {value}");
//! });
//! value_changed.emit(42);
//! value_changed.disconnect(conn_id);
//! ```

pub mod logging;
pub mod signal;

pub use logging::PerfSpan;
pub use signal::{ConnectionGuard, ConnectionId, Signal};
