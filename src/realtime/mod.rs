//! Push channel and typed event dispatch.
//!
//! One [`RealtimeEventBus`] exists per session. It owns at most one
//! transport connection and a registry of handlers keyed by
//! [`EventKind`]; handlers survive reconnects and are invoked in the order
//! they were registered.
//!
//! The bus never retries on its own. Calling [`RealtimeEventBus::connect`]
//! again after a drop is the retry.

mod bus;
mod messages;
mod transport;

pub use bus::{Handler, HandlerId, RealtimeEventBus};
pub use messages::{decode_frame, ClientMessage, EventKind, PushEvent};
pub use transport::{PushConnection, PushTransport, WebSocketTransport};
