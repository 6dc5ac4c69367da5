//! Events surfaced from the engine to the host application.

/// A lifecycle or application event tied to one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    /// A client connected; carries the 4 IPv4 bytes of its address.
    Connect { ip: [u8; 4] },
    /// A client disconnected.
    Disconnect,
    /// A client sent an application-defined payload (message type 4).
    Custom(&'a [u8]),
}

/// Host callback for [`Event`]s. Runs synchronously on the engine thread,
/// so it must stay short.
pub type EventHandler = Box<dyn FnMut(i32, Event<'_>) + Send>;
