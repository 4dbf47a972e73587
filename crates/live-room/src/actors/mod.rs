//! Actor model for a live room.
//!
//! One `RoomActor` per joined room serializes every seat command, remote
//! completion and inbound notification through a single mailbox:
//!
//! ```text
//! RoomSession
//! └── RoomActorHandle (cloneable)
//!     └── RoomActor (one per room)
//!         ├── owns RoleRegistry and SeatTable
//!         ├── spawns one task per coordination call
//!         ├── publishes RoomSnapshot (watch)
//!         └── emits RoomEvent (broadcast)
//! ```

pub mod messages;
pub mod room;

pub use messages::{
    Command, RemoteNotification, RoomEvent, RoomMessage, RoomSnapshot, SeatAssignment,
};
pub use room::{RoomActor, RoomActorHandle};
