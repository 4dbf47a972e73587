//! # Live Room Test Utilities
//!
//! Shared fixtures and helpers for testing rooms end to end without a real
//! coordination service.
//!
//! ## Modules
//!
//! - `fixtures` - Participant and room builders
//! - `relay` - Turns recorded coordinator calls into the notifications the
//!   other sessions in the room would receive
//! - `wait` - Bounded waits on snapshots and events
//!
//! ## Usage
//!
//! ```rust,ignore
//! use live_room_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let room = TestRoom::new("room-1");
//!     let host = TestParticipant::new("100").build();
//!     let guest = TestParticipant::new("200").build();
//!
//!     let relay = CoordinationRelay::new([host.clone(), guest.clone()]);
//!     let owner = room.join_with_directory(&host, &host, relay.coordinator(), vec![guest.clone()]);
//!     let audience = room.join_as(&guest, &host, relay.coordinator());
//!
//!     owner.invite("200").await.unwrap();
//!     relay.deliver_next(&[&audience]).await;
//! }
//! ```

pub mod fixtures;
pub mod relay;
pub mod wait;

// Re-export commonly used items
pub use fixtures::*;
pub use relay::*;
pub use wait::*;
