//! Live Room Library
//!
//! This library provides the broadcasting-role state machine of a
//! live-streaming room:
//!
//! - Per-participant roles (owner, co-broadcaster, audience)
//! - Seat assignment with invite, accept, reject, force-end and self-end
//! - Broadcasting mode (single or multi) derived from the seats
//! - Optimistic transitions with rollback when the coordination service fails
//!
//! # Architecture
//!
//! ```text
//! RoomSession (one per joined room)
//! └── RoomActor (owns RoleRegistry + SeatTable)
//!     ├── Coordinator (remote seat calls, retried with backoff)
//!     ├── watch<RoomSnapshot> (seats + mode, published atomically)
//!     └── broadcast<RoomEvent> (invitations, role changes, rollbacks)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single slot**: at most one seat is non-empty, so the mode is `Multi`
//!   iff exactly one seat is occupied
//! - **Derived mode**: the mode is never stored, only resolved from seats
//! - **Stale-completion guard**: every transition bumps a seat generation;
//!   completions for an older generation never touch state
//! - **Explicit session**: no global current-room state
//!
//! # Modules
//!
//! - [`actors`] - Room actor, handle and message types
//! - [`config`] - Configuration from environment
//! - [`coordination`] - Coordination service trait, retry decorator, in-memory impl
//! - [`errors`] - Error types with client-safe codes
//! - [`mode`] - Broadcasting mode resolution
//! - [`observability`] - Metrics
//! - [`participant`] - Participants, roles and the role registry
//! - [`seat`] - Seats, seat states and tickets
//! - [`session`] - Room session and its context
//! - [`view`] - Button, layout and media state for presenters

pub mod actors;
pub mod config;
pub mod coordination;
pub mod errors;
pub mod mode;
pub mod observability;
pub mod participant;
pub mod seat;
pub mod session;
pub mod view;
