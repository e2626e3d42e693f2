//! # Pair Relay Server
//!
//! Real-time relay that seats two players in a named game and forwards
//! their moves and presence events to each other.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PAIR RELAY SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/              - Matchmaking core (no I/O)              │
//! │  ├── participant.rs - Ids, roles, participant records        │
//! │  ├── registry.rs    - Participant store                      │
//! │  ├── index.rs       - Game → members view                    │
//! │  └── matchmaking.rs - Join / move / leave protocol           │
//! │                                                              │
//! │  network/           - Transport                              │
//! │  ├── protocol.rs    - Message types                          │
//! │  ├── transport.rs   - Group delivery capabilities            │
//! │  ├── relay.rs       - Core results → notifications           │
//! │  └── server.rs      - WebSocket server and relay loop        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering
//!
//! All session state is owned by one relay loop task. Connection tasks
//! forward events to it over a single channel, so joins to the same game
//! are seated in arrival order and roles are assigned deterministically.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::{Matchmaker, MatchmakerConfig, MatchError, Participant, ParticipantId, Role};
pub use network::{RelayServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
