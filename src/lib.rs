//! Agent-to-agent travel orchestration.
//!
//! This crate provides bookable resource services and a conversation
//! orchestrator that reaches them through a discovered capability registry:
//!
//! - Inventory stores with per-item locking that never oversell
//! - Hotel and flight services speaking a small JSON request/response protocol
//! - Capability discovery with first-registered-wins operation routing
//! - A bounded decide/dispatch loop driven by a pluggable decision oracle
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          User (chat)                             │
//! └───────────────────────────┬─────────────────────────────────────┘
//!                             ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  ConversationOrchestrator                        │
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐ ┌────────────┐   │
//! │  │ Conversa-  │ │ Decision   │ │ Dispatch   │ │ Capability │   │
//! │  │ tion State │ │ Oracle     │ │ Router     │ │ Registry   │   │
//! │  └────────────┘ └────────────┘ └────────────┘ └────────────┘   │
//! └───────────────────────────┬─────────────────────────────────────┘
//!                             │ ServiceTransport (HTTP or in-process)
//!               ┌─────────────┴─────────────┐
//!               ▼                           ▼
//!     ┌───────────────────┐       ┌───────────────────┐
//!     │ HotelBookingAgent │       │ FlightBookingAgent│
//!     │  InventoryStore   │       │  InventoryStore   │
//!     └───────────────────┘       └───────────────────┘
//! ```
//!
//! # Service operations
//!
//! | Service | Operations |
//! |---------|------------|
//! | Hotels | `search_hotels`, `get_hotel_details`, `create_booking`, `get_booking_status`, `cancel_booking` |
//! | Flights | `search_flights`, `get_flight_details`, `book_flight`, `get_flight_booking_status`, `cancel_flight_booking` |

pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod error;
pub mod inventory;
pub mod oracle;
pub mod orchestrator;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod service;
pub mod transport;

pub use config::{Config, OracleConfig, OrchestratorConfig};
pub use conversation::{ConversationState, ToolCall, Turn};
pub use dispatch::DispatchRouter;
pub use error::{Error, ErrorKind, Result};
pub use inventory::{InventoryStore, Reservation};
pub use oracle::{Decision, DecisionOracle};
pub use orchestrator::ConversationOrchestrator;
pub use protocol::{CapabilityManifest, Envelope, OperationSpec};
pub use registry::CapabilityRegistry;
pub use service::ResourceService;
pub use transport::{Endpoint, HttpTransport, LocalTransport, ServiceTransport};
