//! # Fieldsync Engine
//!
//! Offline action queue semantics for the promoter app.
//!
//! A promoter keeps working without coverage: check-ins, product counts,
//! photos, documents and time clock punches are queued on the device and
//! replayed against the REST API once connectivity returns. This crate holds
//! the rules of that protocol; the `fieldsync-agent` crate provides storage,
//! transport and scheduling.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never touches disk, network or clocks
//! - **Deterministic**: ordering and classification depend only on inputs
//! - **Typed payloads**: every queued row is an [`ActionPayload`] variant
//!
//! ## Core Concepts
//!
//! ### Pending actions
//!
//! A [`PendingAction`] exists only while its mutation is unacknowledged.
//! Its [`ActionState`] moves `PENDING -> SYNCING -> ERROR`; success deletes
//! the row. [`replay_order`] sorts a batch by creation time.
//!
//! ### Outcomes
//!
//! [`Outcome`] classifies a remote answer: 2xx applied, 409 already applied,
//! other 4xx rejected, 5xx and transport failures retryable.
//!
//! ### Route cache
//!
//! [`CachedRoute`] is the offline mirror of a route. Actions that target a
//! route item yield a [`RoutePatch`] that is applied optimistically. After a
//! successful replay, [`PendingAction::reconciliation_patch`] decides whether
//! it is applied again.
//!
//! ## Quick Start
//!
//! ```rust
//! use fieldsync_engine::{
//!     ActionPayload, HttpMethod, NewAction, Outcome, VisitPayload,
//! };
//!
//! let checkin = NewAction::new(
//!     "/route-items/item-a/checkin",
//!     HttpMethod::Post,
//!     ActionPayload::Checkin(VisitPayload {
//!         route_id: "r-1".into(),
//!         item_id: "item-a".into(),
//!         at: 1_715_000_000_000,
//!         latitude: None,
//!         longitude: None,
//!         notes: None,
//!     }),
//! );
//!
//! let patch = checkin.payload.route_patch().unwrap();
//! assert_eq!(patch.item_id, "item-a");
//!
//! let outcome = Outcome::from_status(503, "maintenance");
//! assert!(outcome.should_enqueue());
//! ```

pub mod action;
pub mod binary;
pub mod error;
pub mod outcome;
pub mod payload;
pub mod queue;
pub mod route;
pub mod summary;

// Re-export main types at crate root
pub use action::{ActionKind, ActionState, HttpMethod};
pub use binary::{decode_data_url, encode_data_url, BinaryAttachment, DecodedBinary};
pub use error::Error;
pub use outcome::{FailureClass, Outcome};
pub use payload::{
    ActionPayload, ClockEvent, DocumentUploadPayload, FilePart, FormPayload, LocationPayload,
    PhotoPayload, ProductCheckPayload, ReplayBody, TimeClockPayload, VisitPayload,
};
pub use queue::{replay_order, NewAction, PendingAction};
pub use route::{
    select_routes_for_date, CachedRoute, ItemChange, RouteDocument, RoutePatch,
};
pub use summary::{DrainSummary, Notification, Severity};

/// Type aliases for clarity
pub type ActionId = i64;
pub type RouteId = String;
/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;
