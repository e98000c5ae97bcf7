//! # Continuity Core
//!
//! Continuity engine for AI-driven interactive fiction: persistent character
//! and world state that evolves over simulated time and compresses into
//! budget-bounded, prompt-ready digests.
//!
//! The LLM layer, chat front-end and any UI live outside this crate; they
//! talk to a [`ContinuitySession`]:
//!
//! - **Ground truth** is the append-only [`event::EventLog`]. Everything
//!   else — the [`store::EntityStore`], the
//!   [`relationship::RelationshipGraph`] — is derived and can be rebuilt by
//!   replay, byte-identically (decay jitter included).
//! - **Time** is the [`clock::SimClock`]'s tick axis; calendar, season,
//!   moon and daylight are pure functions of the tick, and weather is a
//!   pure function of (session, day). Committing time logs a `TimeAdvanced`
//!   event, which runs the decay pass.
//! - **Digests** come from the [`assembler::ContextAssembler`]: scored
//!   facts greedily packed against a token budget, with a manifest of what
//!   made the cut and what was dropped.
//!
//! ```no_run
//! use continuity_core::{ContextBudget, ContinuityConfig, ContinuitySession,
//!                       FocusSet, MoodVector, SessionId};
//!
//! let session = ContinuitySession::new(SessionId::new(), ContinuityConfig::default());
//! let mira = session.register_character("Mira", MoodVector::NEUTRAL)?;
//! session.ingest_turn("Mira shares her rations with a stranger.", &FocusSet::default())?;
//! session.request_time(8);
//! session.commit_time()?;
//! let budget = ContextBudget::new(300, FocusSet::characters_only(vec![mira]));
//! let (digest, manifest) = session.digest(&budget);
//! # Ok::<(), continuity_core::ContinuityError>(())
//! ```

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assembler;
pub mod clock;
pub mod config;
pub mod decay;
pub mod environment;
pub mod error;
pub mod event;
pub mod persistence;
pub mod relationship;
pub mod session;
pub mod signal;
pub mod store;
pub mod types;

pub use assembler::{ContextAssembler, DigestManifest};
pub use config::ContinuityConfig;
pub use error::{ContinuityError, Result};
pub use event::{Event, EventDraft, EventKind, EventLog};
pub use persistence::{SessionStore, SqliteSessionStore};
pub use session::{ContinuitySession, TurnReceipt};
pub use store::{Character, EntityStore, Location, StateDelta};
pub use types::*;
