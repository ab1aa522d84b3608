//! Domain models for the OKR planner.
//!
//! # Core Concepts
//!
//! - [`Session`]: one objective and everything generated from it. Sessions
//!   are owned by the session store and addressed by an opaque id.
//! - [`KeyResult`]: measurable targets suggested for the objective. One is
//!   selected to drive the rest of the breakdown.
//! - [`PlanTree`]: the epic → feature → story → task hierarchy grown for the
//!   selected key result. Stored as an arena with explicit parent ids.
//! - [`Rollup`]: counts and total effort for any subtree.
//!
//! Types suffixed `Input` are what a reasoning backend produces, before the
//! pipeline assigns ids. Types suffixed `Node` are nested read views.

mod lenient;
mod objective;
mod plan;
mod rollup;
mod session;

pub use objective::*;
pub use plan::*;
pub use rollup::*;
pub use session::*;
