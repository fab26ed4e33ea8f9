//! Petri net modelling and execution.
//!
//! The [`net`] module holds the structural model (token kinds, places,
//! transitions, arcs), the marking and the enabling/firing engine. The
//! remaining modules are the layers a simulator front end needs on top
//! of it: a stepping [`sim::Animator`], bundled [`models`], and the
//! configuration/option/report plumbing used by the `pn` binary.

pub mod config;
pub mod models;
pub mod net;
pub mod options;
pub mod report;
pub mod sim;
