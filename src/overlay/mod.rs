//! On-screen overlays for the live stream.
//!
//! - [`template`] turns placeholder templates into display strings and
//!   escapes them for drawtext
//! - [`graph`] compiles those strings and their timing windows into the
//!   encoder's filter graph

pub mod graph;
pub mod template;

pub use graph::{compile, GraphCompiler, LoudnessTarget, OverlayLayout, OverlayText};
pub use template::{cta_text, render, sanitize_drawtext, track_text};
