#![warn(clippy::all, clippy::cargo, clippy::nursery, clippy::pedantic)]
#![warn(missing_docs)]

//! A transition engine for cosmological first-order phase transitions: phase
//! tracing, Euclidean bounce-action calculation, derived nucleation and
//! percolation temperatures, and gravitational-wave observables.

pub mod bounce_action;
pub mod bounce_solution;
pub mod convert;
pub mod error;
pub mod gravitational_wave;
pub mod minimum;
pub mod ode;
pub mod path;
pub mod phase;
pub mod potential;
pub mod special;
pub mod spline;
pub mod transition_tracer;
pub mod vacuum;
