//! Shared data structures for the capture scheduler
//!
//! - Camera identity and capabilities (discovery output)
//! - Interval periods and the donor relation between them
//! - Capture outcomes and stored image artifacts

mod camera;
mod interval;
mod outcome;

pub use camera::*;
pub use interval::*;
pub use outcome::*;
