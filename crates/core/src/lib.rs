//! MUSH Core - Fundamental types and the world interface
//!
//! Everything the softcode runtime needs from the rest of the server
//! (object storage, permissions, economy, notification) is reached
//! through the [`World`] trait defined here.

mod error;
mod types;
mod idgen;
mod world;

pub use error::*;
pub use types::*;
pub use idgen::*;
pub use world::*;
