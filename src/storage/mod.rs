//! Storage backends for kyrostore.
//!
//! Each backend lives in its own module and implements the traits defined in
//! [`traits`]. The [`Store`](crate::store::Store) enum ties them together.

pub mod cloud;
pub mod dict;
pub mod file;
pub mod kv;
mod traits;

pub use traits::{Keys, ObjectQueue, ObjectSet, ObjectStore};
