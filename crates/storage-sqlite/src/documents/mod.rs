//! SQLite persistence for business documents.

mod model;
mod repository;

pub use model::*;
pub use repository::DocumentRepository;
