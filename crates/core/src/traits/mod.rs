pub mod collaborators;
pub mod repository;

pub use collaborators::*;
pub use repository::*;
