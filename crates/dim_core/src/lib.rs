//! Record types, change classification and error model shared by the
//! Catchem user dimension loader.

pub mod api;
pub mod classify;
pub mod error;
pub mod ids;
pub mod record;
pub mod timestamp;

pub use api::*;
pub use classify::*;
pub use error::{DimError, DimResult};
pub use ids::*;
pub use record::*;
pub use timestamp::*;
