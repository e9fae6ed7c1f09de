//! Entity definitions: identifiers and sizes. The cache entities themselves
//! (`Image`, `RenderRequest`, `Bucket`, `Controller`) live in
//! [`crate::domain::engine`] since they carry behavior, not just data.

mod ids;
mod size;

pub use ids::{BucketName, ImageId, RenderRequestId};
pub use size::Size;
