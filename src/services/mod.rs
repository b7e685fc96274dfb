//! S3 operation services.
//!
//! Each service issues signed requests through a shared `ServiceContext`.

mod context;
mod multipart;
mod objects;

pub use context::{document_to_error, ServiceContext, Target};
pub use multipart::MultipartService;
pub use objects::ObjectsService;
