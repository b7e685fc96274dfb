//! Request and response types for the S3 operations the transfer layer uses.

mod common;
mod requests;
mod responses;

pub use common::*;
pub use requests::*;
pub use responses::*;
