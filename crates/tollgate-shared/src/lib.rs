//! # Tollgate Shared
//!
//! Wire types of the decision service, shared by the server and its clients.

pub mod dto;
pub mod response;

pub use response::ErrorResponse;
