//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, principal, cache directive)
//!     → handlers.rs (pick API generation and emit mode)
//!     → query::ExecutionRouter (normalize, route, aggregate)
//!     → response.rs (buffered or streamed envelope, error bodies)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestContext, UuidRequestId, X_REQUEST_ID};
pub use response::{emit, EmitMode};
pub use server::{AppState, Components, HttpServer};
