//! Session domain: identifiers, bearer credentials, and the shared session state.

pub mod id;
pub mod secret;
pub mod session;

pub use id::*;
pub use secret::*;
pub use session::*;
