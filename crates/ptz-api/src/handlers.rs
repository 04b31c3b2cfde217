//! Request handlers.

pub mod health;
pub mod position;
pub mod stream;
pub mod zoom;

pub use health::*;
pub use position::*;
pub use stream::*;
pub use zoom::*;
