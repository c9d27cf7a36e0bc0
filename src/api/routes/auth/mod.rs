pub mod public;
mod router;
pub use router::{api_router, router};
