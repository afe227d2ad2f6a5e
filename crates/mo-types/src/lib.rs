pub mod dataset;
pub mod errors;
pub mod evaluation;
pub mod params;

pub use dataset::*;
pub use errors::*;
pub use evaluation::*;
pub use params::*;
