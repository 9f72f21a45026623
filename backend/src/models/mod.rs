pub mod catalog;
pub mod macros;
pub mod photometry;
pub mod reduction;
pub mod time;

pub use catalog::*;
pub use photometry::*;
pub use reduction::*;
pub use time::*;
