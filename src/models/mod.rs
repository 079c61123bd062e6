mod tenant;
pub mod validators;

pub use tenant::*;
