mod constants;
pub mod events;

pub use constants::*;
pub use rstest::fixture;
