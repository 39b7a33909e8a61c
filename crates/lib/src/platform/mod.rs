//! Platform paths and install layout.

pub mod layout;
pub mod paths;

pub use layout::Layout;
