pub mod directory;
pub mod dose;
pub mod enums;
pub mod patient;
pub mod prescription;

pub use directory::*;
pub use dose::*;
pub use patient::*;
pub use prescription::*;
