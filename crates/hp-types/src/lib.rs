pub mod component;
pub mod stage;
pub mod errors;

pub use component::*;
pub use stage::*;
pub use errors::*;
