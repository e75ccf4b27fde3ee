mod clock;
mod ticker;

pub use clock::*;
pub use ticker::*;
