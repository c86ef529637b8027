mod desc_pool;
mod submit;

pub use desc_pool::*;
pub use submit::*;
