mod buf_chain;
mod buf_slice;

pub use buf_chain::*;
pub use buf_slice::*;
