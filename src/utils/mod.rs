pub mod buf;
pub mod excl;
pub mod idx_list;
mod seq;
mod seq12;

pub use seq::*;
pub use seq12::*;
