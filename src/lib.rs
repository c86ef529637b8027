pub mod event;
pub mod layer;
pub mod protocol;
pub mod timer;
pub mod utils;
