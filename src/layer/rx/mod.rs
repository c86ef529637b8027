mod reorder;
mod reorder_wnd;
mod timeout;

pub use reorder::*;
pub use reorder_wnd::*;
pub use timeout::*;
