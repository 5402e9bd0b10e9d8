mod handler;
mod splice;

pub use self::{
    handler::{TunnelStats, handle_connect},
    splice::{SpliceStats, splice},
};
