pub mod daemon;
pub mod focus;
pub mod helpers;
pub mod watch;
