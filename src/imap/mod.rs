pub mod conn;
pub mod sync;
pub mod watch;
