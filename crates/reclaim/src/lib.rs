//! Turns "this shard is no longer needed" into deletion notifications for
//! every node believed to hold a copy.

pub mod dispatcher;

pub use dispatcher::ReclamationDispatcher;
