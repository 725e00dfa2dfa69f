//! TCP front end: accepts client connections and runs each one on its own task.

pub mod listener;
