// Results store
// SQLite database holding optimization runs, trials and generated test sets

pub mod sqlite;

pub use sqlite::*;
