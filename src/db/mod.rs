pub mod path_index;

pub use path_index::{PathIndex, PathIndexError, SqlitePathIndex, LOOKUP_QUERY};
