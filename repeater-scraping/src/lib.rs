pub mod chirp;
pub mod config;
pub mod fetch;
pub mod normalize;
pub mod paths;
pub mod record;
pub mod save;
pub mod sources;
pub mod storage;
pub mod summary;
pub mod table;
