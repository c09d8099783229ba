pub mod fetch;
pub mod lookup;
pub mod query;
pub mod render;
