pub mod config;
pub mod dag;
pub mod duck;
pub mod extract;
pub mod load;
pub mod pipeline;
pub mod schedule;
pub mod schema;
pub mod store;
pub mod table;
pub mod transform;
