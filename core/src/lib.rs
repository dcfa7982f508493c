pub mod db;
pub mod ids;
pub mod models;
pub mod reconcile;
pub mod store;
