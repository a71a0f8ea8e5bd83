pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod repository;
pub mod retrieval;
pub mod routes;
pub mod schema;
pub mod state;
pub mod storage;
pub mod validation;
