pub mod clients;
pub mod error;
pub mod flight_utils;
pub mod models;
pub mod services;
