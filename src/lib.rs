//! CT Inference Service
//!
//! This library provides the core functionality for the ct-inference system:
//! asynchronous dispatch of CT segmentation and anatomical landmark/plane
//! inference jobs through a Redis-backed task queue, with input volumes and
//! computed artifacts staged against OBS object storage.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
