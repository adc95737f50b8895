pub mod build_runner;
pub mod build_tracker;
pub mod content_gateway;
pub mod publisher;
pub mod renderer;
pub mod validation;
