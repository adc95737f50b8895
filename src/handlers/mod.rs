pub mod build_handlers;
pub mod health_handlers;
pub mod site_handlers;
