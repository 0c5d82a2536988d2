pub mod client;
pub mod view;

pub use client::ApiClient;
pub use view::DashboardView;
