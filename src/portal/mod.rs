pub mod types;
pub mod coerce;
pub mod html;
pub mod dashboard;
pub mod semester;
pub mod attendance;
pub mod marks;
pub mod http_client;
pub mod orchestrator;
pub mod cache;
pub mod service;

pub use self::cache::{CacheEntry, SessionCache, SessionStore};
pub use self::http_client::{Captcha, Credentials, LoginOutcome, PageFetcher, PortalClient};
pub use self::orchestrator::DashboardOrchestrator;
pub use self::service::{DashboardService, LogoutOutcome};
pub use self::types::{Assembly, DashboardSnapshot, Degradation, HiddenFormFields};
