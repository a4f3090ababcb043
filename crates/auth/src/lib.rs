//! 身份认证、授权与令牌

pub mod assignment;
pub mod drivers;
pub mod identity;
pub mod password;
pub mod permission;
pub mod service;
pub mod token;
pub mod users;

pub use assignment::AssignmentBackend;
pub use drivers::AuthBackends;
pub use identity::IdentityBackend;
pub use service::AuthorizationService;
pub use token::{TokenManager, TokenWindow};
pub use users::{UserChange, UserDetails, UserService};
