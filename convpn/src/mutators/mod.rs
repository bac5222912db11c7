//! The primitive host-state mutations. Every mutator writes its journal
//! key before acting, so a crash between the two is recoverable: the
//! journal entry alone is enough for cleanup to retry the undo.

pub mod dns;
pub mod firewall;
pub mod nm;
pub mod resolvconf;
pub mod route;

pub use dns::apply_dns;
pub use firewall::{install_kill_switch, teardown_kill_switch};
pub use nm::{neutralize_connection, restore_connection};
pub use resolvconf::restore_resolv_conf;
pub use route::install_default_route;
