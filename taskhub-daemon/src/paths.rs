use std::path::{Path, PathBuf};
use std::time::Duration;

pub use taskhub_core::settings::taskhub_root;

pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);
pub const DAEMON_SOCKET: &str = "daemon.sock";

/// `<home>/.taskhub/daemon.sock`
pub fn socket_path(home: &Path) -> PathBuf {
    taskhub_root(home).join(DAEMON_SOCKET)
}
