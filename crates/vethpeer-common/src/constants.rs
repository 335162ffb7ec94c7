//! System-wide constants and default paths.

/// Default mount point of the proc filesystem.
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Default `ip(8)` binary used for link inspection, looked up in `$PATH`.
pub const DEFAULT_IP_COMMAND: &str = "ip";

/// Path to the calling thread's own network namespace.
///
/// `/proc/self` follows the thread group leader, so a thread that has
/// switched namespace must use `thread-self` to see its own.
pub const THREAD_SELF_NETNS: &str = "/proc/thread-self/ns/net";

/// Maximum length of a Linux interface name, without the trailing NUL.
pub const IFNAMSIZ_MAX: usize = 15;

/// Environment variable overriding the proc root.
pub const ENV_PROC_ROOT: &str = "VETHPEER_PROC_ROOT";

/// Environment variable overriding the `ip` binary.
pub const ENV_IP_COMMAND: &str = "VETHPEER_IP_BIN";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "vethpeer";
