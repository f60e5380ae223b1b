/// Logger setup for the simulator binary
use env_logger::{Builder, Env};

/// Install the global logger. `RUST_LOG` wins over the default level;
/// quiet mode only lowers the default to warnings.
pub fn init_log(quiet: bool) {
  let default = if quiet { "warn" } else { "info" };
  let _ = Builder::from_env(Env::default().default_filter_or(default))
    .format_timestamp(None)
    .try_init();
}
