pub mod config;
pub mod error;
pub mod notify;
pub mod process;
pub mod readiness;
pub mod unit;

pub use config::{GRACEFUL_ENV, SessionConfig, UnitConfig, parse_bool_flag};
pub use error::{Error, Result};
pub use notify::{ExitNotifier, ExitReceiver, ShutdownCause, exit_channel};
pub use process::{ExitStatus, ProcessBuilder, Signal, parse_signal};
pub use readiness::{PidFileMarker, PollBounds, ReadinessSource, WaitOutcome};
pub use unit::{ProcessUnit, ShutdownIntent, Supervised, UnitId, UnitState};

#[cfg(not(unix))]
compile_error!("stackctl coordinates processes with POSIX signals and only supports Unix platforms");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_id_sanitization() {
        assert_eq!(UnitId::new("app-server").unwrap().as_str(), "app-server");
        assert_eq!(UnitId::new("App Server").unwrap().as_str(), "app-server");
        assert_eq!(UnitId::new("FRONT_SERVER").unwrap().as_str(), "front_server");
        assert_eq!(UnitId::new("logs@pipe!").unwrap().as_str(), "logs-pipe");
        assert_eq!(UnitId::new("  logs  ").unwrap().as_str(), "logs");
    }

    #[test]
    fn test_unit_id_validation() {
        assert!(UnitId::new("valid-name").is_ok());
        assert!(UnitId::new("valid.name").is_ok());
        assert!(UnitId::new("valid_name").is_ok());
        assert!(UnitId::new("123").is_ok());
        assert!(UnitId::new("").is_err());
        assert!(UnitId::new("   ").is_err());
    }
}
