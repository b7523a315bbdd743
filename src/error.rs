use crate::filter::MAX_EXTENSIONS;
use libc::c_int;
use nix::errno::Errno;

/// Module parameters that cannot be turned into an active hook
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing replacement filename parameter")]
    MissingReplacement,
    #[error("missing extensions parameter")]
    MissingExtensions,
    #[error("too many extensions: {0} given, at most {max} accepted", max = MAX_EXTENSIONS)]
    TooManyExtensions(usize),
    #[error("replacement filename contains a NUL byte")]
    InvalidReplacement,
}

/// Reasons an activation attempt is refused
///
/// None of these leave anything installed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("couldn't find the syscall dispatch table")]
    TableNotFound,
    #[error("an open() interceptor is already installed")]
    AlreadyInstalled,
}

impl Error {
    /// Negative errno reported to the host as the load status
    pub fn status_code(&self) -> c_int {
        let errno = match self {
            Error::Config(_) => Errno::EINVAL,
            Error::TableNotFound => Errno::EAGAIN,
            Error::AlreadyInstalled => Errno::EBUSY,
        };
        -(errno as c_int)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_distinct_and_negative() {
        let config = Error::from(ConfigError::MissingExtensions).status_code();
        let table = Error::TableNotFound.status_code();
        let busy = Error::AlreadyInstalled.status_code();
        assert_eq!(config, -libc::EINVAL);
        assert_eq!(table, -libc::EAGAIN);
        assert_eq!(busy, -libc::EBUSY);
    }

    #[test]
    fn config_error_message_is_forwarded() {
        let err = Error::from(ConfigError::TooManyExtensions(7));
        assert_eq!(
            err.to_string(),
            "too many extensions: 7 given, at most 5 accepted"
        );
    }
}
