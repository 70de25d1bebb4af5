//! Generic parameters functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::warn;
use serde::de::DeserializeOwned;
use std::fs::read_to_string;
use std::io::ErrorKind;
use std::path::Path;
use thiserror::Error;
use toml;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("The software root environment variable ({}) is not set", crate::host::SW_ROOT_ENV_VAR)]
    SwRootNotSet,

    #[error("Cannot load the parmeter file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Cannot read the parameter file: {0}")]
    DeserialiseError(toml::de::Error),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file
///
/// The file path is relative to the `params` directory in the software root.
pub fn load<P>(param_file_path: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    // Get the params dir
    let mut path = crate::host::get_sw_root().map_err(|_| LoadError::SwRootNotSet)?;
    path.push("params");
    path.push(param_file_path);

    load_from_path(path)
}

/// Load a parameter file from an explicit path.
pub fn load_from_path<P, Q>(path: Q) -> Result<P, LoadError>
where
    P: DeserializeOwned,
    Q: AsRef<Path>,
{
    // Load the file into a string
    let params_str = read_to_string(path).map_err(LoadError::FileLoadError)?;

    from_str(&params_str)
}

/// Load a parameter file, using the defaults if it doesn't exist.
///
/// A file which exists but can't be read or parsed is still an error.
pub fn load_or_default<P>(param_file_path: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned + Default,
{
    or_default(load(param_file_path), param_file_path)
}

/// As `load_or_default` with an explicit path.
pub fn load_from_path_or_default<P, Q>(path: Q) -> Result<P, LoadError>
where
    P: DeserializeOwned + Default,
    Q: AsRef<Path>,
{
    let name = path.as_ref().display().to_string();
    or_default(load_from_path(path), &name)
}

/// Parse parameters from a toml string.
pub fn from_str<P>(params_str: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    toml::from_str(params_str).map_err(LoadError::DeserialiseError)
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn or_default<P: Default>(result: Result<P, LoadError>, name: &str) -> Result<P, LoadError> {
    match result {
        Err(LoadError::FileLoadError(e)) if e.kind() == ErrorKind::NotFound => {
            warn!("Parameter file {} not found, using defaults", name);
            Ok(P::default())
        }
        r => r,
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct TestParams {
        freq_hz: f64,
        name: String,
    }

    #[test]
    fn test_from_str() {
        let p: TestParams = from_str("freq_hz = 50.0\nname = \"bot\"").unwrap();
        assert_eq!(
            p,
            TestParams {
                freq_hz: 50.0,
                name: String::from("bot")
            }
        );
    }

    #[test]
    fn test_from_str_invalid() {
        let r: Result<TestParams, _> = from_str("freq_hz = \"fast\"");
        assert!(matches!(r, Err(LoadError::DeserialiseError(_))));
    }

    #[test]
    fn test_missing_file() {
        let r: Result<TestParams, _> = load_from_path("/nonexistent/params/test.toml");
        assert!(matches!(r, Err(LoadError::FileLoadError(_))));
    }

    #[test]
    fn test_missing_file_uses_default() {
        let p: TestParams = load_from_path_or_default("/nonexistent/params/test.toml").unwrap();
        assert_eq!(p, TestParams::default());
    }

    #[test]
    fn test_malformed_file_not_defaulted() {
        let path = std::env::temp_dir().join(format!("params_test_{}.toml", std::process::id()));
        std::fs::write(&path, "freq_hz = \"fast\"").unwrap();

        let r: Result<TestParams, _> = load_from_path_or_default(&path);
        std::fs::remove_file(&path).ok();

        assert!(matches!(r, Err(LoadError::DeserialiseError(_))));
    }
}
