//! Remote parameter control.
//!
//! The modulator exposes a small set of live-tunable values to an operator
//! console over a control channel. Each controllable component exports a
//! fixed, explicitly enumerated set of named parameters that are read and
//! written as text; there is no reflection.

use serde::Serialize;

use crate::Result;

/// Descriptor for one remotely accessible parameter.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameter {
    pub name: &'static str,
    pub help: &'static str,
    pub writable: bool,
}

/// A component exposing named parameters to the control path.
///
/// Setters validate the textual value and fail with a typed [`crate::Error`]
/// without touching component state. Implementations must be safe to call
/// concurrently with the component's real-time path.
pub trait RemoteControllable {
    /// Name under which this controllable is addressed.
    fn rc_name(&self) -> &'static str;

    /// The parameters this controllable exports.
    fn parameters(&self) -> &'static [Parameter];

    /// Parse `value` and apply it to the named parameter.
    fn set_parameter(&self, parameter: &str, value: &str) -> Result<()>;

    /// Read the named parameter as text.
    fn get_parameter(&self, parameter: &str) -> Result<String>;
}
