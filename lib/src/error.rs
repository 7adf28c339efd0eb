use thiserror::Error;

/// The single error enumeration shared by Info objects, the Lifecycle Engine,
/// the Thing Store and the JSON-RPC facade (spec §4.4/§7).
///
/// Plugins return this same enum from `Info::finish`; the facade serializes
/// it verbatim into the `thingError` response field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ThingError {
    #[error("NoError")]
    NoError,
    #[error("ThingNotFound")]
    ThingNotFound,
    #[error("ThingClassNotFound")]
    ThingClassNotFound,
    #[error("StateTypeNotFound")]
    StateTypeNotFound,
    #[error("ActionTypeNotFound")]
    ActionTypeNotFound,
    #[error("ItemNotFound")]
    ItemNotFound,
    #[error("ItemNotExecutable")]
    ItemNotExecutable,
    #[error("MissingParameter")]
    MissingParameter,
    #[error("InvalidParameter")]
    InvalidParameter,
    #[error("ParameterNotWritable")]
    ParameterNotWritable,
    #[error("PluginNotFound")]
    PluginNotFound,
    #[error("SetupFailed")]
    SetupFailed,
    #[error("CreationMethodNotSupported")]
    CreationMethodNotSupported,
    #[error("SetupMethodNotSupported")]
    SetupMethodNotSupported,
    #[error("AuthenticationFailure")]
    AuthenticationFailure,
    #[error("HardwareNotAvailable")]
    HardwareNotAvailable,
    #[error("HardwareFailure")]
    HardwareFailure,
    #[error("DuplicateId")]
    DuplicateId,
    #[error("ThingInUse")]
    ThingInUse,
    #[error("ThingIsChild")]
    ThingIsChild,
    #[error("Timeout")]
    Timeout,
    #[error("Aborted")]
    Aborted,
}

impl ThingError {
    pub fn is_ok(&self) -> bool {
        matches!(self, ThingError::NoError)
    }

    /// The string form serialized into the `thingError` JSON-RPC field.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            ThingError::NoError => "NoError",
            ThingError::ThingNotFound => "ThingNotFound",
            ThingError::ThingClassNotFound => "ThingClassNotFound",
            ThingError::StateTypeNotFound => "StateTypeNotFound",
            ThingError::ActionTypeNotFound => "ActionTypeNotFound",
            ThingError::ItemNotFound => "ItemNotFound",
            ThingError::ItemNotExecutable => "ItemNotExecutable",
            ThingError::MissingParameter => "MissingParameter",
            ThingError::InvalidParameter => "InvalidParameter",
            ThingError::ParameterNotWritable => "ParameterNotWritable",
            ThingError::PluginNotFound => "PluginNotFound",
            ThingError::SetupFailed => "SetupFailed",
            ThingError::CreationMethodNotSupported => "CreationMethodNotSupported",
            ThingError::SetupMethodNotSupported => "SetupMethodNotSupported",
            ThingError::AuthenticationFailure => "AuthenticationFailure",
            ThingError::HardwareNotAvailable => "HardwareNotAvailable",
            ThingError::HardwareFailure => "HardwareFailure",
            ThingError::DuplicateId => "DuplicateId",
            ThingError::ThingInUse => "ThingInUse",
            ThingError::ThingIsChild => "ThingIsChild",
            ThingError::Timeout => "Timeout",
            ThingError::Aborted => "Aborted",
        }
    }
}
