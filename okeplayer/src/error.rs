use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("Playback action '{action}' is not valid in state {state}")]
    InvalidTransition { action: String, state: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Transport did not acknowledge load within {0:?}")]
    TransportTimeout(std::time::Duration),

    #[error("Playback controller is no longer running")]
    ControllerGone,

    #[error("No media of type {0} available in the catalog")]
    NoMedia(okemedia::MediaType),

    #[error("Queue error: {0}")]
    Queue(#[from] okequeue::Error),
}

pub type Result<T> = std::result::Result<T, PlayerError>;
