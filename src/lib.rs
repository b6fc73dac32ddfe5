pub mod assets;
pub mod audio;
pub mod config;
pub mod error;
pub mod input;
pub mod media;
pub mod pad;
pub mod record;
pub mod render;
pub mod touch;
pub mod trigger;
pub mod ui;
pub mod voice;

pub use assets::{AssetBinder, BoundAssets, LayerKind};
pub use audio::{AudioConfig, AudioEngine};
pub use config::PadConfig;
pub use error::{AssetError, PadError, PadResult, RecordError};
pub use media::{MediaDescriptor, MediaKind};
pub use pad::{Pad, PadEvent};
pub use record::{Artifact, ContainerFormat, RecordingState};
pub use touch::TouchPoint;
pub use ui::TerminalUI;
